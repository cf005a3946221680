use four_cc::FourCC;

use bytes::BytesMut;

use crate::{read_body, BoxHeader, BoxIter, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::{MovieFragmentHeaderBox, TrackFragmentBox};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieFragmentBox {
    pub mfhd: MovieFragmentHeaderBox,
    pub trafs: Vec<TrackFragmentBox>,
}

impl Mp4Box for MovieFragmentBox {
    const NAME: FourCC = FourCC(*b"moof");

    fn content_size(&self) -> u64 {
        let mut size = self.mfhd.size();

        for traf in &self.trafs {
            size += traf.size();
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        self.mfhd.write(writer)?;

        for traf in &self.trafs {
            traf.write(writer)?;
        }

        Ok(())
    }
}

impl Mp4BoxRead for MovieFragmentBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let mut mfhd = None;
        let mut trafs = Vec::new();

        for child in BoxIter::new(*data) {
            let (header, body) = child?;

            match &header.name.0 {
                b"mfhd" => mfhd = Some(read_body(&header, body)?),
                b"traf" => trafs.push(read_body(&header, body)?),
                _ => {}
            }
        }
        *data = &[];

        Ok(MovieFragmentBox {
            mfhd: mfhd.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing mfhd"))?,
            trafs,
        })
    }
}
