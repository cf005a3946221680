use four_cc::FourCC;

use bytes::BytesMut;

use crate::{read_body, BoxHeader, BoxIter, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::{EditBox, MediaBox, TrackHeaderBox};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackBox {
    pub tkhd: TrackHeaderBox,
    pub edts: Option<EditBox>,
    pub mdia: MediaBox,
}

impl Mp4Box for TrackBox {
    const NAME: FourCC = FourCC(*b"trak");

    fn content_size(&self) -> u64 {
        let mut size = self.tkhd.size() + self.mdia.size();

        if let Some(edts) = &self.edts {
            size += edts.size();
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        self.tkhd.write(writer)?;

        if let Some(edts) = &self.edts {
            edts.write(writer)?;
        }

        self.mdia.write(writer)?;

        Ok(())
    }
}

impl Mp4BoxRead for TrackBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let mut tkhd = None;
        let mut edts = None;
        let mut mdia = None;

        for child in BoxIter::new(*data) {
            let (header, body) = child?;

            match &header.name.0 {
                b"tkhd" => tkhd = Some(read_body(&header, body)?),
                b"edts" => edts = Some(read_body(&header, body)?),
                b"mdia" => mdia = Some(read_body(&header, body)?),
                _ => {}
            }
        }
        *data = &[];

        Ok(TrackBox {
            tkhd: tkhd.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing tkhd"))?,
            edts,
            mdia: mdia.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing mdia"))?,
        })
    }
}
