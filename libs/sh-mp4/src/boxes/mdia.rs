use four_cc::FourCC;

use bytes::BytesMut;

use crate::{read_body, BoxHeader, BoxIter, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::{HandlerBox, MediaHeaderBox, MediaInformationBox};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBox {
    pub mdhd: MediaHeaderBox,
    pub hdlr: HandlerBox,
    pub minf: MediaInformationBox,
}

impl Mp4Box for MediaBox {
    const NAME: FourCC = FourCC(*b"mdia");

    fn content_size(&self) -> u64 {
        self.mdhd.size() + self.hdlr.size() + self.minf.size()
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        self.mdhd.write(writer)?;
        self.hdlr.write(writer)?;
        self.minf.write(writer)?;

        Ok(())
    }
}

impl Mp4BoxRead for MediaBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let mut mdhd = None;
        let mut hdlr = None;
        let mut minf = None;

        for child in BoxIter::new(*data) {
            let (header, body) = child?;

            match &header.name.0 {
                b"mdhd" => mdhd = Some(read_body(&header, body)?),
                b"hdlr" => hdlr = Some(read_body(&header, body)?),
                b"minf" => minf = Some(read_body(&header, body)?),
                _ => {}
            }
        }
        *data = &[];

        Ok(MediaBox {
            mdhd: mdhd.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing mdhd"))?,
            hdlr: hdlr.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing hdlr"))?,
            minf: minf.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing minf"))?,
        })
    }
}
