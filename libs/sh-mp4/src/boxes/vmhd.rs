use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoMediaHeaderBox {}

impl Mp4Box for VideoMediaHeaderBox {
    const NAME: FourCC = FourCC(*b"vmhd");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 1))
    }

    fn content_size(&self) -> u64 {
        size_of::<u16>() as u64 + // graphicsmode
        (size_of::<u16>() as u64 * 3) // opcolor
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let contents = [0u8; 8];

        writer.put_slice(&contents);

        Ok(())
    }
}

impl Mp4BoxRead for VideoMediaHeaderBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;
        *data = &[];

        Ok(VideoMediaHeaderBox {})
    }
}
