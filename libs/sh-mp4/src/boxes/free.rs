use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

/// Padding box. Only the payload length is kept, contents are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FreeSpaceBox {
    pub padding: u64,
}

impl Mp4Box for FreeSpaceBox {
    const NAME: FourCC = FourCC(*b"free");

    fn content_size(&self) -> u64 {
        self.padding
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_bytes(0, self.padding as usize);

        Ok(())
    }
}

impl Mp4BoxRead for FreeSpaceBox {
    fn read_box_contents(header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let padding = header.content_size().max(data.len() as u64);
        *data = &[];

        Ok(FreeSpaceBox { padding })
    }
}
