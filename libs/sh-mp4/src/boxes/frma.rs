use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_four_cc, BoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

/// Original sample entry type of a protected track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalFormatBox {
    pub data_format: FourCC,
}

impl Mp4Box for OriginalFormatBox {
    const NAME: FourCC = FourCC(*b"frma");

    fn content_size(&self) -> u64 {
        4
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(&self.data_format.0);

        Ok(())
    }
}

impl Mp4BoxRead for OriginalFormatBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        Ok(OriginalFormatBox {
            data_format: read_four_cc(data)?,
        })
    }
}
