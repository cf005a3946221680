use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

/// `hvcC` box carrying the HEVC decoder configuration record as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcConfigurationBox {
    pub config: Vec<u8>,
}

impl Mp4Box for HevcConfigurationBox {
    const NAME: FourCC = FourCC(*b"hvcC");

    fn content_size(&self) -> u64 {
        self.config.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(&self.config);

        Ok(())
    }
}

impl Mp4BoxRead for HevcConfigurationBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let config = data.to_vec();
        *data = &[];

        Ok(HevcConfigurationBox { config })
    }
}
