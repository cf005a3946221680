use byteorder::{BigEndian, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_four_cc, BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemeTypeBox {
    /// `cenc`, `cbcs` and friends.
    pub scheme_type: FourCC,
    pub scheme_version: u32,
}

impl Mp4Box for SchemeTypeBox {
    const NAME: FourCC = FourCC(*b"schm");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        8
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(&self.scheme_type.0);
        writer.put_u32(self.scheme_version);

        Ok(())
    }
}

impl Mp4BoxRead for SchemeTypeBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;
        let scheme_type = read_four_cc(data)?;
        let scheme_version = data.read_u32::<BigEndian>()?;

        // scheme_uri, when flagged, is not kept
        *data = &[];

        Ok(SchemeTypeBox {
            scheme_type,
            scheme_version,
        })
    }
}
