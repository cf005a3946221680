use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieFragmentHeaderBox {
    pub sequence_number: u32,
}

impl Mp4Box for MovieFragmentHeaderBox {
    const NAME: FourCC = FourCC(*b"mfhd");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        4
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut contents = [0u8; 4];
        BigEndian::write_u32(&mut contents, self.sequence_number);

        writer.put_slice(&contents);

        Ok(())
    }
}

impl Mp4BoxRead for MovieFragmentHeaderBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;

        Ok(MovieFragmentHeaderBox {
            sequence_number: data.read_u32::<BigEndian>()?,
        })
    }
}
