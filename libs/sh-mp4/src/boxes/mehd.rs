use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieExtendsHeaderBox {
    pub fragment_duration: u64,
}

impl Mp4Box for MovieExtendsHeaderBox {
    const NAME: FourCC = FourCC(*b"mehd");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(1, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u64>() as u64 // fragment_duration
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut contents = [0u8; 8];

        BigEndian::write_u64(&mut contents[..], self.fragment_duration);

        writer.put_slice(&contents);

        Ok(())
    }
}

impl Mp4BoxRead for MovieExtendsHeaderBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;

        let fragment_duration = if full_box_header.version == 1 {
            data.read_u64::<BigEndian>()?
        } else {
            data.read_u32::<BigEndian>()? as u64
        };

        Ok(MovieExtendsHeaderBox { fragment_duration })
    }
}
