use byteorder::{BigEndian, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoundMediaHeaderBox {
    /// 8.8 fixed point, 0 is centered.
    pub balance: i16,
}

impl Mp4Box for SoundMediaHeaderBox {
    const NAME: FourCC = FourCC(*b"smhd");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u16>() as u64 + // balance
        size_of::<u16>() as u64 // reserved
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_i16(self.balance);
        writer.put_u16(0);

        Ok(())
    }
}

impl Mp4BoxRead for SoundMediaHeaderBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;
        let balance = data.read_i16::<BigEndian>()?;

        Ok(SoundMediaHeaderBox { balance })
    }
}
