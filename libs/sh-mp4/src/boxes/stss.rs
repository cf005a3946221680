use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSampleBox {
    /// 1-based sample numbers, ascending.
    pub sample_numbers: Vec<u32>,
}

impl Mp4Box for SyncSampleBox {
    const NAME: FourCC = FourCC(*b"stss");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64 + size_of::<u32>() as u64 * self.sample_numbers.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        v.write_u32::<BigEndian>(self.sample_numbers.len() as u32)?;

        for &sample_number in &self.sample_numbers {
            v.write_u32::<BigEndian>(sample_number)?;
        }

        writer.put_slice(&v);

        Ok(())
    }
}

impl Mp4BoxRead for SyncSampleBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;
        let entry_count = data.read_u32::<BigEndian>()? as usize;

        if entry_count > data.len() / 4 {
            return Err(Mp4BoxError::corrupt(
                Self::NAME,
                format!("{} entries do not fit in {} bytes", entry_count, data.len()),
            ));
        }

        let mut sample_numbers = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            sample_numbers.push(data.read_u32::<BigEndian>()?);
        }

        Ok(SyncSampleBox { sample_numbers })
    }
}
