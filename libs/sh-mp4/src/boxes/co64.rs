use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkLargeOffsetBox {
    pub chunk_offsets: Vec<u64>,
}

impl Mp4Box for ChunkLargeOffsetBox {
    const NAME: FourCC = FourCC(*b"co64");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64 + (size_of::<u64>() as u64) * self.chunk_offsets.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        v.write_u32::<BigEndian>(self.chunk_offsets.len() as u32)?;

        for &chunk_offset in &self.chunk_offsets {
            v.write_u64::<BigEndian>(chunk_offset)?;
        }

        writer.put_slice(&v);

        Ok(())
    }
}

impl Mp4BoxRead for ChunkLargeOffsetBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;
        let entry_count = data.read_u32::<BigEndian>()? as usize;

        if entry_count > data.len() / 8 {
            return Err(Mp4BoxError::corrupt(
                Self::NAME,
                format!("{} offsets do not fit in {} bytes", entry_count, data.len()),
            ));
        }

        let mut chunk_offsets = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            chunk_offsets.push(data.read_u64::<BigEndian>()?);
        }

        Ok(ChunkLargeOffsetBox { chunk_offsets })
    }
}
