use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleToChunkEntry {
    /// 1-based.
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleToChunkBox {
    pub entries: Vec<SampleToChunkEntry>,
}

impl Mp4Box for SampleToChunkBox {
    const NAME: FourCC = FourCC(*b"stsc");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64 + (size_of::<u32>() as u64 * 3) * self.entries.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        v.write_u32::<BigEndian>(self.entries.len() as u32)?;

        for entry in &self.entries {
            v.write_u32::<BigEndian>(entry.first_chunk)?;
            v.write_u32::<BigEndian>(entry.samples_per_chunk)?;
            v.write_u32::<BigEndian>(entry.sample_description_index)?;
        }

        writer.put_slice(&v);

        Ok(())
    }
}

impl Mp4BoxRead for SampleToChunkBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;
        let entry_count = data.read_u32::<BigEndian>()? as usize;

        if entry_count > data.len() / 12 {
            return Err(Mp4BoxError::corrupt(
                Self::NAME,
                format!("{} entries do not fit in {} bytes", entry_count, data.len()),
            ));
        }

        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            entries.push(SampleToChunkEntry {
                first_chunk: data.read_u32::<BigEndian>()?,
                samples_per_chunk: data.read_u32::<BigEndian>()?,
                sample_description_index: data.read_u32::<BigEndian>()?,
            });
        }

        Ok(SampleToChunkBox { entries })
    }
}
