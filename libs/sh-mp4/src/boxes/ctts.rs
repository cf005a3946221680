use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositionOffsetEntry {
    pub count: u32,
    pub offset: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositionOffsetBox {
    pub entries: Vec<CompositionOffsetEntry>,
}

impl CompositionOffsetBox {
    pub fn sample_count(&self) -> u64 {
        self.entries.iter().map(|e| e.count as u64).sum()
    }
}

impl Mp4Box for CompositionOffsetBox {
    const NAME: FourCC = FourCC(*b"ctts");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        let version = if self.entries.iter().any(|e| e.offset < 0) {
            1
        } else {
            0
        };

        Some(FullBoxHeader::new(version, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64
            + (size_of::<u32>() as u64 + size_of::<i32>() as u64) * self.entries.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        v.write_u32::<BigEndian>(self.entries.len() as _)?;

        for entry in &self.entries {
            v.write_u32::<BigEndian>(entry.count)?;
            v.write_i32::<BigEndian>(entry.offset)?;
        }

        writer.put_slice(&v);

        Ok(())
    }
}

impl Mp4BoxRead for CompositionOffsetBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;
        let entry_count = data.read_u32::<BigEndian>()? as usize;

        if entry_count > data.len() / 8 {
            return Err(Mp4BoxError::corrupt(
                Self::NAME,
                format!("{} entries do not fit in {} bytes", entry_count, data.len()),
            ));
        }

        // version 0 offsets are unsigned but writers put signed values in
        // them anyway, so both versions read as signed
        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            entries.push(CompositionOffsetEntry {
                count: data.read_u32::<BigEndian>()?,
                offset: data.read_i32::<BigEndian>()?,
            });
        }

        Ok(CompositionOffsetBox { entries })
    }
}
