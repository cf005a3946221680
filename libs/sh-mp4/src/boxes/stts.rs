use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeToSampleEntry {
    pub count: u32,
    pub delta: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeToSampleBox {
    pub entries: Vec<TimeToSampleEntry>,
}

impl TimeToSampleBox {
    pub fn sample_count(&self) -> u64 {
        self.entries.iter().map(|e| e.count as u64).sum()
    }
}

impl Mp4Box for TimeToSampleBox {
    const NAME: FourCC = FourCC(*b"stts");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64
            + (size_of::<u32>() as u64 + size_of::<u32>() as u64) * self.entries.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        v.write_u32::<BigEndian>(self.entries.len() as _)?;

        for entry in &self.entries {
            v.write_u32::<BigEndian>(entry.count)?;
            v.write_u32::<BigEndian>(entry.delta)?;
        }

        writer.put_slice(&v);

        Ok(())
    }
}

impl Mp4BoxRead for TimeToSampleBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;
        let entry_count = data.read_u32::<BigEndian>()? as usize;

        if entry_count > data.len() / 8 {
            return Err(Mp4BoxError::corrupt(
                Self::NAME,
                format!("{} entries do not fit in {} bytes", entry_count, data.len()),
            ));
        }

        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            entries.push(TimeToSampleEntry {
                count: data.read_u32::<BigEndian>()?,
                delta: data.read_u32::<BigEndian>()?,
            });
        }

        Ok(TimeToSampleBox { entries })
    }
}
