use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditListEntry {
    /// In movie timescale.
    pub segment_duration: u64,
    /// In media timescale, -1 marks an empty edit.
    pub media_time: i64,
    pub media_rate_integer: i16,
    pub media_rate_fraction: i16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditListBox {
    pub entries: Vec<EditListEntry>,
}

impl EditListBox {
    fn version(&self) -> u8 {
        let wide = self.entries.iter().any(|e| {
            e.segment_duration > u32::MAX as u64
                || e.media_time > i32::MAX as i64
                || e.media_time < i32::MIN as i64
        });

        if wide {
            1
        } else {
            0
        }
    }

    /// Duration of the leading empty edit, if any.
    pub fn empty_duration(&self) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.media_time == -1)
            .map(|e| e.segment_duration)
    }
}

impl Mp4Box for EditListBox {
    const NAME: FourCC = FourCC(*b"elst");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(self.version(), 0))
    }

    fn content_size(&self) -> u64 {
        let times = if self.version() == 1 {
            size_of::<u64>() as u64 + size_of::<i64>() as u64
        } else {
            size_of::<u32>() as u64 + size_of::<i32>() as u64
        };
        let entry_size = times + size_of::<i16>() as u64 * 2; // media_rate

        size_of::<u32>() as u64 + entry_size * self.entries.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();
        let version = self.version();

        v.write_u32::<BigEndian>(self.entries.len() as u32)?;

        for entry in &self.entries {
            if version == 1 {
                v.write_u64::<BigEndian>(entry.segment_duration)?;
                v.write_i64::<BigEndian>(entry.media_time)?;
            } else {
                v.write_u32::<BigEndian>(entry.segment_duration as u32)?;
                v.write_i32::<BigEndian>(entry.media_time as i32)?;
            }

            v.write_i16::<BigEndian>(entry.media_rate_integer)?;
            v.write_i16::<BigEndian>(entry.media_rate_fraction)?;
        }

        writer.put_slice(&v);

        Ok(())
    }
}

impl Mp4BoxRead for EditListBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;
        let entry_count = data.read_u32::<BigEndian>()? as usize;

        let entry_size = if full_box_header.version == 1 { 20 } else { 12 };
        if entry_count > data.len() / entry_size {
            return Err(Mp4BoxError::corrupt(
                Self::NAME,
                format!("{} entries do not fit in {} bytes", entry_count, data.len()),
            ));
        }

        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            let (segment_duration, media_time) = if full_box_header.version == 1 {
                (data.read_u64::<BigEndian>()?, data.read_i64::<BigEndian>()?)
            } else {
                (
                    data.read_u32::<BigEndian>()? as u64,
                    data.read_i32::<BigEndian>()? as i64,
                )
            };

            entries.push(EditListEntry {
                segment_duration,
                media_time,
                media_rate_integer: data.read_i16::<BigEndian>()?,
                media_rate_fraction: data.read_i16::<BigEndian>()?,
            });
        }

        Ok(EditListBox { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_values_switch_to_version_one() {
        let mut elst = EditListBox {
            entries: vec![
                EditListEntry {
                    segment_duration: 500,
                    media_time: -1,
                    media_rate_integer: 1,
                    media_rate_fraction: 0,
                },
                EditListEntry {
                    segment_duration: 10_000,
                    media_time: 0,
                    media_rate_integer: 1,
                    media_rate_fraction: 0,
                },
            ],
        };

        let bytes = elst.to_bytes().unwrap();
        assert_eq!(bytes[8], 0);
        assert_eq!(bytes.len(), 12 + 4 + 2 * 12);
        assert_eq!(EditListBox::read(&bytes).unwrap(), elst);
        assert_eq!(elst.empty_duration(), Some(500));

        elst.entries[1].segment_duration = 1 << 33;
        let bytes = elst.to_bytes().unwrap();
        assert_eq!(bytes[8], 1);
        assert_eq!(EditListBox::read(&bytes).unwrap(), elst);
    }
}
