use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RandomAccessEntry {
    pub time: u64,
    pub moof_offset: u64,
    pub traf_number: u32,
    pub trun_number: u32,
    pub sample_number: u32,
}

impl RandomAccessEntry {
    /// An entry pointing at the first sample of the first run of the first
    /// track fragment in the `moof` at `moof_offset`.
    pub fn new(time: u64, moof_offset: u64) -> Self {
        RandomAccessEntry {
            time,
            moof_offset,
            traf_number: 1,
            trun_number: 1,
            sample_number: 1,
        }
    }
}

/// Maps fragment times of one track to the byte offset of their `moof`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFragmentRandomAccessBox {
    pub track_id: u32,
    /// Byte widths minus one of the traf, trun and sample numbers.
    pub length_size_of_traf_num: u8,
    pub length_size_of_trun_num: u8,
    pub length_size_of_sample_num: u8,
    pub entries: Vec<RandomAccessEntry>,
}

impl TrackFragmentRandomAccessBox {
    pub fn new(track_id: u32) -> Self {
        TrackFragmentRandomAccessBox {
            track_id,
            length_size_of_traf_num: 0,
            length_size_of_trun_num: 0,
            length_size_of_sample_num: 0,
            entries: Vec::new(),
        }
    }

    fn entry_size(&self) -> u64 {
        size_of::<u64>() as u64 + // time
            size_of::<u64>() as u64 + // moof_offset
            (self.length_size_of_traf_num & 3) as u64 + 1 + // traf_number
            (self.length_size_of_trun_num & 3) as u64 + 1 + // trun_number
            (self.length_size_of_sample_num & 3) as u64 + 1 // sample_number
    }
}

impl Mp4Box for TrackFragmentRandomAccessBox {
    const NAME: FourCC = FourCC(*b"tfra");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(1, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64 + // track_ID
            size_of::<u32>() as u64 + // reserved, length sizes
            size_of::<u32>() as u64 + // number_of_entry
            self.entry_size() * self.entries.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::with_capacity(self.content_size() as usize);

        v.write_u32::<BigEndian>(self.track_id)?;
        v.write_u32::<BigEndian>(
            ((self.length_size_of_traf_num & 3) as u32) << 4
                | ((self.length_size_of_trun_num & 3) as u32) << 2
                | (self.length_size_of_sample_num & 3) as u32,
        )?;
        v.write_u32::<BigEndian>(self.entries.len() as u32)?;

        for entry in &self.entries {
            v.write_u64::<BigEndian>(entry.time)?;
            v.write_u64::<BigEndian>(entry.moof_offset)?;
            v.write_uint::<BigEndian>(entry.traf_number as u64, (self.length_size_of_traf_num & 3) as usize + 1)?;
            v.write_uint::<BigEndian>(entry.trun_number as u64, (self.length_size_of_trun_num & 3) as usize + 1)?;
            v.write_uint::<BigEndian>(
                entry.sample_number as u64,
                (self.length_size_of_sample_num & 3) as usize + 1,
            )?;
        }

        writer.put_slice(&v);

        Ok(())
    }
}

impl Mp4BoxRead for TrackFragmentRandomAccessBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;

        let track_id = data.read_u32::<BigEndian>()?;
        let lengths = data.read_u32::<BigEndian>()?;
        let entry_count = data.read_u32::<BigEndian>()?;

        let mut tfra = TrackFragmentRandomAccessBox::new(track_id);
        tfra.length_size_of_traf_num = ((lengths >> 4) & 3) as u8;
        tfra.length_size_of_trun_num = ((lengths >> 2) & 3) as u8;
        tfra.length_size_of_sample_num = (lengths & 3) as u8;

        let mut entry_size = tfra.entry_size();
        if full_box_header.version == 0 {
            entry_size -= 8;
        }
        if entry_size * entry_count as u64 > data.len() as u64 {
            return Err(Mp4BoxError::corrupt(Self::NAME, "entry count exceeds box size"));
        }

        for _ in 0..entry_count {
            let (time, moof_offset) = if full_box_header.version == 1 {
                (data.read_u64::<BigEndian>()?, data.read_u64::<BigEndian>()?)
            } else {
                (
                    data.read_u32::<BigEndian>()? as u64,
                    data.read_u32::<BigEndian>()? as u64,
                )
            };

            let traf_number = data.read_uint::<BigEndian>(tfra.length_size_of_traf_num as usize + 1)? as u32;
            let trun_number = data.read_uint::<BigEndian>(tfra.length_size_of_trun_num as usize + 1)? as u32;
            let sample_number = data.read_uint::<BigEndian>(tfra.length_size_of_sample_num as usize + 1)? as u32;

            tfra.entries.push(RandomAccessEntry {
                time,
                moof_offset,
                traf_number,
                trun_number,
                sample_number,
            });
        }

        Ok(tfra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honours_number_widths() {
        let mut tfra = TrackFragmentRandomAccessBox::new(2);
        tfra.length_size_of_sample_num = 2;
        tfra.entries.push(RandomAccessEntry::new(9000, 1024));
        tfra.entries.push(RandomAccessEntry {
            sample_number: 0x010203,
            ..RandomAccessEntry::new(18000, 1 << 33)
        });

        let bytes = tfra.to_bytes().unwrap();
        assert_eq!(bytes.len(), 12 + 12 + 2 * (16 + 1 + 1 + 3));
        assert_eq!(bytes[19], 0x02);
        assert_eq!(TrackFragmentRandomAccessBox::read(&bytes).unwrap(), tfra);
    }

    #[test]
    fn reads_version_zero() {
        let mut bytes = vec![0, 0, 0, 35, b't', b'f', b'r', b'a', 0, 0, 0, 0];
        bytes.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1]);
        bytes.extend_from_slice(&[0, 0, 0, 10, 0, 0, 0, 20, 1, 1, 1]);

        let tfra = TrackFragmentRandomAccessBox::read(&bytes).unwrap();
        assert_eq!(tfra.entries, vec![RandomAccessEntry::new(10, 20)]);
    }
}
