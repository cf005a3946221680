use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

/// Sample sizes. When `sample_size` is non-zero every sample has that size
/// and `entry_sizes` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleSizeBox {
    pub sample_size: u32,
    pub sample_count: u32,
    pub entry_sizes: Vec<u32>,
}

impl SampleSizeBox {
    pub fn fixed(sample_size: u32, sample_count: u32) -> Self {
        SampleSizeBox {
            sample_size,
            sample_count,
            entry_sizes: Vec::new(),
        }
    }

    pub fn per_sample(entry_sizes: Vec<u32>) -> Self {
        SampleSizeBox {
            sample_size: 0,
            sample_count: entry_sizes.len() as u32,
            entry_sizes,
        }
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        if self.sample_size != 0 {
            if index < self.sample_count as usize {
                Some(self.sample_size)
            } else {
                None
            }
        } else {
            self.entry_sizes.get(index).copied()
        }
    }
}

impl Mp4Box for SampleSizeBox {
    const NAME: FourCC = FourCC(*b"stsz");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64
            + size_of::<u32>() as u64
            + size_of::<u32>() as u64 * self.entry_sizes.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        v.write_u32::<BigEndian>(self.sample_size)?;
        v.write_u32::<BigEndian>(self.sample_count)?;

        for &size in &self.entry_sizes {
            v.write_u32::<BigEndian>(size)?;
        }

        writer.put_slice(&v);

        Ok(())
    }
}

impl Mp4BoxRead for SampleSizeBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;
        let sample_size = data.read_u32::<BigEndian>()?;
        let sample_count = data.read_u32::<BigEndian>()?;

        if sample_size != 0 {
            return Ok(SampleSizeBox::fixed(sample_size, sample_count));
        }

        if sample_count as usize > data.len() / 4 {
            return Err(Mp4BoxError::corrupt(
                Self::NAME,
                format!("{} sizes do not fit in {} bytes", sample_count, data.len()),
            ));
        }

        let mut entry_sizes = Vec::with_capacity(sample_count as usize);
        for _ in 0..sample_count {
            entry_sizes.push(data.read_u32::<BigEndian>()?);
        }

        Ok(SampleSizeBox::per_sample(entry_sizes))
    }
}
