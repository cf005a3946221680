use byteorder::{BigEndian, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_bytes, read_four_cc, BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

/// Sizes of the auxiliary information records of each sample.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleAuxiliaryInformationSizesBox {
    pub aux_info_type: Option<(FourCC, u32)>,
    pub default_sample_info_size: u8,
    pub sample_count: u32,
    /// Only present when the default size is zero.
    pub sample_info_sizes: Vec<u8>,
}

impl SampleAuxiliaryInformationSizesBox {
    pub fn info_size(&self, index: usize) -> Option<u8> {
        if self.default_sample_info_size != 0 {
            return Some(self.default_sample_info_size);
        }

        self.sample_info_sizes.get(index).copied()
    }
}

impl Mp4Box for SampleAuxiliaryInformationSizesBox {
    const NAME: FourCC = FourCC(*b"saiz");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, self.aux_info_type.is_some() as u32))
    }

    fn content_size(&self) -> u64 {
        let mut size = 0;

        if self.aux_info_type.is_some() {
            size += size_of::<u32>() as u64 + // aux_info_type
                size_of::<u32>() as u64; // aux_info_type_parameter
        }

        size += size_of::<u8>() as u64 + // default_sample_info_size
            size_of::<u32>() as u64; // sample_count

        if self.default_sample_info_size == 0 {
            size += self.sample_info_sizes.len() as u64;
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        if let Some((aux_info_type, parameter)) = self.aux_info_type {
            writer.put_slice(&aux_info_type.0);
            writer.put_u32(parameter);
        }

        writer.put_u8(self.default_sample_info_size);
        writer.put_u32(self.sample_count);

        if self.default_sample_info_size == 0 {
            writer.put_slice(&self.sample_info_sizes);
        }

        Ok(())
    }
}

impl Mp4BoxRead for SampleAuxiliaryInformationSizesBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;

        let aux_info_type = if full_box_header.flags & 1 != 0 {
            Some((read_four_cc(data)?, data.read_u32::<BigEndian>()?))
        } else {
            None
        };

        let default_sample_info_size = data.read_u8()?;
        let sample_count = data.read_u32::<BigEndian>()?;

        let sample_info_sizes = if default_sample_info_size == 0 {
            read_bytes(data, sample_count as usize)?
        } else {
            Vec::new()
        };

        Ok(SampleAuxiliaryInformationSizesBox {
            aux_info_type,
            default_sample_info_size,
            sample_count,
            sample_info_sizes,
        })
    }
}
