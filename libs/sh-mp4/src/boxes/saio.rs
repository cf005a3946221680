use byteorder::{BigEndian, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_four_cc, BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

/// Offsets of auxiliary information, relative to the enclosing `moof` in
/// fragments or to the file start otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleAuxiliaryInformationOffsetsBox {
    pub aux_info_type: Option<(FourCC, u32)>,
    pub offsets: Vec<u64>,
}

impl SampleAuxiliaryInformationOffsetsBox {
    fn version(&self) -> u8 {
        if self.offsets.iter().any(|&o| o > u32::MAX as u64) {
            1
        } else {
            0
        }
    }
}

impl Mp4Box for SampleAuxiliaryInformationOffsetsBox {
    const NAME: FourCC = FourCC(*b"saio");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(self.version(), self.aux_info_type.is_some() as u32))
    }

    fn content_size(&self) -> u64 {
        let mut size = 0;

        if self.aux_info_type.is_some() {
            size += size_of::<u32>() as u64 + // aux_info_type
                size_of::<u32>() as u64; // aux_info_type_parameter
        }

        let offset_size = if self.version() == 1 { 8 } else { 4 };

        size + size_of::<u32>() as u64 + // entry_count
            offset_size * self.offsets.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        if let Some((aux_info_type, parameter)) = self.aux_info_type {
            writer.put_slice(&aux_info_type.0);
            writer.put_u32(parameter);
        }

        writer.put_u32(self.offsets.len() as u32);

        let large = self.version() == 1;
        for &offset in &self.offsets {
            if large {
                writer.put_u64(offset);
            } else {
                writer.put_u32(offset as u32);
            }
        }

        Ok(())
    }
}

impl Mp4BoxRead for SampleAuxiliaryInformationOffsetsBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;

        let aux_info_type = if full_box_header.flags & 1 != 0 {
            Some((read_four_cc(data)?, data.read_u32::<BigEndian>()?))
        } else {
            None
        };

        let entry_count = data.read_u32::<BigEndian>()?;
        let offset_size = if full_box_header.version == 0 { 4 } else { 8 };
        if entry_count as u64 * offset_size > data.len() as u64 {
            return Err(Mp4BoxError::corrupt(Self::NAME, "entry count exceeds box size"));
        }

        let mut offsets = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let offset = if full_box_header.version == 0 {
                data.read_u32::<BigEndian>()? as u64
            } else {
                data.read_u64::<BigEndian>()?
            };
            offsets.push(offset);
        }

        Ok(SampleAuxiliaryInformationOffsetsBox {
            aux_info_type,
            offsets,
        })
    }
}
