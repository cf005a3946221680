use byteorder::{BigEndian, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_array, read_bytes, read_four_cc, BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

pub const GROUPING_TYPE_SEIG: FourCC = FourCC(*b"seig");

/// Common encryption parameters for a group of samples, overriding `tenc`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeigSampleGroupEntry {
    pub crypt_byte_block: u8,
    pub skip_byte_block: u8,
    pub is_protected: bool,
    pub per_sample_iv_size: u8,
    pub kid: [u8; 16],
    pub constant_iv: Option<Vec<u8>>,
}

impl SeigSampleGroupEntry {
    fn has_constant_iv(&self) -> bool {
        self.is_protected && self.per_sample_iv_size == 0
    }

    fn size(&self) -> u64 {
        let mut size = 20;

        if self.has_constant_iv() {
            size += 1 + self.constant_iv.as_ref().map(|iv| iv.len()).unwrap_or(0) as u64;
        }

        size
    }

    fn read(data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _reserved = data.read_u8()?;
        let pattern = data.read_u8()?;
        let is_protected = data.read_u8()? == 1;
        let per_sample_iv_size = data.read_u8()?;
        let kid = read_array::<16>(data)?;

        let constant_iv = if is_protected && per_sample_iv_size == 0 {
            let size = data.read_u8()?;
            Some(read_bytes(data, size as usize)?)
        } else {
            None
        };

        Ok(SeigSampleGroupEntry {
            crypt_byte_block: pattern >> 4,
            skip_byte_block: pattern & 0x0f,
            is_protected,
            per_sample_iv_size,
            kid,
            constant_iv,
        })
    }

    fn write(&self, writer: &mut BytesMut) {
        writer.put_u8(0);
        writer.put_u8(self.crypt_byte_block << 4 | (self.skip_byte_block & 0x0f));
        writer.put_u8(self.is_protected as u8);
        writer.put_u8(self.per_sample_iv_size);
        writer.put_slice(&self.kid);

        if self.has_constant_iv() {
            let constant_iv = self.constant_iv.as_deref().unwrap_or_default();
            writer.put_u8(constant_iv.len() as u8);
            writer.put_slice(constant_iv);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleGroupEntry {
    Seig(SeigSampleGroupEntry),
    /// An entry of a grouping type without a decoder, kept as raw bytes.
    Other(Vec<u8>),
}

impl SampleGroupEntry {
    fn size(&self) -> u64 {
        match self {
            SampleGroupEntry::Seig(seig) => seig.size(),
            SampleGroupEntry::Other(data) => data.len() as u64,
        }
    }
}

/// Sample group description. Always written as version 1 with explicit
/// description lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleGroupDescriptionBox {
    pub grouping_type: FourCC,
    pub default_group_description_index: Option<u32>,
    pub entries: Vec<SampleGroupEntry>,
}

impl SampleGroupDescriptionBox {
    pub fn seig(&self) -> impl Iterator<Item = &SeigSampleGroupEntry> {
        self.entries.iter().filter_map(|e| match e {
            SampleGroupEntry::Seig(seig) => Some(seig),
            SampleGroupEntry::Other(_) => None,
        })
    }
}

impl Mp4Box for SampleGroupDescriptionBox {
    const NAME: FourCC = FourCC(*b"sgpd");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        let version = if self.default_group_description_index.is_some() { 2 } else { 1 };

        Some(FullBoxHeader::new(version, 0))
    }

    fn content_size(&self) -> u64 {
        let mut size = size_of::<u32>() as u64 + // grouping_type
            size_of::<u32>() as u64; // default_length

        if self.default_group_description_index.is_some() {
            size += size_of::<u32>() as u64; // default_group_description_index
        }

        size += size_of::<u32>() as u64; // entry_count

        for entry in &self.entries {
            size += size_of::<u32>() as u64 + entry.size(); // description_length, entry
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(&self.grouping_type.0);
        writer.put_u32(0);

        if let Some(index) = self.default_group_description_index {
            writer.put_u32(index);
        }

        writer.put_u32(self.entries.len() as u32);

        for entry in &self.entries {
            writer.put_u32(entry.size() as u32);

            match entry {
                SampleGroupEntry::Seig(seig) => seig.write(writer),
                SampleGroupEntry::Other(data) => writer.put_slice(data),
            }
        }

        Ok(())
    }
}

impl Mp4BoxRead for SampleGroupDescriptionBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;
        let grouping_type = read_four_cc(data)?;

        let default_length = if full_box_header.version >= 1 {
            data.read_u32::<BigEndian>()?
        } else {
            0
        };

        let default_group_description_index = if full_box_header.version >= 2 {
            Some(data.read_u32::<BigEndian>()?)
        } else {
            None
        };

        let entry_count = data.read_u32::<BigEndian>()?;

        let mut entries = Vec::new();
        for _ in 0..entry_count {
            let length = if full_box_header.version >= 1 && default_length == 0 {
                Some(data.read_u32::<BigEndian>()?)
            } else if full_box_header.version >= 1 {
                Some(default_length)
            } else {
                None
            };

            let entry = match (grouping_type == GROUPING_TYPE_SEIG, length) {
                (true, Some(length)) => {
                    let body = read_bytes(data, length as usize)?;
                    SampleGroupEntry::Seig(SeigSampleGroupEntry::read(&mut &body[..])?)
                }
                (true, None) => SampleGroupEntry::Seig(SeigSampleGroupEntry::read(data)?),
                (false, Some(length)) => SampleGroupEntry::Other(read_bytes(data, length as usize)?),
                (false, None) => {
                    // version 0 entries of unknown types have no length, so
                    // the rest of the box is kept as one entry
                    let rest = data.to_vec();
                    *data = &[];
                    entries.push(SampleGroupEntry::Other(rest));
                    break;
                }
            };

            entries.push(entry);
        }

        Ok(SampleGroupDescriptionBox {
            grouping_type,
            default_group_description_index,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seig_entries() {
        let sgpd = SampleGroupDescriptionBox {
            grouping_type: GROUPING_TYPE_SEIG,
            default_group_description_index: None,
            entries: vec![SampleGroupEntry::Seig(SeigSampleGroupEntry {
                crypt_byte_block: 1,
                skip_byte_block: 9,
                is_protected: true,
                per_sample_iv_size: 0,
                kid: [3; 16],
                constant_iv: Some(vec![4; 16]),
            })],
        };

        let bytes = sgpd.to_bytes().unwrap();
        let decoded = SampleGroupDescriptionBox::read(&bytes).unwrap();

        assert_eq!(decoded, sgpd);
        assert_eq!(decoded.seig().next().unwrap().skip_byte_block, 9);
    }
}
