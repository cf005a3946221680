use byteorder::{BigEndian, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_bytes, BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

pub const SENC_USE_SUBSAMPLE_ENCRYPTION: u32 = 0x000002;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SubsampleEntry {
    pub bytes_of_clear_data: u16,
    pub bytes_of_protected_data: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleEncryptionEntry {
    pub iv: Vec<u8>,
    pub subsamples: Vec<SubsampleEntry>,
}

impl SampleEncryptionEntry {
    /// Decodes one auxiliary info record, as found in `senc` or pointed at by
    /// `saio`.
    pub fn read(data: &mut &[u8], iv_size: u8, has_subsamples: bool) -> Result<Self, Mp4BoxError> {
        let iv = read_bytes(data, iv_size as usize)?;

        let mut subsamples = Vec::new();
        if has_subsamples {
            let count = data.read_u16::<BigEndian>()?;
            for _ in 0..count {
                subsamples.push(SubsampleEntry {
                    bytes_of_clear_data: data.read_u16::<BigEndian>()?,
                    bytes_of_protected_data: data.read_u32::<BigEndian>()?,
                });
            }
        }

        Ok(SampleEncryptionEntry { iv, subsamples })
    }
}

/// Per-sample encryption parameters. The IV size is only known from `tenc`
/// or `seig`, so the records are kept raw until [`entries`] is called.
///
/// [`entries`]: SampleEncryptionBox::entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleEncryptionBox {
    pub flags: u32,
    pub sample_count: u32,
    pub data: Vec<u8>,
}

impl SampleEncryptionBox {
    pub fn has_subsamples(&self) -> bool {
        self.flags & SENC_USE_SUBSAMPLE_ENCRYPTION != 0
    }

    pub fn entries(&self, iv_size: u8) -> Result<Vec<SampleEncryptionEntry>, Mp4BoxError> {
        let mut data = &self.data[..];
        let mut entries = Vec::with_capacity(self.sample_count.min(4096) as usize);

        for _ in 0..self.sample_count {
            let entry = SampleEncryptionEntry::read(&mut data, iv_size, self.has_subsamples())
                .map_err(|e| e.in_box(Self::NAME))?;
            entries.push(entry);
        }

        Ok(entries)
    }
}

impl Mp4Box for SampleEncryptionBox {
    const NAME: FourCC = FourCC(*b"senc");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, self.flags))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64 + // sample_count
            self.data.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_u32(self.sample_count);
        writer.put_slice(&self.data);

        Ok(())
    }
}

impl Mp4BoxRead for SampleEncryptionBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;
        let sample_count = data.read_u32::<BigEndian>()?;
        let rest = data.to_vec();
        *data = &[];

        Ok(SampleEncryptionBox {
            flags: full_box_header.flags,
            sample_count,
            data: rest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_with_subsamples() {
        let mut data = Vec::new();
        data.extend_from_slice(&[1; 8]);
        data.extend_from_slice(&[0, 1, 0, 16, 0, 0, 1, 0]);
        data.extend_from_slice(&[2; 8]);
        data.extend_from_slice(&[0, 0]);

        let senc = SampleEncryptionBox {
            flags: SENC_USE_SUBSAMPLE_ENCRYPTION,
            sample_count: 2,
            data,
        };

        let decoded = SampleEncryptionBox::read(&senc.to_bytes().unwrap()).unwrap();
        let entries = decoded.entries(8).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].iv, vec![1; 8]);
        assert_eq!(
            entries[0].subsamples,
            vec![SubsampleEntry {
                bytes_of_clear_data: 16,
                bytes_of_protected_data: 256,
            }]
        );
        assert!(entries[1].subsamples.is_empty());
    }

    #[test]
    fn short_entries_are_corrupt() {
        let senc = SampleEncryptionBox {
            flags: 0,
            sample_count: 3,
            data: vec![0; 16],
        };

        assert!(senc.entries(8).unwrap_err().is_corrupt());
    }
}
