use byteorder::ReadBytesExt;
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_array, read_bytes, BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

/// Default protection parameters of a track.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackEncryptionBox {
    pub default_crypt_byte_block: u8,
    pub default_skip_byte_block: u8,
    pub default_is_protected: bool,
    pub default_per_sample_iv_size: u8,
    pub default_kid: [u8; 16],
    /// Present only for protected tracks without per-sample IVs.
    pub default_constant_iv: Option<Vec<u8>>,
}

impl TrackEncryptionBox {
    fn version(&self) -> u8 {
        if self.default_crypt_byte_block != 0 || self.default_skip_byte_block != 0 {
            1
        } else {
            0
        }
    }

    fn has_constant_iv(&self) -> bool {
        self.default_is_protected && self.default_per_sample_iv_size == 0
    }
}

impl Mp4Box for TrackEncryptionBox {
    const NAME: FourCC = FourCC(*b"tenc");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(self.version(), 0))
    }

    fn content_size(&self) -> u64 {
        let mut size = size_of::<u8>() as u64 + // reserved
            size_of::<u8>() as u64 + // default_crypt_byte_block, default_skip_byte_block
            size_of::<u8>() as u64 + // default_isProtected
            size_of::<u8>() as u64 + // default_Per_Sample_IV_Size
            16; // default_KID

        if self.has_constant_iv() {
            let constant_iv = self.default_constant_iv.as_deref().unwrap_or_default();
            size += 1 + constant_iv.len() as u64;
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_u8(0);

        if self.version() == 0 {
            writer.put_u8(0);
        } else {
            writer.put_u8(self.default_crypt_byte_block << 4 | (self.default_skip_byte_block & 0x0f));
        }

        writer.put_u8(self.default_is_protected as u8);
        writer.put_u8(self.default_per_sample_iv_size);
        writer.put_slice(&self.default_kid);

        if self.has_constant_iv() {
            let constant_iv = self.default_constant_iv.as_deref().unwrap_or_default();
            writer.put_u8(constant_iv.len() as u8);
            writer.put_slice(constant_iv);
        }

        Ok(())
    }
}

impl Mp4BoxRead for TrackEncryptionBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;

        let _reserved = data.read_u8()?;
        let pattern = data.read_u8()?;
        let (default_crypt_byte_block, default_skip_byte_block) = if full_box_header.version == 0 {
            (0, 0)
        } else {
            (pattern >> 4, pattern & 0x0f)
        };

        let default_is_protected = data.read_u8()? == 1;
        let default_per_sample_iv_size = data.read_u8()?;
        let default_kid = read_array::<16>(data)?;

        let default_constant_iv = if default_is_protected && default_per_sample_iv_size == 0 {
            let size = data.read_u8()?;
            Some(read_bytes(data, size as usize)?)
        } else {
            None
        };

        Ok(TrackEncryptionBox {
            default_crypt_byte_block,
            default_skip_byte_block,
            default_is_protected,
            default_per_sample_iv_size,
            default_kid,
            default_constant_iv,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_and_constant_iv() {
        let tenc = TrackEncryptionBox {
            default_crypt_byte_block: 1,
            default_skip_byte_block: 9,
            default_is_protected: true,
            default_per_sample_iv_size: 0,
            default_kid: [7; 16],
            default_constant_iv: Some(vec![1; 16]),
        };

        let bytes = tenc.to_bytes().unwrap();
        assert_eq!(bytes[8], 1);
        assert_eq!(bytes[13], 0x19);
        assert_eq!(TrackEncryptionBox::read(&bytes).unwrap(), tenc);
    }
}
