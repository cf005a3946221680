use byteorder::{BigEndian, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_array, read_bytes, BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

pub const SYSTEM_ID_WIDEVINE: [u8; 16] = [
    0xed, 0xef, 0x8b, 0xa9, 0x79, 0xd6, 0x4a, 0xce, 0xa3, 0xc8, 0x27, 0xdc, 0xd5, 0x1d, 0x21, 0xed,
];
pub const SYSTEM_ID_PLAYREADY: [u8; 16] = [
    0x9a, 0x04, 0xf0, 0x79, 0x98, 0x40, 0x42, 0x86, 0xab, 0x92, 0xe6, 0x5b, 0xe0, 0x88, 0x5f, 0x95,
];
pub const SYSTEM_ID_FAIRPLAY: [u8; 16] = [
    0x94, 0xce, 0x86, 0xfb, 0x07, 0xff, 0x4f, 0x43, 0xad, 0xb8, 0x93, 0xd2, 0xfa, 0x96, 0x8c, 0xa2,
];

/// Protection system specific header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionSystemHeaderBox {
    pub system_id: [u8; 16],
    pub kids: Vec<[u8; 16]>,
    pub data: Vec<u8>,
}

impl ProtectionSystemHeaderBox {
    pub fn is_widevine(&self) -> bool {
        self.system_id == SYSTEM_ID_WIDEVINE
    }

    pub fn is_playready(&self) -> bool {
        self.system_id == SYSTEM_ID_PLAYREADY
    }

    pub fn is_fairplay(&self) -> bool {
        self.system_id == SYSTEM_ID_FAIRPLAY
    }
}

impl Mp4Box for ProtectionSystemHeaderBox {
    const NAME: FourCC = FourCC(*b"pssh");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        let version = if self.kids.is_empty() { 0 } else { 1 };

        Some(FullBoxHeader::new(version, 0))
    }

    fn content_size(&self) -> u64 {
        let mut size = 16; // SystemID

        if !self.kids.is_empty() {
            size += size_of::<u32>() as u64 + // KID_count
                16 * self.kids.len() as u64;
        }

        size + size_of::<u32>() as u64 + // DataSize
            self.data.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(&self.system_id);

        if !self.kids.is_empty() {
            writer.put_u32(self.kids.len() as u32);
            for kid in &self.kids {
                writer.put_slice(kid);
            }
        }

        writer.put_u32(self.data.len() as u32);
        writer.put_slice(&self.data);

        Ok(())
    }
}

impl Mp4BoxRead for ProtectionSystemHeaderBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;
        let system_id = read_array::<16>(data)?;

        let mut kids = Vec::new();
        if full_box_header.version > 0 {
            let count = data.read_u32::<BigEndian>()?;
            if count as u64 * 16 > data.len() as u64 {
                return Err(Mp4BoxError::corrupt(Self::NAME, "KID count exceeds box size"));
            }

            for _ in 0..count {
                kids.push(read_array::<16>(data)?);
            }
        }

        let data_size = data.read_u32::<BigEndian>()?;
        let payload = read_bytes(data, data_size as usize)?;

        Ok(ProtectionSystemHeaderBox {
            system_id,
            kids,
            data: payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kids_select_version() {
        let pssh = ProtectionSystemHeaderBox {
            system_id: SYSTEM_ID_WIDEVINE,
            kids: vec![[5; 16]],
            data: vec![1, 2, 3],
        };

        let bytes = pssh.to_bytes().unwrap();
        assert_eq!(bytes[8], 1);

        let decoded = ProtectionSystemHeaderBox::read(&bytes).unwrap();
        assert!(decoded.is_widevine());
        assert_eq!(decoded, pssh);
    }
}
