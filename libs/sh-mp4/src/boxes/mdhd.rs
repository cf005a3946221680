use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

/// Packed ISO-639-2 code for "und".
pub const LANGUAGE_UNDETERMINED: u16 = 0x55c4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHeaderBox {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub language: u16,
}

impl MediaHeaderBox {
    fn version(&self) -> u8 {
        let max = self
            .creation_time
            .max(self.modification_time)
            .max(self.duration);

        if max > u32::MAX as u64 {
            1
        } else {
            0
        }
    }
}

impl Mp4Box for MediaHeaderBox {
    const NAME: FourCC = FourCC(*b"mdhd");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(self.version(), 0))
    }

    fn content_size(&self) -> u64 {
        let times = if self.version() == 1 {
            size_of::<u64>() as u64 * 3 + size_of::<u32>() as u64
        } else {
            size_of::<u32>() as u64 * 4
        };

        times + // creation_time, modification_time, timescale, duration
        size_of::<u16>() as u64 + // language
        size_of::<u16>() as u64 // pre_defined
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut contents = [0u8; 32];

        let offset = if self.version() == 1 {
            BigEndian::write_u64(&mut contents[..], self.creation_time);
            BigEndian::write_u64(&mut contents[8..], self.modification_time);
            BigEndian::write_u32(&mut contents[16..], self.timescale);
            BigEndian::write_u64(&mut contents[20..], self.duration);
            28
        } else {
            BigEndian::write_u32(&mut contents[..], self.creation_time as u32);
            BigEndian::write_u32(&mut contents[4..], self.modification_time as u32);
            BigEndian::write_u32(&mut contents[8..], self.timescale);
            BigEndian::write_u32(&mut contents[12..], self.duration as u32);
            16
        };

        BigEndian::write_u16(&mut contents[offset..], self.language);

        writer.put_slice(&contents[..offset + 4]);

        Ok(())
    }
}

impl Mp4BoxRead for MediaHeaderBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;

        let (creation_time, modification_time, timescale, duration) =
            if full_box_header.version == 1 {
                (
                    data.read_u64::<BigEndian>()?,
                    data.read_u64::<BigEndian>()?,
                    data.read_u32::<BigEndian>()?,
                    data.read_u64::<BigEndian>()?,
                )
            } else {
                (
                    data.read_u32::<BigEndian>()? as u64,
                    data.read_u32::<BigEndian>()? as u64,
                    data.read_u32::<BigEndian>()?,
                    data.read_u32::<BigEndian>()? as u64,
                )
            };

        let language = data.read_u16::<BigEndian>()?;

        Ok(MediaHeaderBox {
            creation_time,
            modification_time,
            timescale,
            duration,
            language,
        })
    }
}
