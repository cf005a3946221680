use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{skip_bytes, BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieHeaderBox {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub next_track_id: u32,
}

impl MovieHeaderBox {
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

impl Mp4Box for MovieHeaderBox {
    const NAME: FourCC = FourCC(*b"mvhd");

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
        size_of::<u32>() as u64 + // rate
        size_of::<u16>() as u64 + // volume
        size_of::<u16>() as u64 + // reserved
        size_of::<u32>() as u64 * 2 + // reserved
        size_of::<i32>() as u64 * 9 + // matrix
        size_of::<u32>() as u64 * 6 + // pre_defined
        size_of::<u32>() as u64 // next_track_ID
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut contents = [0u8; 108];

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

        let rest = &mut contents[offset..];

        BigEndian::write_i32(&mut rest[..], 0x00010000); // rate
        BigEndian::write_i16(&mut rest[4..], 0x0100); // volume

        BigEndian::write_i32(&mut rest[16..], 0x00010000);
        BigEndian::write_i32(&mut rest[32..], 0x00010000);
        BigEndian::write_i32(&mut rest[48..], 0x40000000);

        BigEndian::write_u32(&mut rest[76..], self.next_track_id);

        writer.put_slice(&contents[..offset + 80]);

        Ok(())
    }
}

impl Mp4BoxRead for MovieHeaderBox {
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

        // rate, volume, reserved, matrix and pre_defined
        skip_bytes(data, 76)?;
        let next_track_id = data.read_u32::<BigEndian>()?;

        Ok(MovieHeaderBox {
            creation_time,
            modification_time,
            timescale,
            duration,
            next_track_id,
        })
    }
}
