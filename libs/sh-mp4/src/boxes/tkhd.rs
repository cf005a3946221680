use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{skip_bytes, BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

bitflags::bitflags! {
    pub struct TrackHeaderFlags: u32 {
        const ENABLED = 0x000001;
        const IN_MOVIE = 0x000002;
        const IN_PREVIEW = 0x000004;
        const SIZE_IS_ASPECT_RATIO = 0x000008;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackHeaderBox {
    pub flags: TrackHeaderFlags,
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub duration: u64,
    pub alternate_group: u16,
    /// 8.8 fixed point, 0x0100 for audio tracks.
    pub volume: u16,
    /// 16.16 fixed point.
    pub width: u32,
    /// 16.16 fixed point.
    pub height: u32,
}

impl TrackHeaderBox {
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

impl Mp4Box for TrackHeaderBox {
    const NAME: FourCC = FourCC(*b"tkhd");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(self.version(), self.flags.bits()))
    }

    fn content_size(&self) -> u64 {
        let times = if self.version() == 1 {
            size_of::<u64>() as u64 * 3 + size_of::<u32>() as u64 * 2
        } else {
            size_of::<u32>() as u64 * 5
        };

        times + // creation_time, modification_time, track_ID, reserved, duration
        size_of::<u32>() as u64 * 2 + // reserved
        size_of::<u16>() as u64 + // layer
        size_of::<u16>() as u64 + // alternate_group
        size_of::<u16>() as u64 + // volume
        size_of::<u16>() as u64 + // reserved
        size_of::<i32>() as u64 * 9 + // matrix
        size_of::<u32>() as u64 + // width
        size_of::<u32>() as u64 // height
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut contents = [0u8; 92];

        let offset = if self.version() == 1 {
            BigEndian::write_u64(&mut contents[..], self.creation_time);
            BigEndian::write_u64(&mut contents[8..], self.modification_time);
            BigEndian::write_u32(&mut contents[16..], self.track_id);
            BigEndian::write_u64(&mut contents[24..], self.duration);
            32
        } else {
            BigEndian::write_u32(&mut contents[..], self.creation_time as u32);
            BigEndian::write_u32(&mut contents[4..], self.modification_time as u32);
            BigEndian::write_u32(&mut contents[8..], self.track_id);
            BigEndian::write_u32(&mut contents[16..], self.duration as u32);
            20
        };

        let rest = &mut contents[offset..];

        BigEndian::write_u16(&mut rest[10..], self.alternate_group);
        BigEndian::write_u16(&mut rest[12..], self.volume);

        BigEndian::write_i32(&mut rest[16..], 0x00010000);
        BigEndian::write_i32(&mut rest[32..], 0x00010000);
        BigEndian::write_i32(&mut rest[48..], 0x40000000);

        BigEndian::write_u32(&mut rest[52..], self.width);
        BigEndian::write_u32(&mut rest[56..], self.height);

        writer.put_slice(&contents[..offset + 60]);

        Ok(())
    }
}

impl Mp4BoxRead for TrackHeaderBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;

        let (creation_time, modification_time, track_id, duration) =
            if full_box_header.version == 1 {
                let creation_time = data.read_u64::<BigEndian>()?;
                let modification_time = data.read_u64::<BigEndian>()?;
                let track_id = data.read_u32::<BigEndian>()?;
                skip_bytes(data, 4)?;

                (creation_time, modification_time, track_id, data.read_u64::<BigEndian>()?)
            } else {
                let creation_time = data.read_u32::<BigEndian>()? as u64;
                let modification_time = data.read_u32::<BigEndian>()? as u64;
                let track_id = data.read_u32::<BigEndian>()?;
                skip_bytes(data, 4)?;

                (creation_time, modification_time, track_id, data.read_u32::<BigEndian>()? as u64)
            };

        // reserved and layer
        skip_bytes(data, 10)?;
        let alternate_group = data.read_u16::<BigEndian>()?;
        let volume = data.read_u16::<BigEndian>()?;

        // reserved and matrix
        skip_bytes(data, 38)?;
        let width = data.read_u32::<BigEndian>()?;
        let height = data.read_u32::<BigEndian>()?;

        Ok(TrackHeaderBox {
            flags: TrackHeaderFlags::from_bits_truncate(full_box_header.flags),
            creation_time,
            modification_time,
            track_id,
            duration,
            alternate_group,
            volume,
            width,
            height,
        })
    }
}
