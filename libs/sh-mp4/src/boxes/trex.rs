use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackExtendsBox {
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

impl TrackExtendsBox {
    pub fn new(track_id: u32) -> Self {
        TrackExtendsBox {
            track_id,
            default_sample_description_index: 1,
            default_sample_duration: 0,
            default_sample_size: 0,
            default_sample_flags: 0,
        }
    }
}

impl Mp4Box for TrackExtendsBox {
    const NAME: FourCC = FourCC(*b"trex");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64 + // track_ID
        size_of::<u32>() as u64 + // default_sample_description_index
        size_of::<u32>() as u64 + // default_sample_duration
        size_of::<u32>() as u64 + // default_sample_size
        size_of::<u32>() as u64 // default_sample_flags
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut contents = [0u8; 20];

        BigEndian::write_u32(&mut contents[..], self.track_id);
        BigEndian::write_u32(&mut contents[4..], self.default_sample_description_index);
        BigEndian::write_u32(&mut contents[8..], self.default_sample_duration);
        BigEndian::write_u32(&mut contents[12..], self.default_sample_size);
        BigEndian::write_u32(&mut contents[16..], self.default_sample_flags);

        writer.put_slice(&contents);

        Ok(())
    }
}

impl Mp4BoxRead for TrackExtendsBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;

        Ok(TrackExtendsBox {
            track_id: data.read_u32::<BigEndian>()?,
            default_sample_description_index: data.read_u32::<BigEndian>()?,
            default_sample_duration: data.read_u32::<BigEndian>()?,
            default_sample_size: data.read_u32::<BigEndian>()?,
            default_sample_flags: data.read_u32::<BigEndian>()?,
        })
    }
}
