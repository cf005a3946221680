use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFragmentBaseMediaDecodeTimeBox {
    pub base_media_decode_time: u64,
}

impl Mp4Box for TrackFragmentBaseMediaDecodeTimeBox {
    const NAME: FourCC = FourCC(*b"tfdt");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(1, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u64>() as u64 // base_media_decode_time
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut content = [0u8; 8];
        BigEndian::write_u64(&mut content[..], self.base_media_decode_time);

        writer.put_slice(&content);

        Ok(())
    }
}

impl Mp4BoxRead for TrackFragmentBaseMediaDecodeTimeBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;

        let base_media_decode_time = if full_box_header.version == 1 {
            data.read_u64::<BigEndian>()?
        } else {
            data.read_u32::<BigEndian>()? as u64
        };

        Ok(TrackFragmentBaseMediaDecodeTimeBox {
            base_media_decode_time,
        })
    }
}
