use byteorder::{BigEndian, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

/// Closes an `mfra` box with its total size, so readers can find the index
/// from the end of the file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MovieFragmentRandomAccessOffsetBox {
    pub size: u32,
}

impl Mp4Box for MovieFragmentRandomAccessOffsetBox {
    const NAME: FourCC = FourCC(*b"mfro");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64 // size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_u32(self.size);

        Ok(())
    }
}

impl Mp4BoxRead for MovieFragmentRandomAccessOffsetBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;

        Ok(MovieFragmentRandomAccessOffsetBox {
            size: data.read_u32::<BigEndian>()?,
        })
    }
}
