use four_cc::FourCC;

use bytes::BytesMut;

use crate::{BoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::FileTypeBox;

/// Segment type box. Same layout as `ftyp`, written at the start of a
/// media segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTypeBox(pub FileTypeBox);

impl Mp4Box for SegmentTypeBox {
    const NAME: FourCC = FourCC(*b"styp");

    fn content_size(&self) -> u64 {
        self.0.brands_size()
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        self.0.write_brands(writer)
    }
}

impl Mp4BoxRead for SegmentTypeBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        Ok(SegmentTypeBox(FileTypeBox::read_brands(data)?))
    }
}
