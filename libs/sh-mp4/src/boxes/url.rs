use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

/// Media data location. An empty location means the data lives in the
/// same file, which is signalled by flag 1 and no string at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataEntryUrlBox {
    pub location: String,
}

impl DataEntryUrlBox {
    pub fn self_contained() -> Self {
        DataEntryUrlBox::default()
    }

    pub fn is_self_contained(&self) -> bool {
        self.location.is_empty()
    }
}

impl Mp4Box for DataEntryUrlBox {
    const NAME: FourCC = FourCC(*b"url ");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        let flags = if self.is_self_contained() { 0x000001 } else { 0 };

        Some(FullBoxHeader::new(0, flags))
    }

    fn content_size(&self) -> u64 {
        if self.is_self_contained() {
            0
        } else {
            self.location.as_bytes().len() as u64 + 1
        }
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        if !self.is_self_contained() {
            writer.put_slice(self.location.as_bytes());
            writer.put_u8(0);
        }

        Ok(())
    }
}

impl Mp4BoxRead for DataEntryUrlBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;

        let location = if full_box_header.flags & 1 == 1 {
            String::new()
        } else {
            let location = data.split(|&b| b == 0).next().unwrap_or_default();
            String::from_utf8_lossy(location).into_owned()
        };
        *data = &[];

        Ok(DataEntryUrlBox { location })
    }
}
