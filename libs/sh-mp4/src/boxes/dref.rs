use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_body, BoxHeader, BoxIter, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

use super::DataEntryUrlBox;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataReferenceBox {
    pub entries: Vec<DataEntryUrlBox>,
}

impl Mp4Box for DataReferenceBox {
    const NAME: FourCC = FourCC(*b"dref");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        let mut size = size_of::<u32>() as u64; // entry_count

        for entry in &self.entries {
            size += entry.size();
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut contents = [0u8; 4];

        BigEndian::write_u32(&mut contents[..], self.entries.len() as _);

        writer.put_slice(&contents);

        for entry in &self.entries {
            entry.write(writer)?;
        }

        Ok(())
    }
}

impl Mp4BoxRead for DataReferenceBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;
        let _entry_count = data.read_u32::<BigEndian>()?;

        let mut entries = Vec::new();
        for child in BoxIter::new(*data) {
            let (header, body) = child?;

            // `urn ` entries point at external files and are not supported
            if header.name == DataEntryUrlBox::NAME {
                entries.push(read_body(&header, body)?);
            }
        }
        *data = &[];

        Ok(DataReferenceBox { entries })
    }
}
