use four_cc::FourCC;

use bytes::BytesMut;

use crate::{read_body, BoxHeader, BoxIter, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::EditListBox;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBox {
    pub elst: EditListBox,
}

impl Mp4Box for EditBox {
    const NAME: FourCC = FourCC(*b"edts");

    fn content_size(&self) -> u64 {
        self.elst.size()
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        self.elst.write(writer)
    }
}

impl Mp4BoxRead for EditBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let mut elst = EditListBox::default();

        for child in BoxIter::new(*data) {
            let (header, body) = child?;

            if header.name == EditListBox::NAME {
                elst = read_body(&header, body)?;
            }
        }
        *data = &[];

        Ok(EditBox { elst })
    }
}
