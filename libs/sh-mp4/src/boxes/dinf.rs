use four_cc::FourCC;

use bytes::BytesMut;

use crate::{read_body, BoxHeader, BoxIter, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::DataReferenceBox;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataInformationBox {
    pub dref: DataReferenceBox,
}

impl Mp4Box for DataInformationBox {
    const NAME: FourCC = FourCC(*b"dinf");

    fn content_size(&self) -> u64 {
        self.dref.size()
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        self.dref.write(writer)?;

        Ok(())
    }
}

impl Mp4BoxRead for DataInformationBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let mut dref = None;

        for child in BoxIter::new(*data) {
            let (header, body) = child?;

            if header.name == DataReferenceBox::NAME {
                dref = Some(read_body(&header, body)?);
            }
        }
        *data = &[];

        let dref = dref.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing dref"))?;

        Ok(DataInformationBox { dref })
    }
}
