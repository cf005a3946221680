use four_cc::FourCC;

use bytes::BytesMut;

use crate::{read_body, BoxHeader, BoxIter, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::{OriginalFormatBox, SchemeTypeBox, TrackEncryptionBox};

const SCHI: FourCC = FourCC(*b"schi");

/// Protection scheme info of an `encv`/`enca` sample entry. The `schi`
/// container is flattened into `tenc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionSchemeInfoBox {
    pub frma: OriginalFormatBox,
    pub schm: Option<SchemeTypeBox>,
    pub tenc: Option<TrackEncryptionBox>,
}

impl Mp4Box for ProtectionSchemeInfoBox {
    const NAME: FourCC = FourCC(*b"sinf");

    fn content_size(&self) -> u64 {
        let mut size = self.frma.size();

        if let Some(schm) = &self.schm {
            size += schm.size();
        }

        if let Some(tenc) = &self.tenc {
            size += BoxHeader::new(SCHI, tenc.size()).size;
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        self.frma.write(writer)?;

        if let Some(schm) = &self.schm {
            schm.write(writer)?;
        }

        if let Some(tenc) = &self.tenc {
            BoxHeader::new(SCHI, tenc.size()).write(writer);
            tenc.write(writer)?;
        }

        Ok(())
    }
}

impl Mp4BoxRead for ProtectionSchemeInfoBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let mut frma = None;
        let mut schm = None;
        let mut tenc = None;

        for child in BoxIter::new(*data) {
            let (header, body) = child?;

            match &header.name.0 {
                b"frma" => frma = Some(read_body(&header, body)?),
                b"schm" => schm = Some(read_body(&header, body)?),
                b"schi" => {
                    for child in BoxIter::new(body) {
                        let (header, body) = child?;

                        if header.name == TrackEncryptionBox::NAME {
                            tenc = Some(read_body(&header, body)?);
                        }
                    }
                }
                _ => {}
            }
        }
        *data = &[];

        let frma = frma.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing frma"))?;

        Ok(ProtectionSchemeInfoBox { frma, schm, tenc })
    }
}
