use four_cc::FourCC;

use bytes::BytesMut;

use crate::{read_body, BoxHeader, BoxIter, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::{MovieExtendsHeaderBox, TrackExtendsBox};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieExtendsBox {
    pub mehd: Option<MovieExtendsHeaderBox>,
    pub trex: Vec<TrackExtendsBox>,
}

impl Mp4Box for MovieExtendsBox {
    const NAME: FourCC = FourCC(*b"mvex");

    fn content_size(&self) -> u64 {
        let mut size = 0;

        if let Some(mehd) = &self.mehd {
            size += mehd.size();
        }

        for trex in &self.trex {
            size += trex.size();
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        if let Some(mehd) = &self.mehd {
            mehd.write(writer)?;
        }

        for trex in &self.trex {
            trex.write(writer)?;
        }

        Ok(())
    }
}

impl Mp4BoxRead for MovieExtendsBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let mut mehd = None;
        let mut trex = Vec::new();

        for child in BoxIter::new(*data) {
            let (header, body) = child?;

            match &header.name.0 {
                b"mehd" => mehd = Some(read_body(&header, body)?),
                b"trex" => trex.push(read_body(&header, body)?),
                _ => {}
            }
        }
        *data = &[];

        Ok(MovieExtendsBox { mehd, trex })
    }
}
