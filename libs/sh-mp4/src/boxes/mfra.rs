use four_cc::FourCC;

use bytes::BytesMut;

use crate::{read_body, BoxHeader, BoxIter, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::{MovieFragmentRandomAccessOffsetBox, TrackFragmentRandomAccessBox};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieFragmentRandomAccessBox {
    pub tfras: Vec<TrackFragmentRandomAccessBox>,
    pub mfro: MovieFragmentRandomAccessOffsetBox,
}

impl MovieFragmentRandomAccessBox {
    /// Builds the box with `mfro` already holding the final size.
    pub fn new(tfras: Vec<TrackFragmentRandomAccessBox>) -> Self {
        let mut mfra = MovieFragmentRandomAccessBox {
            tfras,
            mfro: MovieFragmentRandomAccessOffsetBox { size: 0 },
        };
        mfra.mfro.size = mfra.size() as u32;

        mfra
    }
}

impl Mp4Box for MovieFragmentRandomAccessBox {
    const NAME: FourCC = FourCC(*b"mfra");

    fn content_size(&self) -> u64 {
        self.tfras.iter().map(|t| t.size()).sum::<u64>() + self.mfro.size()
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        for tfra in &self.tfras {
            tfra.write(writer)?;
        }

        self.mfro.write(writer)?;

        Ok(())
    }
}

impl Mp4BoxRead for MovieFragmentRandomAccessBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let mut tfras = Vec::new();
        let mut mfro = None;

        for child in BoxIter::new(*data) {
            let (header, body) = child?;

            match &header.name.0 {
                b"tfra" => tfras.push(read_body(&header, body)?),
                b"mfro" => mfro = Some(read_body(&header, body)?),
                _ => {}
            }
        }
        *data = &[];

        Ok(MovieFragmentRandomAccessBox {
            tfras,
            mfro: mfro.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing mfro"))?,
        })
    }
}
