use four_cc::FourCC;

use bytes::BytesMut;

use crate::{read_body, BoxHeader, BoxIter, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::{MovieExtendsBox, MovieHeaderBox, TrackBox};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieBox {
    pub mvhd: MovieHeaderBox,
    pub mvex: Option<MovieExtendsBox>,
    pub tracks: Vec<TrackBox>,
}

impl Mp4Box for MovieBox {
    const NAME: FourCC = FourCC(*b"moov");

    fn content_size(&self) -> u64 {
        let mut size = self.mvhd.size();

        if let Some(mvex) = &self.mvex {
            size += mvex.size();
        }

        for track in &self.tracks {
            size += track.size();
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        self.mvhd.write(writer)?;

        for track in &self.tracks {
            track.write(writer)?;
        }

        if let Some(mvex) = &self.mvex {
            mvex.write(writer)?;
        }

        Ok(())
    }
}

impl Mp4BoxRead for MovieBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let mut mvhd = None;
        let mut mvex = None;
        let mut tracks = Vec::new();

        for child in BoxIter::new(*data) {
            let (header, body) = child?;

            match &header.name.0 {
                b"mvhd" => mvhd = Some(read_body(&header, body)?),
                b"mvex" => mvex = Some(read_body(&header, body)?),
                b"trak" => tracks.push(read_body(&header, body)?),
                _ => {}
            }
        }
        *data = &[];

        Ok(MovieBox {
            mvhd: mvhd.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing mvhd"))?,
            mvex,
            tracks,
        })
    }
}
