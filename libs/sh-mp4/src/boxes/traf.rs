use four_cc::FourCC;

use bytes::BytesMut;

use crate::{read_body, BoxHeader, BoxIter, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::{TrackFragmentBaseMediaDecodeTimeBox, TrackFragmentHeaderBox, TrackFragmentRunBox};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFragmentBox {
    pub tfhd: TrackFragmentHeaderBox,
    pub track_runs: Vec<TrackFragmentRunBox>,
    pub base_media_decode_time: Option<TrackFragmentBaseMediaDecodeTimeBox>,
}

impl Mp4Box for TrackFragmentBox {
    const NAME: FourCC = FourCC(*b"traf");

    fn content_size(&self) -> u64 {
        let mut size = self.tfhd.size();

        for trun in &self.track_runs {
            size += trun.size();
        }

        if let Some(base_media_decode_time) = &self.base_media_decode_time {
            size += base_media_decode_time.size();
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        self.tfhd.write(writer)?;

        if let Some(base_media_decode_time) = &self.base_media_decode_time {
            base_media_decode_time.write(writer)?;
        }

        for run in &self.track_runs {
            run.write(writer)?;
        }

        Ok(())
    }
}

impl Mp4BoxRead for TrackFragmentBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let mut tfhd = None;
        let mut track_runs = Vec::new();
        let mut base_media_decode_time = None;

        for child in BoxIter::new(*data) {
            let (header, body) = child?;

            match &header.name.0 {
                b"tfhd" => tfhd = Some(read_body(&header, body)?),
                b"tfdt" => base_media_decode_time = Some(read_body(&header, body)?),
                b"trun" => track_runs.push(read_body(&header, body)?),
                _ => {}
            }
        }
        *data = &[];

        Ok(TrackFragmentBox {
            tfhd: tfhd.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing tfhd"))?,
            track_runs,
            base_media_decode_time,
        })
    }
}
