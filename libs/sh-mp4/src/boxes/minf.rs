use four_cc::FourCC;

use bytes::BytesMut;

use crate::{read_body, BoxHeader, BoxIter, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::{DataInformationBox, SampleTableBox, SoundMediaHeaderBox, VideoMediaHeaderBox};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaHeader {
    Video(VideoMediaHeaderBox),
    Sound(SoundMediaHeaderBox),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInformationBox {
    /// `None` for media types other than video and sound.
    pub media_header: Option<MediaHeader>,
    pub dinf: DataInformationBox,
    pub stbl: SampleTableBox,
}

impl Mp4Box for MediaInformationBox {
    const NAME: FourCC = FourCC(*b"minf");

    fn content_size(&self) -> u64 {
        let mut size = self.dinf.size() + self.stbl.size();

        match &self.media_header {
            Some(MediaHeader::Video(vmhd)) => size += vmhd.size(),
            Some(MediaHeader::Sound(smhd)) => size += smhd.size(),
            None => {}
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        match &self.media_header {
            Some(MediaHeader::Video(vmhd)) => vmhd.write(writer)?,
            Some(MediaHeader::Sound(smhd)) => smhd.write(writer)?,
            None => {}
        }

        self.dinf.write(writer)?;
        self.stbl.write(writer)?;

        Ok(())
    }
}

impl Mp4BoxRead for MediaInformationBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let mut media_header = None;
        let mut dinf = None;
        let mut stbl = None;

        for child in BoxIter::new(*data) {
            let (header, body) = child?;

            match &header.name.0 {
                b"vmhd" => media_header = Some(MediaHeader::Video(read_body(&header, body)?)),
                b"smhd" => media_header = Some(MediaHeader::Sound(read_body(&header, body)?)),
                b"dinf" => dinf = Some(read_body(&header, body)?),
                b"stbl" => stbl = Some(read_body(&header, body)?),
                _ => {}
            }
        }
        *data = &[];

        Ok(MediaInformationBox {
            media_header,
            dinf: dinf.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing dinf"))?,
            stbl: stbl.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing stbl"))?,
        })
    }
}
