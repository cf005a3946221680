use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_body, BoxHeader, BoxIter, CodecId, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::{AudioSampleEntry, CodecConfig, VisualSampleEntry};

use std::mem::size_of;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleEntry {
    Visual(VisualSampleEntry),
    Audio(AudioSampleEntry),
    /// An entry of a type the catalog does not describe, body kept as is.
    Unknown { format: FourCC, data: Vec<u8> },
}

impl SampleEntry {
    pub fn size(&self) -> u64 {
        match self {
            SampleEntry::Visual(visual) => visual.size(),
            SampleEntry::Audio(audio) => audio.size(),
            SampleEntry::Unknown { format, data } => BoxHeader::new(*format, data.len() as u64).size,
        }
    }

    pub fn write(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        match self {
            SampleEntry::Visual(visual) => visual.write(writer),
            SampleEntry::Audio(audio) => audio.write(writer),
            SampleEntry::Unknown { format, data } => {
                BoxHeader::new(*format, data.len() as u64).write(writer);
                writer.put_slice(data);

                Ok(())
            }
        }
    }

    pub fn format(&self) -> FourCC {
        match self {
            SampleEntry::Visual(visual) => visual.format,
            SampleEntry::Audio(audio) => audio.format,
            SampleEntry::Unknown { format, .. } => *format,
        }
    }

    pub fn config(&self) -> Option<&CodecConfig> {
        match self {
            SampleEntry::Visual(visual) => visual.config.as_ref(),
            SampleEntry::Audio(audio) => audio.config.as_ref(),
            SampleEntry::Unknown { .. } => None,
        }
    }

    /// The entry type before protection was applied.
    pub fn original_format(&self) -> FourCC {
        let sinf = match self {
            SampleEntry::Visual(visual) => visual.sinf.as_ref(),
            SampleEntry::Audio(audio) => audio.sinf.as_ref(),
            SampleEntry::Unknown { .. } => None,
        };

        sinf.map(|sinf| sinf.frma.data_format)
            .unwrap_or_else(|| self.format())
    }

    /// Resolves the codec, looking into `esds` for MPEG-4 audio entries.
    pub fn codec(&self) -> CodecId {
        match (CodecId::from_sample_entry_type(self.original_format()), self.config()) {
            (CodecId::Aac, Some(CodecConfig::Esds(esds))) => esds.codec().unwrap_or(CodecId::Aac),
            (codec, _) => codec,
        }
    }

    fn read(header: &BoxHeader, body: &[u8]) -> Result<Self, Mp4BoxError> {
        let entry = match &header.name.0 {
            b"avc1" | b"avc3" | b"hvc1" | b"hev1" | b"mp4v" | b"encv" => {
                SampleEntry::Visual(read_body(header, body)?)
            }
            b"mp4a" | b"alaw" | b"ulaw" | b"Opus" | b"opus" | b".mp3" | b"enca" => {
                SampleEntry::Audio(read_body(header, body)?)
            }
            _ => SampleEntry::Unknown {
                format: header.name,
                data: body.to_vec(),
            },
        };

        Ok(entry)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleDescriptionBox {
    pub entries: Vec<SampleEntry>,
}

impl Mp4Box for SampleDescriptionBox {
    const NAME: FourCC = FourCC(*b"stsd");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        let mut size = size_of::<u32>() as u64;

        for entry in &self.entries {
            size += entry.size();
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut contents = [0u8; 4];
        BigEndian::write_u32(&mut contents, self.entries.len() as _);

        writer.put_slice(&contents);

        for entry in &self.entries {
            entry.write(writer)?;
        }

        Ok(())
    }
}

impl Mp4BoxRead for SampleDescriptionBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;
        let entry_count = data.read_u32::<BigEndian>()?;

        let mut entries = Vec::new();
        for child in BoxIter::new(*data).take(entry_count as usize) {
            let (header, body) = child?;
            entries.push(SampleEntry::read(&header, body)?);
        }
        *data = &[];

        Ok(SampleDescriptionBox { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EsDescriptorBox;

    #[test]
    fn mp4a_resolves_through_object_type() {
        let stsd = SampleDescriptionBox {
            entries: vec![SampleEntry::Audio(AudioSampleEntry {
                format: FourCC(*b"mp4a"),
                data_reference_index: 1,
                version: 0,
                channel_count: 2,
                sample_size: 16,
                sample_rate: 44100,
                quicktime_extension: Vec::new(),
                config: Some(CodecConfig::Esds(
                    EsDescriptorBox::new(1, CodecId::Mp3, Vec::new()).unwrap(),
                )),
                sinf: None,
            })],
        };

        let bytes = stsd.to_bytes().unwrap();
        let decoded = SampleDescriptionBox::read(&bytes).unwrap();

        assert_eq!(decoded, stsd);
        assert_eq!(decoded.entries[0].codec(), CodecId::Mp3);
    }

    #[test]
    fn unknown_entries_are_kept() {
        let stsd = SampleDescriptionBox {
            entries: vec![SampleEntry::Unknown {
                format: FourCC(*b"vp09"),
                data: vec![0; 10],
            }],
        };

        let bytes = stsd.to_bytes().unwrap();
        let decoded = SampleDescriptionBox::read(&bytes).unwrap();

        assert_eq!(decoded, stsd);
        assert_eq!(decoded.entries[0].codec(), CodecId::Unknown(FourCC(*b"vp09")));
    }
}
