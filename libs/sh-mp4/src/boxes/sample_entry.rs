use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_body, read_bytes, skip_bytes, BoxHeader, BoxIter, Mp4Box, Mp4BoxError, Mp4BoxRead};

use super::{
    AvcConfigurationBox, EsDescriptorBox, HevcConfigurationBox, OpusSpecificBox,
    ProtectionSchemeInfoBox,
};

use std::mem::size_of;

/// The codec configuration box that follows the fixed sample entry fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecConfig {
    Avc(AvcConfigurationBox),
    Hevc(HevcConfigurationBox),
    Esds(EsDescriptorBox),
    Opus(OpusSpecificBox),
}

impl CodecConfig {
    pub fn size(&self) -> u64 {
        match self {
            CodecConfig::Avc(avcc) => avcc.size(),
            CodecConfig::Hevc(hvcc) => hvcc.size(),
            CodecConfig::Esds(esds) => esds.size(),
            CodecConfig::Opus(dops) => dops.size(),
        }
    }

    pub fn write(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        match self {
            CodecConfig::Avc(avcc) => avcc.write(writer),
            CodecConfig::Hevc(hvcc) => hvcc.write(writer),
            CodecConfig::Esds(esds) => esds.write(writer),
            CodecConfig::Opus(dops) => dops.write(writer),
        }
    }

    /// The opaque codec extra data this configuration carries.
    pub fn extra_data(&self) -> Result<Vec<u8>, Mp4BoxError> {
        match self {
            CodecConfig::Avc(avcc) => Ok(avcc.config.clone()),
            CodecConfig::Hevc(hvcc) => Ok(hvcc.config.clone()),
            CodecConfig::Esds(esds) => Ok(esds.decoder_specific_info.clone()),
            CodecConfig::Opus(dops) => dops.to_opus_head(),
        }
    }

    fn read_child(header: &BoxHeader, body: &[u8]) -> Result<Option<Self>, Mp4BoxError> {
        let config = match &header.name.0 {
            b"avcC" => CodecConfig::Avc(read_body(header, body)?),
            b"hvcC" => CodecConfig::Hevc(read_body(header, body)?),
            b"esds" => CodecConfig::Esds(read_body(header, body)?),
            b"dOps" => CodecConfig::Opus(read_body(header, body)?),
            _ => return Ok(None),
        };

        Ok(Some(config))
    }
}

/// Reads the boxes trailing a sample entry. `btrt`, `pasp` and anything
/// else unknown is skipped.
fn read_entry_children(
    data: &[u8],
) -> Result<(Option<CodecConfig>, Option<ProtectionSchemeInfoBox>), Mp4BoxError> {
    let mut config = None;
    let mut sinf = None;

    for child in BoxIter::new(data) {
        let (header, body) = child?;

        if header.name == ProtectionSchemeInfoBox::NAME {
            sinf = Some(read_body(&header, body)?);
        } else if config.is_none() {
            config = CodecConfig::read_child(&header, body)?;
        }
    }

    Ok((config, sinf))
}

fn children_size(config: &Option<CodecConfig>, sinf: &Option<ProtectionSchemeInfoBox>) -> u64 {
    config.as_ref().map(|c| c.size()).unwrap_or(0) + sinf.as_ref().map(|s| s.size()).unwrap_or(0)
}

fn write_children(
    writer: &mut BytesMut,
    config: &Option<CodecConfig>,
    sinf: &Option<ProtectionSchemeInfoBox>,
) -> Result<(), Mp4BoxError> {
    if let Some(config) = config {
        config.write(writer)?;
    }

    if let Some(sinf) = sinf {
        sinf.write(writer)?;
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualSampleEntry {
    pub format: FourCC,
    pub data_reference_index: u16,
    pub width: u16,
    pub height: u16,
    pub config: Option<CodecConfig>,
    pub sinf: Option<ProtectionSchemeInfoBox>,
}

impl Mp4Box for VisualSampleEntry {
    const NAME: FourCC = FourCC(*b"avc1");

    fn box_type(&self) -> FourCC {
        self.format
    }

    fn content_size(&self) -> u64 {
        size_of::<u8>() as u64 * 6 // reserved
            + size_of::<u16>() as u64 // data_reference_index
            + size_of::<u8>() as u64 * 16 // pre_defined, reserved
            + size_of::<u16>() as u64 // width
            + size_of::<u16>() as u64 // height
            + size_of::<u32>() as u64 // horizresolution
            + size_of::<u32>() as u64 // vertresolution
            + size_of::<u8>() as u64 * 4 // reserved
            + size_of::<u16>() as u64 // frame_count
            + size_of::<u8>() as u64 * 32 // compressorname
            + size_of::<u16>() as u64 // depth
            + size_of::<i16>() as u64 // pre_defined
            + children_size(&self.config, &self.sinf)
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        v.extend(&[0u8; 6]);
        v.write_u16::<BigEndian>(self.data_reference_index)?;

        v.extend(&[0u8; 16]);

        v.write_u16::<BigEndian>(self.width)?;
        v.write_u16::<BigEndian>(self.height)?;
        v.write_u32::<BigEndian>(0x0048_0000)?;
        v.write_u32::<BigEndian>(0x0048_0000)?;
        v.extend(&[0u8; 4]);
        v.write_u16::<BigEndian>(1)?;
        v.extend(&[0u8; 32]);
        v.write_u16::<BigEndian>(0x0018)?;
        v.write_i16::<BigEndian>(-1)?;

        writer.put_slice(&v);

        write_children(writer, &self.config, &self.sinf)
    }
}

impl Mp4BoxRead for VisualSampleEntry {
    fn read_box_contents(header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        skip_bytes(data, 6)?;
        let data_reference_index = data.read_u16::<BigEndian>()?;

        skip_bytes(data, 16)?;
        let width = data.read_u16::<BigEndian>()?;
        let height = data.read_u16::<BigEndian>()?;

        // resolution, frame count, compressor name, depth and pre_defined
        skip_bytes(data, 50)?;

        let (config, sinf) = read_entry_children(data)?;
        *data = &[];

        Ok(VisualSampleEntry {
            format: header.name,
            data_reference_index,
            width,
            height,
            config,
            sinf,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSampleEntry {
    pub format: FourCC,
    pub data_reference_index: u16,
    /// QuickTime sound description version. Versions 1 and 2 carry extra
    /// fields that are kept verbatim in `quicktime_extension`.
    pub version: u16,
    pub channel_count: u16,
    pub sample_size: u16,
    /// Integer part of the 16.16 sample rate.
    pub sample_rate: u32,
    pub quicktime_extension: Vec<u8>,
    pub config: Option<CodecConfig>,
    pub sinf: Option<ProtectionSchemeInfoBox>,
}

impl AudioSampleEntry {
    fn quicktime_extension_size(version: u16) -> usize {
        match version {
            1 => 16,
            2 => 36,
            _ => 0,
        }
    }
}

impl Mp4Box for AudioSampleEntry {
    const NAME: FourCC = FourCC(*b"mp4a");

    fn box_type(&self) -> FourCC {
        self.format
    }

    fn content_size(&self) -> u64 {
        size_of::<u8>() as u64 * 6 // reserved
            + size_of::<u16>() as u64 // data_reference_index
            + size_of::<u16>() as u64 // version
            + size_of::<u8>() as u64 * 6 // revision, vendor
            + size_of::<u16>() as u64 // channelcount
            + size_of::<u16>() as u64 // samplesize
            + size_of::<u16>() as u64 // pre_defined
            + size_of::<u16>() as u64 // reserved
            + size_of::<u32>() as u64 // samplerate
            + self.quicktime_extension.len() as u64
            + children_size(&self.config, &self.sinf)
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        v.extend(&[0u8; 6]);
        v.write_u16::<BigEndian>(self.data_reference_index)?;

        v.write_u16::<BigEndian>(self.version)?;
        v.extend(&[0u8; 6]);
        v.write_u16::<BigEndian>(self.channel_count)?;
        v.write_u16::<BigEndian>(self.sample_size)?;
        v.extend(&[0u8; 4]);
        // 16.16 fixed point; higher rates are only carried by the codec config
        let sample_rate = self.sample_rate.min(u16::MAX as u32);
        v.write_u32::<BigEndian>(sample_rate << 16)?;
        v.extend(&self.quicktime_extension);

        writer.put_slice(&v);

        write_children(writer, &self.config, &self.sinf)
    }
}

impl Mp4BoxRead for AudioSampleEntry {
    fn read_box_contents(header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        skip_bytes(data, 6)?;
        let data_reference_index = data.read_u16::<BigEndian>()?;

        let version = data.read_u16::<BigEndian>()?;
        skip_bytes(data, 6)?;
        let channel_count = data.read_u16::<BigEndian>()?;
        let sample_size = data.read_u16::<BigEndian>()?;
        skip_bytes(data, 4)?;
        let sample_rate = data.read_u32::<BigEndian>()? >> 16;

        let quicktime_extension = read_bytes(data, Self::quicktime_extension_size(version))?;

        let (config, sinf) = read_entry_children(data)?;
        *data = &[];

        Ok(AudioSampleEntry {
            format: header.name,
            data_reference_index,
            version,
            channel_count,
            sample_size,
            sample_rate,
            quicktime_extension,
            config,
            sinf,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CodecId, OriginalFormatBox, TrackEncryptionBox};

    #[test]
    fn visual_entry_with_config() {
        let entry = VisualSampleEntry {
            format: FourCC(*b"hvc1"),
            data_reference_index: 1,
            width: 1920,
            height: 1080,
            config: Some(CodecConfig::Hevc(HevcConfigurationBox {
                config: vec![1, 2, 3],
            })),
            sinf: None,
        };

        let bytes = entry.to_bytes().unwrap();
        assert_eq!(&bytes[4..8], b"hvc1");
        assert_eq!(bytes.len(), 8 + 78 + 11);
        assert_eq!(VisualSampleEntry::read(&bytes).unwrap(), entry);
    }

    #[test]
    fn protected_audio_entry() {
        let entry = AudioSampleEntry {
            format: FourCC(*b"enca"),
            data_reference_index: 1,
            version: 0,
            channel_count: 2,
            sample_size: 16,
            sample_rate: 48000,
            quicktime_extension: Vec::new(),
            config: Some(CodecConfig::Esds(
                EsDescriptorBox::new(1, CodecId::Aac, vec![0x11, 0x90]).unwrap(),
            )),
            sinf: Some(ProtectionSchemeInfoBox {
                frma: OriginalFormatBox {
                    data_format: FourCC(*b"mp4a"),
                },
                schm: None,
                tenc: Some(TrackEncryptionBox {
                    default_is_protected: true,
                    default_per_sample_iv_size: 8,
                    default_kid: [3; 16],
                    ..Default::default()
                }),
            }),
        };

        let bytes = entry.to_bytes().unwrap();
        assert_eq!(AudioSampleEntry::read(&bytes).unwrap(), entry);
    }

    #[test]
    fn high_sample_rates_saturate() {
        let entry = AudioSampleEntry {
            format: FourCC(*b"Opus"),
            data_reference_index: 1,
            version: 0,
            channel_count: 2,
            sample_size: 16,
            sample_rate: 96000,
            quicktime_extension: Vec::new(),
            config: None,
            sinf: None,
        };

        let bytes = entry.to_bytes().unwrap();
        assert_eq!(AudioSampleEntry::read(&bytes).unwrap().sample_rate, 65535);
    }

    #[test]
    fn quicktime_sound_v1_extension_is_kept() {
        let entry = AudioSampleEntry {
            format: FourCC(*b"mp4a"),
            data_reference_index: 1,
            version: 1,
            channel_count: 2,
            sample_size: 16,
            sample_rate: 44100,
            quicktime_extension: vec![0; 16],
            config: Some(CodecConfig::Esds(
                EsDescriptorBox::new(1, CodecId::Aac, vec![0x12, 0x10]).unwrap(),
            )),
            sinf: None,
        };

        let bytes = entry.to_bytes().unwrap();
        let decoded = AudioSampleEntry::read(&bytes).unwrap();

        assert_eq!(decoded.quicktime_extension.len(), 16);
        assert_eq!(decoded.config, entry.config);
    }
}
