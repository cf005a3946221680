use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_bytes, skip_bytes, BoxHeader, CodecId, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_DESCRIPTOR_TAG: u8 = 0x04;
const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;
const SL_CONFIG_DESCRIPTOR_TAG: u8 = 0x06;

/// Tag byte plus a size that is always written with 4 bytes.
const DESCRIPTOR_HEADER_SIZE: u64 = 5;

const DEFAULT_BITRATE: u32 = 88360;

/// Elementary stream descriptor box. Only the fields needed to identify
/// the codec and carry its decoder specific info are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsDescriptorBox {
    pub es_id: u16,
    pub object_type_indication: u8,
    pub stream_type: u8,
    pub buffer_size_db: u32,
    pub max_bitrate: u32,
    pub avg_bitrate: u32,
    pub decoder_specific_info: Vec<u8>,
}

impl EsDescriptorBox {
    pub fn new(es_id: u16, codec: CodecId, decoder_specific_info: Vec<u8>) -> Result<Self, Mp4BoxError> {
        let object_type_indication = codec
            .object_type_indication()
            .ok_or(Mp4BoxError::UnsupportedCodec(codec))?;

        Ok(EsDescriptorBox {
            es_id,
            object_type_indication,
            stream_type: codec.esds_stream_type(),
            buffer_size_db: 0,
            max_bitrate: DEFAULT_BITRATE,
            avg_bitrate: DEFAULT_BITRATE,
            decoder_specific_info,
        })
    }

    pub fn codec(&self) -> Option<CodecId> {
        CodecId::from_object_type_indication(self.object_type_indication)
    }

    fn decoder_specific_info_size(&self) -> u64 {
        if self.decoder_specific_info.is_empty() {
            0
        } else {
            DESCRIPTOR_HEADER_SIZE + self.decoder_specific_info.len() as u64
        }
    }

    fn decoder_config_size(&self) -> u64 {
        13 + self.decoder_specific_info_size()
    }

    fn es_descriptor_size(&self) -> u64 {
        3 + DESCRIPTOR_HEADER_SIZE
            + self.decoder_config_size()
            + DESCRIPTOR_HEADER_SIZE
            + 1 // SLConfigDescriptor
    }
}

/// Writes a descriptor tag and its expandable size in the fixed 4 byte
/// form.
fn write_descriptor_header(v: &mut Vec<u8>, tag: u8, size: u64) {
    let size = size as u32;

    v.push(tag);
    v.push(0x80 | ((size >> 21) & 0x7f) as u8);
    v.push(0x80 | ((size >> 14) & 0x7f) as u8);
    v.push(0x80 | ((size >> 7) & 0x7f) as u8);
    v.push((size & 0x7f) as u8);
}

/// Reads a descriptor tag and its expandable size: 7 bits per byte for as
/// long as the top bit is set.
fn read_descriptor_header(data: &mut &[u8]) -> Result<(u8, u32), Mp4BoxError> {
    let tag = data.read_u8()?;

    let mut size = 0u32;
    for _ in 0..4 {
        let b = data.read_u8()?;
        size = size << 7 | (b & 0x7f) as u32;

        if b & 0x80 == 0 {
            return Ok((tag, size));
        }
    }

    Err(Mp4BoxError::corrupt(
        EsDescriptorBox::NAME,
        format!("descriptor 0x{:02x} size runs past 4 bytes", tag),
    ))
}

impl Mp4Box for EsDescriptorBox {
    const NAME: FourCC = FourCC(*b"esds");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        DESCRIPTOR_HEADER_SIZE + self.es_descriptor_size()
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        write_descriptor_header(&mut v, ES_DESCRIPTOR_TAG, self.es_descriptor_size());
        v.write_u16::<BigEndian>(self.es_id)?;
        v.push(0); // no dependency, url or OCR stream

        write_descriptor_header(&mut v, DECODER_CONFIG_DESCRIPTOR_TAG, self.decoder_config_size());
        v.push(self.object_type_indication);
        v.push(self.stream_type);
        v.write_u24::<BigEndian>(self.buffer_size_db)?;
        v.write_u32::<BigEndian>(self.max_bitrate)?;
        v.write_u32::<BigEndian>(self.avg_bitrate)?;

        if !self.decoder_specific_info.is_empty() {
            write_descriptor_header(
                &mut v,
                DECODER_SPECIFIC_INFO_TAG,
                self.decoder_specific_info.len() as u64,
            );
            v.extend(&self.decoder_specific_info);
        }

        write_descriptor_header(&mut v, SL_CONFIG_DESCRIPTOR_TAG, 1);
        v.push(0x02);

        debug_assert_eq!(v.len() as u64, self.content_size());

        writer.put_slice(&v);

        Ok(())
    }
}

impl Mp4BoxRead for EsDescriptorBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;

        let mut esds = EsDescriptorBox {
            es_id: 0,
            object_type_indication: 0,
            stream_type: 0,
            buffer_size_db: 0,
            max_bitrate: 0,
            avg_bitrate: 0,
            decoder_specific_info: Vec::new(),
        };

        // nested descriptors are read in place, the enclosing ones only
        // contribute their fixed fields
        while !data.is_empty() {
            let (tag, size) = read_descriptor_header(data)?;

            match tag {
                ES_DESCRIPTOR_TAG => {
                    esds.es_id = data.read_u16::<BigEndian>()?;
                    let flags = data.read_u8()?;

                    if flags & 0x80 != 0 {
                        skip_bytes(data, 2)?; // dependsOn_ES_ID
                    }

                    if flags & 0x40 != 0 {
                        let url_length = data.read_u8()?;
                        skip_bytes(data, url_length as usize)?;
                    }

                    if flags & 0x20 != 0 {
                        skip_bytes(data, 2)?; // OCR_ES_Id
                    }
                }
                DECODER_CONFIG_DESCRIPTOR_TAG => {
                    esds.object_type_indication = data.read_u8()?;
                    esds.stream_type = data.read_u8()?;
                    esds.buffer_size_db = data.read_u24::<BigEndian>()?;
                    esds.max_bitrate = data.read_u32::<BigEndian>()?;
                    esds.avg_bitrate = data.read_u32::<BigEndian>()?;
                }
                DECODER_SPECIFIC_INFO_TAG => {
                    esds.decoder_specific_info = read_bytes(data, size as usize)?;
                }
                _ => skip_bytes(data, size as usize)?,
            }
        }

        Ok(esds)
    }
}
