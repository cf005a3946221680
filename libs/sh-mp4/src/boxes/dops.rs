use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_bytes, BoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

const OPUS_HEAD_MAGIC: &[u8; 8] = b"OpusHead";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMappingTable {
    pub stream_count: u8,
    pub coupled_count: u8,
    pub channel_mapping: Vec<u8>,
}

/// `dOps` box. The track extra data for Opus is the `OpusHead` packet,
/// which carries the same fields little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpusSpecificBox {
    pub version: u8,
    pub output_channel_count: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub channel_mapping_family: u8,
    pub channel_mapping_table: Option<ChannelMappingTable>,
}

impl OpusSpecificBox {
    pub fn from_opus_head(head: &[u8]) -> Result<Self, Mp4BoxError> {
        let mut data = head;

        let magic = read_bytes(&mut data, 8).map_err(|e| e.in_box(Self::NAME))?;
        if magic != OPUS_HEAD_MAGIC {
            return Err(Mp4BoxError::corrupt(Self::NAME, "extra data is not an OpusHead packet"));
        }

        Self::read_fields::<LittleEndian>(&mut data).map_err(|e| e.in_box(Self::NAME))
    }

    pub fn to_opus_head(&self) -> Result<Vec<u8>, Mp4BoxError> {
        let mut v = OPUS_HEAD_MAGIC.to_vec();
        self.write_fields::<LittleEndian>(&mut v)?;

        Ok(v)
    }

    fn read_fields<B: byteorder::ByteOrder>(data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let version = data.read_u8()?;
        let output_channel_count = data.read_u8()?;
        let pre_skip = data.read_u16::<B>()?;
        let input_sample_rate = data.read_u32::<B>()?;
        let output_gain = data.read_i16::<B>()?;
        let channel_mapping_family = data.read_u8()?;

        let channel_mapping_table = if channel_mapping_family != 0 {
            Some(ChannelMappingTable {
                stream_count: data.read_u8()?,
                coupled_count: data.read_u8()?,
                channel_mapping: read_bytes(data, output_channel_count as usize)?,
            })
        } else {
            None
        };

        Ok(OpusSpecificBox {
            version,
            output_channel_count,
            pre_skip,
            input_sample_rate,
            output_gain,
            channel_mapping_family,
            channel_mapping_table,
        })
    }

    fn write_fields<B: byteorder::ByteOrder>(&self, v: &mut Vec<u8>) -> Result<(), Mp4BoxError> {
        v.push(self.version);
        v.push(self.output_channel_count);
        v.write_u16::<B>(self.pre_skip)?;
        v.write_u32::<B>(self.input_sample_rate)?;
        v.write_i16::<B>(self.output_gain)?;
        v.push(self.channel_mapping_family);

        if let Some(table) = &self.channel_mapping_table {
            v.push(table.stream_count);
            v.push(table.coupled_count);
            v.extend(&table.channel_mapping);
        }

        Ok(())
    }
}

impl Mp4Box for OpusSpecificBox {
    const NAME: FourCC = FourCC(*b"dOps");

    fn content_size(&self) -> u64 {
        let mut size = size_of::<u8>() as u64 + // Version
            size_of::<u8>() as u64 + // OutputChannelCount
            size_of::<u16>() as u64 + // PreSkip
            size_of::<u32>() as u64 + // InputSampleRate
            size_of::<i16>() as u64 + // OutputGain
            size_of::<u8>() as u64; // ChannelMappingFamily

        if let Some(table) = &self.channel_mapping_table {
            size += 2 + table.channel_mapping.len() as u64;
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        self.write_fields::<BigEndian>(&mut v)?;

        writer.put_slice(&v);

        Ok(())
    }
}

impl Mp4BoxRead for OpusSpecificBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        Self::read_fields::<BigEndian>(data)
    }
}
