use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_bytes, BoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

/// `avcC` box. The body is the decoder configuration record, kept as the
/// opaque extra data blob of the track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfigurationBox {
    pub config: Vec<u8>,
}

impl Mp4Box for AvcConfigurationBox {
    const NAME: FourCC = FourCC(*b"avcC");

    fn content_size(&self) -> u64 {
        self.config.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        writer.put_slice(&self.config);

        Ok(())
    }
}

impl Mp4BoxRead for AvcConfigurationBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let config = data.to_vec();
        *data = &[];

        Ok(AvcConfigurationBox { config })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfigurationRecord {
    pub profile_indication: u8,
    pub profile_compatibility: u8,
    pub level_indication: u8,
    pub sequence_parameter_sets: Vec<Vec<u8>>,
    pub picture_parameter_sets: Vec<Vec<u8>>,
}

impl AvcDecoderConfigurationRecord {
    pub fn read(mut buf: &[u8]) -> Result<Self, Mp4BoxError> {
        Self::read_record(&mut buf).map_err(|e| e.in_box(AvcConfigurationBox::NAME))
    }

    fn read_record(buf: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let header = read_bytes(buf, 6)?;

        let _length_minus_one = header[4] & 0b0000_0011;
        let sps_count = header[5] & 0b0001_1111;

        let mut sequence_parameter_sets = Vec::new();
        let mut picture_parameter_sets = Vec::new();

        for _i in 0..sps_count {
            let sps_len = buf.read_u16::<BigEndian>()?;
            sequence_parameter_sets.push(read_bytes(buf, sps_len as usize)?);
        }

        let pps_count = buf.read_u8()?;

        for _i in 0..pps_count {
            let pps_len = buf.read_u16::<BigEndian>()?;
            picture_parameter_sets.push(read_bytes(buf, pps_len as usize)?);
        }

        Ok(AvcDecoderConfigurationRecord {
            profile_indication: header[1],
            profile_compatibility: header[2],
            level_indication: header[3],
            sequence_parameter_sets,
            picture_parameter_sets,
        })
    }

    pub fn size(&self) -> u64 {
        let parameter_sets = self
            .sequence_parameter_sets
            .iter()
            .chain(&self.picture_parameter_sets)
            .map(|ps| size_of::<u16>() as u64 + ps.len() as u64)
            .sum::<u64>();

        size_of::<u8>() as u64 // configurationVersion
            + size_of::<u8>() as u64 // AVCProfileIndication
            + size_of::<u8>() as u64 // profile_compatibility
            + size_of::<u8>() as u64 // AVCLevelIndication
            + size_of::<u8>() as u64 // lengthSizeMinusOne
            + size_of::<u8>() as u64 // numOfSequenceParameterSets
            + size_of::<u8>() as u64 // numOfPictureParameterSets
            + parameter_sets
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, Mp4BoxError> {
        let mut v = Vec::new();

        v.push(1);
        v.push(self.profile_indication);
        v.push(self.profile_compatibility);
        v.push(self.level_indication);
        v.push(0b1111_1100 | 3);

        v.push(0b1110_0000 | self.sequence_parameter_sets.len() as u8);
        for sps in &self.sequence_parameter_sets {
            v.write_u16::<BigEndian>(sps.len() as u16)?;
            v.extend(sps);
        }

        v.push(self.picture_parameter_sets.len() as u8);
        for pps in &self.picture_parameter_sets {
            v.write_u16::<BigEndian>(pps.len() as u16)?;
            v.extend(pps);
        }

        assert_eq!(self.size(), v.len() as u64);

        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_survives_the_box() {
        let record = AvcDecoderConfigurationRecord {
            profile_indication: 0x64,
            profile_compatibility: 0,
            level_indication: 0x1f,
            sequence_parameter_sets: vec![vec![0x67, 0x64, 0x00, 0x1f]],
            picture_parameter_sets: vec![vec![0x68, 0xee, 0x3c, 0x80]],
        };

        let avcc = AvcConfigurationBox {
            config: record.to_vec().unwrap(),
        };
        let bytes = avcc.to_bytes().unwrap();
        let decoded = AvcConfigurationBox::read(&bytes).unwrap();

        assert_eq!(decoded, avcc);
        assert_eq!(AvcDecoderConfigurationRecord::read(&decoded.config).unwrap(), record);
    }

    #[test]
    fn truncated_record_is_corrupt() {
        let err = AvcDecoderConfigurationRecord::read(&[1, 0x64, 0, 0x1f, 0xff, 0xe1, 0, 9, 0x67])
            .unwrap_err();

        assert!(err.is_corrupt());
    }
}
