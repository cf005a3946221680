use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::mem::size_of;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct SegmentReference {
    /// Set when the reference points at another `sidx` instead of media.
    pub reference_type: bool,
    pub referenced_size: u32,
    pub subsegment_duration: u32,
    pub starts_with_sap: bool,
    pub sap_type: u8,
    pub sap_delta_time: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentIndexBox {
    pub reference_id: u32,
    pub timescale: u32,
    pub earliest_presentation_time: u64,
    /// Distance from the end of this box to the first referenced byte.
    pub first_offset: u64,
    pub references: Vec<SegmentReference>,
}

impl Mp4Box for SegmentIndexBox {
    const NAME: FourCC = FourCC(*b"sidx");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(1, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64 + // reference_ID
            size_of::<u32>() as u64 + // timescale
            size_of::<u64>() as u64 + // earliest_presentation_time
            size_of::<u64>() as u64 + // first_offset
            size_of::<u16>() as u64 + // reserved
            size_of::<u16>() as u64 + // reference_count
            12 * self.references.len() as u64
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let reference_count = u16::try_from(self.references.len())
            .map_err(|_| Mp4BoxError::corrupt(Self::NAME, "too many references"))?;

        let mut v = Vec::with_capacity(self.content_size() as usize);

        v.write_u32::<BigEndian>(self.reference_id)?;
        v.write_u32::<BigEndian>(self.timescale)?;
        v.write_u64::<BigEndian>(self.earliest_presentation_time)?;
        v.write_u64::<BigEndian>(self.first_offset)?;
        v.write_u16::<BigEndian>(0)?;
        v.write_u16::<BigEndian>(reference_count)?;

        for reference in &self.references {
            v.write_u32::<BigEndian>(
                (reference.reference_type as u32) << 31 | (reference.referenced_size & 0x7fff_ffff),
            )?;
            v.write_u32::<BigEndian>(reference.subsegment_duration)?;
            v.write_u32::<BigEndian>(
                (reference.starts_with_sap as u32) << 31
                    | ((reference.sap_type & 0x07) as u32) << 28
                    | (reference.sap_delta_time & 0x0fff_ffff),
            )?;
        }

        writer.put_slice(&v);

        Ok(())
    }
}

impl Mp4BoxRead for SegmentIndexBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;

        let reference_id = data.read_u32::<BigEndian>()?;
        let timescale = data.read_u32::<BigEndian>()?;

        let (earliest_presentation_time, first_offset) = if full_box_header.version == 0 {
            (
                data.read_u32::<BigEndian>()? as u64,
                data.read_u32::<BigEndian>()? as u64,
            )
        } else {
            (data.read_u64::<BigEndian>()?, data.read_u64::<BigEndian>()?)
        };

        let _reserved = data.read_u16::<BigEndian>()?;
        let reference_count = data.read_u16::<BigEndian>()?;

        let mut references = Vec::with_capacity(reference_count as usize);
        for _ in 0..reference_count {
            let size = data.read_u32::<BigEndian>()?;
            let subsegment_duration = data.read_u32::<BigEndian>()?;
            let sap = data.read_u32::<BigEndian>()?;

            references.push(SegmentReference {
                reference_type: size >> 31 == 1,
                referenced_size: size & 0x7fff_ffff,
                subsegment_duration,
                starts_with_sap: sap >> 31 == 1,
                sap_type: ((sap >> 28) & 0x07) as u8,
                sap_delta_time: sap & 0x0fff_ffff,
            });
        }

        Ok(SegmentIndexBox {
            reference_id,
            timescale,
            earliest_presentation_time,
            first_offset,
            references,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_reference_layout() {
        let sidx = SegmentIndexBox {
            reference_id: 1,
            timescale: 90000,
            earliest_presentation_time: 3600,
            first_offset: 52,
            references: vec![SegmentReference {
                referenced_size: 4096,
                subsegment_duration: 180000,
                starts_with_sap: true,
                ..Default::default()
            }],
        };

        let bytes = sidx.to_bytes().unwrap();
        assert_eq!(bytes.len(), 52);
        assert_eq!(bytes[8], 1);
        assert_eq!(bytes[48], 0x80);
        assert_eq!(SegmentIndexBox::read(&bytes).unwrap(), sidx);
    }
}
