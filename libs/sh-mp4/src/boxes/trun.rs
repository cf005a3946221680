use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use std::mem::size_of;

use crate::{BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

bitflags::bitflags! {
    pub struct TrackFragmentRunFlags: u32 {
        const DATA_OFFSET_PRESENT = 0x00000001;
        const FIRST_SAMPLE_FLAGS_PRESENT = 0x00000004;
        const SAMPLE_DURATION_PRESENT = 0x00000100;
        const SAMPLE_SIZE_PRESENT = 0x00000200;
        const SAMPLE_FLAGS_PRESENT = 0x00000400;
        const SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT = 0x00000800;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackFragmentSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub composition_time_offset: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackFragmentRunBox {
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub samples: Vec<TrackFragmentSample>,
}

impl TrackFragmentRunBox {
    fn sample_size(&self, flags: TrackFragmentRunFlags) -> u64 {
        let mut sample_size = 0;

        if flags.contains(TrackFragmentRunFlags::SAMPLE_DURATION_PRESENT) {
            sample_size += 4; // sample_duration
        }

        if flags.contains(TrackFragmentRunFlags::SAMPLE_SIZE_PRESENT) {
            sample_size += 4; // sample_size
        }

        if flags.contains(TrackFragmentRunFlags::SAMPLE_FLAGS_PRESENT) {
            sample_size += 4; // sample_flags
        }

        if flags.contains(TrackFragmentRunFlags::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT) {
            sample_size += 4; // sample_composition_time_offset
        }

        sample_size
    }

    fn flags_from_fields(&self) -> TrackFragmentRunFlags {
        let mut flags = TrackFragmentRunFlags::empty();

        if self.data_offset.is_some() {
            flags.insert(TrackFragmentRunFlags::DATA_OFFSET_PRESENT);
        }

        if self.first_sample_flags.is_some() {
            flags.insert(TrackFragmentRunFlags::FIRST_SAMPLE_FLAGS_PRESENT);
        }

        if let Some(sample) = self.samples.get(0) {
            if sample.duration.is_some() {
                flags.insert(TrackFragmentRunFlags::SAMPLE_DURATION_PRESENT);
            }

            if sample.size.is_some() {
                flags.insert(TrackFragmentRunFlags::SAMPLE_SIZE_PRESENT);
            }

            if sample.flags.is_some() {
                flags.insert(TrackFragmentRunFlags::SAMPLE_FLAGS_PRESENT);
            }

            if sample.composition_time_offset.is_some() {
                flags.insert(TrackFragmentRunFlags::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT);
            }
        }

        flags
    }

    /// Version 1 makes composition offsets signed.
    fn version(&self) -> u8 {
        let negative = self
            .samples
            .iter()
            .any(|s| s.composition_time_offset.unwrap_or(0) < 0);

        if negative {
            1
        } else {
            0
        }
    }
}

impl Mp4Box for TrackFragmentRunBox {
    const NAME: FourCC = FourCC(*b"trun");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(self.version(), self.flags_from_fields().bits()))
    }

    fn content_size(&self) -> u64 {
        let flags = self.flags_from_fields();

        let mut size = 0;

        size += size_of::<u32>() as u64; // sample_count

        if flags.contains(TrackFragmentRunFlags::DATA_OFFSET_PRESENT) {
            size += size_of::<i32>() as u64; // data_offset
        }

        if flags.contains(TrackFragmentRunFlags::FIRST_SAMPLE_FLAGS_PRESENT) {
            size += size_of::<u32>() as u64; // first_sample_flags
        }

        size += self.sample_size(flags) * self.samples.len() as u64;

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        let sample_count = u32::try_from(self.samples.len())
            .map_err(|_| Mp4BoxError::corrupt(Self::NAME, "too many samples in one run"))?;
        v.write_u32::<BigEndian>(sample_count)?;

        if let Some(data_offset) = self.data_offset {
            v.write_i32::<BigEndian>(data_offset)?;
        }

        if let Some(first_sample_flags) = self.first_sample_flags {
            v.write_u32::<BigEndian>(first_sample_flags)?;
        }

        let flags = self.flags_from_fields();
        for sample in &self.samples {
            ensure_sample_fields_present(sample, flags)?;

            if let Some(duration) = sample.duration {
                v.write_u32::<BigEndian>(duration)?;
            }

            if let Some(size) = sample.size {
                v.write_u32::<BigEndian>(size)?;
            }

            if let Some(flags) = sample.flags {
                v.write_u32::<BigEndian>(flags)?;
            }

            if let Some(composition_time_offset) = sample.composition_time_offset {
                v.write_i32::<BigEndian>(composition_time_offset)?;
            }
        }

        debug_assert_eq!(v.len() as u64, self.content_size());

        writer.put_slice(&v);

        Ok(())
    }
}

impl Mp4BoxRead for TrackFragmentRunBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let full_box_header = FullBoxHeader::read(data)?;
        let flags = TrackFragmentRunFlags::from_bits_truncate(full_box_header.flags);

        let sample_count = data.read_u32::<BigEndian>()?;

        let data_offset = if flags.contains(TrackFragmentRunFlags::DATA_OFFSET_PRESENT) {
            Some(data.read_i32::<BigEndian>()?)
        } else {
            None
        };

        let first_sample_flags = if flags.contains(TrackFragmentRunFlags::FIRST_SAMPLE_FLAGS_PRESENT) {
            Some(data.read_u32::<BigEndian>()?)
        } else {
            None
        };

        let mut run = TrackFragmentRunBox {
            data_offset,
            first_sample_flags,
            samples: Vec::new(),
        };

        let sample_size = run.sample_size(flags);
        if sample_size * sample_count as u64 > data.len() as u64 {
            return Err(Mp4BoxError::corrupt(
                Self::NAME,
                format!("{} samples do not fit in {} bytes", sample_count, data.len()),
            ));
        }

        run.samples.reserve(sample_count as usize);
        for _ in 0..sample_count {
            let mut sample = TrackFragmentSample::default();

            if flags.contains(TrackFragmentRunFlags::SAMPLE_DURATION_PRESENT) {
                sample.duration = Some(data.read_u32::<BigEndian>()?);
            }

            if flags.contains(TrackFragmentRunFlags::SAMPLE_SIZE_PRESENT) {
                sample.size = Some(data.read_u32::<BigEndian>()?);
            }

            if flags.contains(TrackFragmentRunFlags::SAMPLE_FLAGS_PRESENT) {
                sample.flags = Some(data.read_u32::<BigEndian>()?);
            }

            // version 0 offsets are unsigned, but only ever small enough
            // to be read the same way
            if flags.contains(TrackFragmentRunFlags::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT) {
                sample.composition_time_offset = Some(data.read_i32::<BigEndian>()?);
            }

            run.samples.push(sample);
        }

        Ok(run)
    }
}

fn ensure_sample_fields_present(
    sample: &TrackFragmentSample,
    flags: TrackFragmentRunFlags,
) -> Result<(), Mp4BoxError> {
    let expected = [
        flags.contains(TrackFragmentRunFlags::SAMPLE_DURATION_PRESENT),
        flags.contains(TrackFragmentRunFlags::SAMPLE_SIZE_PRESENT),
        flags.contains(TrackFragmentRunFlags::SAMPLE_FLAGS_PRESENT),
        flags.contains(TrackFragmentRunFlags::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT),
    ];

    let present = [
        sample.duration.is_some(),
        sample.size.is_some(),
        sample.flags.is_some(),
        sample.composition_time_offset.is_some(),
    ];

    if expected != present {
        return Err(Mp4BoxError::corrupt(
            TrackFragmentRunBox::NAME,
            "samples in one run must carry the same optional fields",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_sample_fields() {
        let trun = TrackFragmentRunBox {
            data_offset: Some(120),
            first_sample_flags: Some(0x0200_0000),
            samples: vec![
                TrackFragmentSample {
                    size: Some(100),
                    composition_time_offset: Some(80),
                    ..Default::default()
                },
                TrackFragmentSample {
                    size: Some(20),
                    composition_time_offset: Some(-40),
                    ..Default::default()
                },
            ],
        };

        let bytes = trun.to_bytes().unwrap();
        assert_eq!(bytes[8], 1);
        assert_eq!(&bytes[9..12], &[0x00, 0x0a, 0x05]);
        assert_eq!(bytes.len(), 12 + 4 + 4 + 4 + 2 * 8);
        assert_eq!(TrackFragmentRunBox::read(&bytes).unwrap(), trun);
    }

    #[test]
    fn mismatched_samples_are_rejected() {
        let trun = TrackFragmentRunBox {
            data_offset: None,
            first_sample_flags: None,
            samples: vec![
                TrackFragmentSample {
                    size: Some(100),
                    ..Default::default()
                },
                TrackFragmentSample::default(),
            ],
        };

        let mut writer = BytesMut::new();
        assert!(trun.write_box_contents(&mut writer).unwrap_err().is_corrupt());
    }
}
