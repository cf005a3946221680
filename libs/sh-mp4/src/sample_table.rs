use four_cc::FourCC;

use tracing::warn;

use crate::{
    ChunkOffsets, CompositionOffsetBox, CompositionOffsetEntry, Mp4Box, Mp4BoxError, Result,
    SampleSizeBox, SampleToChunkBox, SampleToChunkEntry, SyncSampleBox, TimeToSampleBox,
    TimeToSampleEntry,
};

/// One access unit of a track. Times are in the track timescale, `offset`
/// is the absolute position of the payload in the stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Sample {
    pub dts: u64,
    pub pts: u64,
    pub size: u32,
    pub offset: u64,
    pub keyframe: bool,
}

impl Sample {
    pub fn end(&self) -> u64 {
        self.offset + self.size as u64
    }

    /// Composition offset, `pts - dts`.
    pub fn cts(&self) -> i64 {
        self.pts as i64 - self.dts as i64
    }
}

/// The run-length tables of an `stbl`, minus the sample descriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleTable {
    pub stts: TimeToSampleBox,
    pub ctts: Option<CompositionOffsetBox>,
    pub stsc: SampleToChunkBox,
    pub stsz: SampleSizeBox,
    pub chunk_offsets: ChunkOffsets,
    /// Absent means every sample is a sync sample.
    pub stss: Option<SyncSampleBox>,
}

impl SampleTable {
    /// Compresses a finished sample list, ordered by dts.
    ///
    /// `video` tracks get composition offsets and a sync sample table, audio
    /// tracks have neither.
    pub fn build(samples: &[Sample], video: bool) -> Result<SampleTable> {
        let mut table = SampleTable::default();

        if samples.is_empty() {
            return Ok(table);
        }

        let mut ctts = Vec::<CompositionOffsetEntry>::new();
        let mut chunks = Vec::<(u64, u32)>::new();
        let mut clamped = 0usize;

        for (i, sample) in samples.iter().enumerate() {
            let delta = match samples.get(i + 1) {
                Some(next) if next.dts > sample.dts => u32::try_from(next.dts - sample.dts).map_err(|_| {
                    Mp4BoxError::corrupt(
                        TimeToSampleBox::NAME,
                        format!("dts gap of {} does not fit 32 bits", next.dts - sample.dts),
                    )
                })?,
                Some(_) => {
                    clamped += 1;
                    1
                }
                None => 1,
            };

            match table.stts.entries.last_mut() {
                Some(last) if last.delta == delta => last.count += 1,
                _ => table.stts.entries.push(TimeToSampleEntry { count: 1, delta }),
            }

            if video {
                let offset = i32::try_from(sample.cts()).map_err(|_| {
                    Mp4BoxError::corrupt(
                        CompositionOffsetBox::NAME,
                        format!("composition offset {} does not fit 32 bits", sample.cts()),
                    )
                })?;

                match ctts.last_mut() {
                    Some(last) if last.offset == offset => last.count += 1,
                    _ => ctts.push(CompositionOffsetEntry { count: 1, offset }),
                }
            }

            // a sample that does not continue the previous one starts a chunk
            match chunks.last_mut() {
                Some((_, count)) if i > 0 && samples[i - 1].end() == sample.offset => *count += 1,
                _ => chunks.push((sample.offset, 1)),
            }
        }

        if clamped > 0 {
            warn!("{} non-increasing dts values forced forward by one tick", clamped);
        }

        for (i, &(_, count)) in chunks.iter().enumerate() {
            if table.stsc.entries.last().map(|e| e.samples_per_chunk) != Some(count) {
                table.stsc.entries.push(SampleToChunkEntry {
                    first_chunk: i as u32 + 1,
                    samples_per_chunk: count,
                    sample_description_index: 1,
                });
            }
        }

        table.chunk_offsets = ChunkOffsets::from_offsets(chunks.iter().map(|&(offset, _)| offset).collect());

        let first_size = samples[0].size;
        table.stsz = if samples.iter().all(|s| s.size == first_size) {
            SampleSizeBox::fixed(first_size, samples.len() as u32)
        } else {
            SampleSizeBox::per_sample(samples.iter().map(|s| s.size).collect())
        };

        if video {
            table.ctts = Some(CompositionOffsetBox { entries: ctts });
            table.stss = Some(SyncSampleBox {
                sample_numbers: samples
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.keyframe)
                    .map(|(i, _)| i as u32 + 1)
                    .collect(),
            });
        }

        Ok(table)
    }

    pub fn sample_count(&self) -> u32 {
        self.stsz.sample_count
    }

    /// Reconstructs every sample described by the tables. `first_dts` seeds
    /// the decode time of the first sample.
    pub fn expand(&self, first_dts: u64) -> Result<Vec<Sample>> {
        let count = self.stsz.sample_count as usize;
        let mut samples = Vec::with_capacity(count);

        if count == 0 {
            return Ok(samples);
        }

        if self.stts.sample_count() < count as u64 {
            return Err(shortfall(TimeToSampleBox::NAME, self.stts.sample_count(), count));
        }

        if self.stsc.entries.is_empty() {
            return Err(shortfall(SampleToChunkBox::NAME, 0, count));
        }

        // offsets and sizes, chunk by chunk
        let mut run = 0;
        for chunk in 0..self.chunk_offsets.len() {
            let chunk_number = chunk as u32 + 1;
            while run + 1 < self.stsc.entries.len() && self.stsc.entries[run + 1].first_chunk <= chunk_number {
                run += 1;
            }

            let mut offset = self.chunk_offsets.get(chunk).unwrap_or_default();
            for _ in 0..self.stsc.entries[run].samples_per_chunk {
                if samples.len() == count {
                    break;
                }

                let size = self
                    .stsz
                    .get(samples.len())
                    .ok_or_else(|| shortfall(SampleSizeBox::NAME, samples.len() as u64, count))?;

                samples.push(Sample {
                    offset,
                    size,
                    ..Default::default()
                });
                offset += size as u64;
            }
        }

        if samples.len() < count {
            return Err(shortfall(SampleToChunkBox::NAME, samples.len() as u64, count));
        }

        let mut dts = first_dts;
        let deltas = self
            .stts
            .entries
            .iter()
            .flat_map(|e| std::iter::repeat(e.delta).take(e.count as usize));
        for (sample, delta) in samples.iter_mut().zip(deltas) {
            sample.dts = dts;
            sample.pts = dts;
            dts += delta as u64;
        }

        if let Some(ctts) = self.ctts.as_ref().filter(|c| !c.entries.is_empty()) {
            if ctts.sample_count() < count as u64 {
                return Err(shortfall(CompositionOffsetBox::NAME, ctts.sample_count(), count));
            }

            let offsets = ctts
                .entries
                .iter()
                .flat_map(|e| std::iter::repeat(e.offset).take(e.count as usize));
            for (sample, offset) in samples.iter_mut().zip(offsets) {
                sample.pts = (sample.dts as i64 + offset as i64).max(0) as u64;
            }
        }

        match self.stss.as_ref().filter(|s| !s.sample_numbers.is_empty()) {
            Some(stss) => {
                for &number in &stss.sample_numbers {
                    if let Some(sample) = (number as usize).checked_sub(1).and_then(|i| samples.get_mut(i)) {
                        sample.keyframe = true;
                    }
                }
            }
            None => samples.iter_mut().for_each(|s| s.keyframe = true),
        }

        Ok(samples)
    }
}

fn shortfall(box_type: FourCC, described: u64, count: usize) -> Mp4BoxError {
    Mp4BoxError::corrupt(
        box_type,
        format!("describes {} samples but stsz declares {}", described, count),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contiguous(count: usize, size: u32) -> Vec<Sample> {
        (0..count)
            .map(|i| Sample {
                dts: i as u64 * 40,
                pts: i as u64 * 40 + if i % 2 == 0 { 80 } else { 0 },
                size,
                offset: i as u64 * size as u64,
                keyframe: i % 3 == 0,
            })
            .collect()
    }

    #[test]
    fn contiguous_samples_share_one_chunk() {
        let samples = contiguous(5, 100);
        let table = SampleTable::build(&samples, true).unwrap();

        assert_eq!(table.chunk_offsets, ChunkOffsets::from_offsets(vec![0]));
        assert_eq!(
            table.stsc.entries,
            vec![SampleToChunkEntry {
                first_chunk: 1,
                samples_per_chunk: 5,
                sample_description_index: 1,
            }]
        );
        assert_eq!(table.stsz, SampleSizeBox::fixed(100, 5));
        assert_eq!(table.stss.as_ref().unwrap().sample_numbers, vec![1, 4]);
        assert_eq!(table.expand(0).unwrap(), samples);
    }

    #[test]
    fn interleaved_chunks_round_trip() {
        let mut samples = contiguous(7, 10);
        samples[6].size = 20;
        for sample in &mut samples[2..] {
            sample.offset += 500;
        }
        for sample in &mut samples[5..] {
            sample.offset += 500;
        }

        let table = SampleTable::build(&samples, true).unwrap();
        assert_eq!(table.chunk_offsets.len(), 3);
        assert_eq!(table.stsz.entry_sizes.len(), 7);
        assert_eq!(table.stsc.entries.len(), 3);
        assert_eq!(table.expand(0).unwrap(), samples);
    }

    #[test]
    fn audio_has_no_composition_or_sync_table() {
        let samples: Vec<_> = contiguous(4, 8)
            .into_iter()
            .map(|s| Sample {
                pts: s.dts,
                keyframe: true,
                ..s
            })
            .collect();

        let table = SampleTable::build(&samples, false).unwrap();
        assert!(table.ctts.is_none());
        assert!(table.stss.is_none());
        assert_eq!(
            table.stts.entries,
            vec![
                TimeToSampleEntry { count: 3, delta: 40 },
                TimeToSampleEntry { count: 1, delta: 1 },
            ]
        );
        assert_eq!(table.expand(0).unwrap(), samples);
    }

    #[test]
    fn non_increasing_dts_is_clamped() {
        let mut samples = contiguous(3, 8);
        samples[1].dts = 0;
        samples[1].pts = 0;

        let table = SampleTable::build(&samples, false).unwrap();
        assert_eq!(table.stts.entries[0], TimeToSampleEntry { count: 1, delta: 1 });
        assert_eq!(table.stts.entries[1], TimeToSampleEntry { count: 1, delta: 80 });
    }

    #[test]
    fn one_different_size_lists_every_size() {
        let mut samples = contiguous(6, 200);
        assert_eq!(SampleTable::build(&samples, false).unwrap().stsz.sample_size, 200);

        samples[4].size = 199;
        let stsz = SampleTable::build(&samples, false).unwrap().stsz;
        assert_eq!(stsz.sample_size, 0);
        assert_eq!(stsz.entry_sizes.len(), 6);
    }

    #[test]
    fn first_dts_seeds_decode_times() {
        let table = SampleTable::build(&contiguous(3, 4), false).unwrap();
        let samples = table.expand(1000).unwrap();

        assert_eq!(samples[0].dts, 1000);
        assert_eq!(samples[2].dts, 1080);
    }

    #[test]
    fn shortfall_is_corrupt() {
        let mut table = SampleTable::build(&contiguous(5, 100), true).unwrap();
        table.stsz.sample_count = 6;

        assert!(table.expand(0).unwrap_err().is_corrupt());

        let mut table = SampleTable::build(&contiguous(5, 100), true).unwrap();
        table.stsc.entries[0].samples_per_chunk = 4;
        table.stts.entries.push(TimeToSampleEntry { count: 1, delta: 1 });

        assert!(table.expand(0).unwrap_err().is_corrupt());
    }
}
