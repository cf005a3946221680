use std::collections::HashMap;

use bytes::{BufMut, BytesMut};

use tracing::{debug, trace};

use crate::{
    BaseOffsetPolicy, Mp4Box, Mp4BoxError, RandomAccessEntry, Result, Sample, SegmentIndexBox,
    SegmentReference, Track, TrackFragmentBaseMediaDecodeTimeBox, TrackFragmentBox,
    TrackFragmentHeaderBox, TrackFragmentRandomAccessBox, TrackFragmentRunBox,
    TrackFragmentSample,
};

/// `sample_depends_on` = 1, the sample is not an I picture.
pub const SAMPLE_FLAGS_DEPENDS_YES: u32 = 0x0100_0000;
/// `sample_depends_on` = 2, the sample is an I picture.
pub const SAMPLE_FLAGS_DEPENDS_NO: u32 = 0x0200_0000;
pub const SAMPLE_FLAGS_IS_NON_SYNC: u32 = 0x0001_0000;

/// One track's share of a written `moof`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Fragment {
    /// Position of the `moof` in the stream.
    pub offset: u64,
    /// Sum of the sample durations in track timescale.
    pub duration: u64,
    pub first_pts: u64,
    pub first_dts: u64,
    pub last_pts: u64,
    pub last_dts: u64,
}

/// Reported to [`crate::Muxer::on_fragment`] after every flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentInfo {
    pub sequence_number: u32,
    pub offset: u64,
    pub tracks: Vec<FragmentTrackInfo>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FragmentTrackInfo {
    pub track_id: u32,
    pub duration: u64,
    pub first_pts: u64,
    pub first_dts: u64,
}

pub(crate) fn sample_flags(video: bool, keyframe: bool) -> u32 {
    if !video || keyframe {
        SAMPLE_FLAGS_DEPENDS_NO
    } else {
        SAMPLE_FLAGS_DEPENDS_YES | SAMPLE_FLAGS_IS_NON_SYNC
    }
}

fn tick_delta(from: u64, to: u64) -> u32 {
    u32::try_from(to.saturating_sub(from)).unwrap_or(u32::MAX)
}

/// Samples of one track waiting for the next flush. Offsets are relative to
/// the start of `data`.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingFragment {
    pub(crate) samples: Vec<Sample>,
    pub(crate) data: BytesMut,
}

impl PendingFragment {
    pub(crate) fn push(&mut self, dts: u64, pts: u64, keyframe: bool, payload: &[u8]) {
        self.samples.push(Sample {
            dts,
            pts,
            size: payload.len() as u32,
            offset: self.data.len() as u64,
            keyframe,
        });
        self.data.put_slice(payload);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.samples.clear();
        self.data.clear();
    }

    /// Per-sample durations plus the default duration for `tfhd`. The last
    /// sample lasts until `next_dts` when the following sample is known.
    fn durations(&self, track: &Track, next_dts: Option<u64>) -> (Vec<u32>, u32) {
        let samples = &self.samples;

        let default = match samples.as_slice() {
            [first, second, ..] => tick_delta(first.dts, second.dts),
            [only] => next_dts
                .map(|next| tick_delta(only.dts, next))
                .or_else(|| track.fragments.last().map(|f| tick_delta(f.last_dts, only.dts)))
                .unwrap_or(0),
            [] => 0,
        };

        let durations = samples
            .iter()
            .enumerate()
            .map(|(i, sample)| match samples.get(i + 1).map(|s| s.dts).or(next_dts) {
                Some(next) => tick_delta(sample.dts, next),
                None => default,
            })
            .collect();

        (durations, default)
    }

    /// Builds the `traf` describing these samples. `data_base` is added to
    /// every sample offset to form the `trun` data offsets, which are
    /// relative to the start of the `moof`.
    pub(crate) fn traf(&self, track: &Track, data_base: u64, next_dts: Option<u64>) -> Result<TrafSummary> {
        let samples = &self.samples;
        let video = track.is_video();
        let (durations, default_duration) = self.durations(track, next_dts);
        let default_size = samples.first().map(|s| s.size).unwrap_or(0);
        let default_flags = if video {
            SAMPLE_FLAGS_DEPENDS_YES | SAMPLE_FLAGS_IS_NON_SYNC
        } else {
            SAMPLE_FLAGS_DEPENDS_NO
        };

        let tfhd = TrackFragmentHeaderBox {
            track_id: track.id,
            base_data_offset: None,
            sample_description_index: Some(1),
            default_sample_duration: samples.first().map(|_| default_duration),
            default_sample_size: samples.first().map(|_| default_size),
            default_sample_flags: samples.first().map(|_| default_flags),
            duration_is_empty: samples.is_empty(),
            default_base_is_moof: true,
        };

        let mut track_runs = Vec::new();
        let mut start = 0;
        for i in 1..=samples.len() {
            if i < samples.len() && samples[i].offset == samples[i - 1].end() {
                continue;
            }

            track_runs.push(run(
                &samples[start..i],
                &durations[start..i],
                data_base,
                (default_duration, default_size),
                video,
            )?);
            start = i;
        }

        let traf = TrackFragmentBox {
            tfhd,
            track_runs,
            base_media_decode_time: samples.first().map(|s| TrackFragmentBaseMediaDecodeTimeBox {
                base_media_decode_time: s.dts,
            }),
        };

        Ok(TrafSummary {
            traf,
            duration: durations.iter().map(|&d| d as u64).sum(),
        })
    }

    /// The record kept for the random access index once this fragment is
    /// written at `offset`.
    pub(crate) fn record(&self, offset: u64, duration: u64) -> Option<Fragment> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;

        Some(Fragment {
            offset,
            duration,
            first_pts: first.pts,
            first_dts: first.dts,
            last_pts: last.pts,
            last_dts: last.dts,
        })
    }

    /// A DASH segment index for this track. `first_offset` skips the `sidx`
    /// boxes that follow this one.
    pub(crate) fn sidx(&self, track: &Track, first_offset: u64, referenced_size: u64) -> Result<SegmentIndexBox> {
        let first = self.samples.first().copied().unwrap_or_default();
        let last = self.samples.last().copied().unwrap_or_default();

        let referenced_size = u32::try_from(referenced_size).map_err(|_| {
            Mp4BoxError::corrupt(
                SegmentIndexBox::NAME,
                format!("segment of {} bytes is too large to reference", referenced_size),
            )
        })?;

        Ok(SegmentIndexBox {
            reference_id: track.id,
            timescale: track.timescale,
            earliest_presentation_time: first.pts,
            first_offset,
            references: vec![SegmentReference {
                reference_type: false,
                referenced_size,
                subsegment_duration: tick_delta(first.dts, last.dts),
                starts_with_sap: true,
                sap_type: 0,
                sap_delta_time: 0,
            }],
        })
    }
}

pub(crate) struct TrafSummary {
    pub(crate) traf: TrackFragmentBox,
    pub(crate) duration: u64,
}

fn run(
    samples: &[Sample],
    durations: &[u32],
    data_base: u64,
    (default_duration, default_size): (u32, u32),
    video: bool,
) -> Result<TrackFragmentRunBox> {
    let first = samples[0];

    let data_offset = i32::try_from(data_base + first.offset).map_err(|_| {
        Mp4BoxError::corrupt(TrackFragmentRunBox::NAME, "data offset does not fit 32 bits")
    })?;

    let write_duration = durations.iter().any(|&d| d != default_duration);
    let write_size = samples.iter().any(|s| s.size != default_size);
    let write_cts = samples.iter().any(|s| s.pts != s.dts);
    // a keyframe after the first sample needs flags of its own
    let write_flags = video && samples.iter().skip(1).any(|s| s.keyframe);

    let first_sample_flags = if video && first.keyframe && !write_flags {
        Some(SAMPLE_FLAGS_DEPENDS_NO)
    } else {
        None
    };

    let mut entries = Vec::with_capacity(samples.len());
    for (sample, &duration) in samples.iter().zip(durations) {
        let composition_time_offset = if write_cts {
            Some(i32::try_from(sample.cts()).map_err(|_| {
                Mp4BoxError::corrupt(
                    TrackFragmentRunBox::NAME,
                    format!("composition offset {} does not fit 32 bits", sample.cts()),
                )
            })?)
        } else {
            None
        };

        entries.push(TrackFragmentSample {
            duration: write_duration.then(|| duration),
            size: write_size.then(|| sample.size),
            flags: write_flags.then(|| sample_flags(video, sample.keyframe)),
            composition_time_offset,
        });
    }

    Ok(TrackFragmentRunBox {
        data_offset: Some(data_offset),
        first_sample_flags,
        samples: entries,
    })
}

/// The `tfra` entries of a track, one per written fragment.
pub(crate) fn tfra(track: &Track) -> TrackFragmentRandomAccessBox {
    let mut tfra = TrackFragmentRandomAccessBox::new(track.id);
    tfra.entries = track
        .fragments
        .iter()
        .map(|f| RandomAccessEntry::new(f.first_pts, f.offset))
        .collect();

    tfra
}

/// Registers used while the demuxer walks the boxes of a `moof`.
#[derive(Debug, Default)]
pub(crate) struct FragmentState {
    pub(crate) moof_offset: u64,
    /// Index into the track list of the track named by the last `tfhd`.
    pub(crate) current: Option<usize>,
    tfhd: TrackFragmentHeaderBox,
    base_data_offset: u64,
    /// Where a `trun` without a data offset starts.
    next_data: u64,
    /// End of the sample data of the previous `traf` in this `moof`.
    traf_data_end: Option<u64>,
    dts: Option<u64>,
    /// Running decode time per track index, for fragments without `tfdt`.
    track_dts: HashMap<usize, u64>,
}

impl FragmentState {
    pub(crate) fn begin_moof(&mut self, offset: u64, size: u64) {
        self.moof_offset = offset;
        self.next_data = offset + size + 8;
        self.traf_data_end = None;
        self.current = None;
    }

    pub(crate) fn begin_traf(
        &mut self,
        tfhd: TrackFragmentHeaderBox,
        tracks: &[Track],
        policy: BaseOffsetPolicy,
    ) -> Result<()> {
        let index = tracks
            .iter()
            .position(|t| t.id == tfhd.track_id)
            .ok_or(Mp4BoxError::UnknownTrack(tfhd.track_id))?;

        self.base_data_offset = match tfhd.base_data_offset {
            Some(base) => {
                self.next_data = base;
                base
            }
            None if tfhd.default_base_is_moof => self.moof_offset,
            None => match policy {
                BaseOffsetPolicy::MoofOffset => {
                    debug!("tfhd of track {} has no base offset, using the moof offset", tfhd.track_id);
                    self.moof_offset
                }
                BaseOffsetPolicy::PreviousTrafEnd => {
                    let base = self.traf_data_end.unwrap_or(self.moof_offset);
                    debug!("tfhd of track {} has no base offset, continuing at {}", tfhd.track_id, base);
                    self.next_data = base;
                    base
                }
            },
        };

        self.current = Some(index);
        self.tfhd = tfhd;
        self.dts = None;

        Ok(())
    }

    pub(crate) fn base_decode_time(&mut self, tfdt: &TrackFragmentBaseMediaDecodeTimeBox) {
        self.dts = Some(tfdt.base_media_decode_time);
    }

    /// Appends the samples of a `trun` to the current track.
    pub(crate) fn read_run(&mut self, trun: &TrackFragmentRunBox, tracks: &mut [Track]) -> Result<()> {
        let index = self.current.ok_or_else(|| {
            Mp4BoxError::corrupt(TrackFragmentRunBox::NAME, "no preceding tfhd")
        })?;
        let track = &mut tracks[index];

        let trex = track.trex.as_ref();
        let default_duration = self
            .tfhd
            .default_sample_duration
            .or_else(|| trex.map(|t| t.default_sample_duration))
            .unwrap_or(0);
        let default_size = self
            .tfhd
            .default_sample_size
            .or_else(|| trex.map(|t| t.default_sample_size))
            .unwrap_or(0);
        let default_flags = self
            .tfhd
            .default_sample_flags
            .or_else(|| trex.map(|t| t.default_sample_flags))
            .unwrap_or(0);

        let mut offset = match trun.data_offset {
            Some(data_offset) => {
                let offset = self.base_data_offset as i64 + data_offset as i64;
                u64::try_from(offset).map_err(|_| {
                    Mp4BoxError::corrupt(
                        TrackFragmentRunBox::NAME,
                        format!("data offset {} points before the stream", offset),
                    )
                })?
            }
            None => self.next_data,
        };

        let mut dts = self
            .dts
            .or_else(|| self.track_dts.get(&index).copied())
            .unwrap_or(0);

        trace!(
            "trun of track {}: {} samples at {} from dts {}",
            track.id,
            trun.samples.len(),
            offset,
            dts
        );

        let first = track.samples.len();
        let start_dts = dts;

        for (i, entry) in trun.samples.iter().enumerate() {
            let flags = match (i, entry.flags) {
                (_, Some(flags)) => flags,
                (0, None) => trun.first_sample_flags.unwrap_or(default_flags),
                (_, None) => default_flags,
            };
            let size = entry.size.unwrap_or(default_size);
            let cts = entry.composition_time_offset.unwrap_or(0);

            track.samples.push(Sample {
                dts,
                pts: (dts as i64 + cts as i64).max(0) as u64,
                size,
                offset,
                keyframe: flags & SAMPLE_FLAGS_IS_NON_SYNC == 0,
            });

            offset += size as u64;
            dts += entry.duration.unwrap_or(default_duration) as u64;
        }

        if let (Some(head), Some(tail)) = (track.samples.get(first), track.samples.last()) {
            let (head, tail) = (*head, *tail);
            let moof_offset = self.moof_offset;

            // runs of the same moof extend one fragment
            match track.fragments.last_mut() {
                Some(fragment) if fragment.offset == moof_offset => {
                    fragment.duration += dts - start_dts;
                    fragment.last_pts = tail.pts;
                    fragment.last_dts = tail.dts;
                }
                _ => track.fragments.push(Fragment {
                    offset: moof_offset,
                    duration: dts - start_dts,
                    first_pts: head.pts,
                    first_dts: head.dts,
                    last_pts: tail.pts,
                    last_dts: tail.dts,
                }),
            }
        }

        self.dts = Some(dts);
        self.track_dts.insert(index, dts);
        self.next_data = offset;
        self.traf_data_end = Some(offset);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CodecId, TrackConfig, TrackExtendsBox};

    fn video() -> Track {
        Track::new(1, TrackConfig::video(CodecId::H264, 320, 240, Vec::new()))
    }

    fn pending(frames: &[(u64, u64, bool, usize)]) -> PendingFragment {
        let mut pending = PendingFragment::default();
        for &(dts, pts, keyframe, len) in frames {
            pending.push(dts, pts, keyframe, &vec![0u8; len]);
        }

        pending
    }

    #[test]
    fn traf_defaults_come_from_the_first_samples() {
        let pending = pending(&[(0, 0, true, 10), (40, 40, false, 10), (80, 80, false, 10)]);
        let summary = pending.traf(&video(), 100, Some(120)).unwrap();
        let traf = summary.traf;

        assert_eq!(traf.tfhd.default_sample_duration, Some(40));
        assert_eq!(traf.tfhd.default_sample_size, Some(10));
        assert_eq!(
            traf.tfhd.default_sample_flags,
            Some(SAMPLE_FLAGS_DEPENDS_YES | SAMPLE_FLAGS_IS_NON_SYNC)
        );
        assert!(traf.tfhd.default_base_is_moof);
        assert_eq!(traf.base_media_decode_time.unwrap().base_media_decode_time, 0);
        assert_eq!(summary.duration, 120);

        assert_eq!(traf.track_runs.len(), 1);
        let trun = &traf.track_runs[0];
        assert_eq!(trun.data_offset, Some(100));
        assert_eq!(trun.first_sample_flags, Some(SAMPLE_FLAGS_DEPENDS_NO));
        assert!(trun.samples.iter().all(|s| *s == TrackFragmentSample::default()));
    }

    #[test]
    fn differing_fields_are_written_per_sample() {
        let pending = pending(&[(0, 40, true, 10), (40, 40, false, 12), (100, 100, true, 10)]);
        let trun = &pending.traf(&video(), 0, None).unwrap().traf.track_runs[0];

        assert_eq!(trun.first_sample_flags, None);
        assert_eq!(trun.samples[1].size, Some(12));
        assert_eq!(trun.samples[1].duration, Some(60));
        assert_eq!(trun.samples[0].composition_time_offset, Some(40));
        assert_eq!(trun.samples[2].flags, Some(SAMPLE_FLAGS_DEPENDS_NO));
        assert_eq!(
            trun.samples[1].flags,
            Some(SAMPLE_FLAGS_DEPENDS_YES | SAMPLE_FLAGS_IS_NON_SYNC)
        );
    }

    #[test]
    fn gaps_split_runs() {
        let mut pending = pending(&[(0, 0, true, 10), (40, 40, false, 10), (80, 80, false, 10)]);
        pending.samples[2].offset += 7;

        let traf = pending.traf(&video(), 50, None).unwrap().traf;
        assert_eq!(traf.track_runs.len(), 2);
        assert_eq!(traf.track_runs[1].data_offset, Some(50 + 27));
    }

    fn read_back(traf: &TrackFragmentBox, tracks: &mut [Track], moof_offset: u64, moof_size: u64) {
        let mut state = FragmentState::default();
        state.begin_moof(moof_offset, moof_size);
        state
            .begin_traf(traf.tfhd.clone(), tracks, BaseOffsetPolicy::MoofOffset)
            .unwrap();
        if let Some(tfdt) = &traf.base_media_decode_time {
            state.base_decode_time(tfdt);
        }
        for trun in &traf.track_runs {
            state.read_run(trun, tracks).unwrap();
        }
    }

    #[test]
    fn written_runs_read_back() {
        let pending = pending(&[(1000, 1080, true, 10), (1040, 1040, false, 12), (1080, 1080, true, 9)]);
        let traf = pending.traf(&video(), 300 + 8, Some(1120)).unwrap().traf;

        let mut tracks = vec![video()];
        read_back(&traf, &mut tracks, 5000, 300);

        let expected: Vec<_> = pending
            .samples
            .iter()
            .map(|s| Sample {
                offset: s.offset + 5000 + 308,
                ..*s
            })
            .collect();
        assert_eq!(tracks[0].samples, expected);
    }

    #[test]
    fn runs_of_one_moof_make_one_fragment() {
        let mut first = pending(&[(0, 0, true, 10), (40, 40, false, 10), (80, 120, false, 10)]);
        first.samples[2].offset += 7;
        let traf = first.traf(&video(), 208, Some(120)).unwrap().traf;
        assert_eq!(traf.track_runs.len(), 2);

        let mut tracks = vec![video()];
        read_back(&traf, &mut tracks, 0, 200);

        let second = pending(&[(120, 120, true, 10)]);
        let traf = second.traf(&video(), 208, Some(160)).unwrap().traf;
        read_back(&traf, &mut tracks, 1000, 200);

        let fragments = &tracks[0].fragments;
        assert_eq!(fragments.len(), 2);
        assert_eq!(
            fragments[0],
            Fragment {
                offset: 0,
                duration: 120,
                first_pts: 0,
                first_dts: 0,
                last_pts: 120,
                last_dts: 80,
            }
        );
        assert_eq!(fragments[1].offset, 1000);
        assert_eq!(fragments[1].first_dts, 120);
        assert_eq!(fragments[1].duration, 40);
    }

    #[test]
    fn trex_defaults_fill_in() {
        let mut track = video();
        track.trex = Some(TrackExtendsBox {
            default_sample_duration: 20,
            default_sample_size: 4,
            ..TrackExtendsBox::new(1)
        });
        let mut tracks = vec![track];

        let traf = TrackFragmentBox {
            tfhd: TrackFragmentHeaderBox {
                track_id: 1,
                ..Default::default()
            },
            track_runs: vec![TrackFragmentRunBox {
                data_offset: None,
                first_sample_flags: None,
                samples: vec![TrackFragmentSample::default(); 3],
            }],
            base_media_decode_time: None,
        };
        read_back(&traf, &mut tracks, 100, 50);

        let samples = &tracks[0].samples;
        assert_eq!(samples.iter().map(|s| s.dts).collect::<Vec<_>>(), vec![0, 20, 40]);
        assert_eq!(samples.iter().map(|s| s.offset).collect::<Vec<_>>(), vec![158, 162, 166]);
        assert!(samples.iter().all(|s| s.keyframe));
    }

    #[test]
    fn previous_traf_end_policy() {
        let mut tracks = vec![video(), Track::new(2, TrackConfig::audio(CodecId::Aac, 2, 48000, Vec::new()))];
        let mut state = FragmentState::default();
        state.begin_moof(1000, 100);

        let run = |offset: Option<i32>| TrackFragmentRunBox {
            data_offset: offset,
            first_sample_flags: None,
            samples: vec![TrackFragmentSample {
                duration: Some(1),
                size: Some(10),
                ..Default::default()
            }],
        };
        let tfhd = |track_id| TrackFragmentHeaderBox {
            track_id,
            ..Default::default()
        };

        state
            .begin_traf(tfhd(1), &tracks, BaseOffsetPolicy::PreviousTrafEnd)
            .unwrap();
        state.read_run(&run(Some(108)), &mut tracks).unwrap();
        state
            .begin_traf(tfhd(2), &tracks, BaseOffsetPolicy::PreviousTrafEnd)
            .unwrap();
        state.read_run(&run(Some(4)), &mut tracks).unwrap();

        assert_eq!(tracks[0].samples[0].offset, 1108);
        assert_eq!(tracks[1].samples[0].offset, 1122);

        // the moof offset policy anchors every traf at the moof
        let mut state = FragmentState::default();
        state.begin_moof(1000, 100);
        state.begin_traf(tfhd(2), &tracks, BaseOffsetPolicy::MoofOffset).unwrap();
        state.read_run(&run(Some(4)), &mut tracks).unwrap();
        assert_eq!(tracks[1].samples[1].offset, 1004);
    }

    #[test]
    fn trun_before_tfhd_is_corrupt() {
        let mut tracks = vec![video()];
        let mut state = FragmentState::default();

        let err = state
            .read_run(&TrackFragmentRunBox::default(), &mut tracks)
            .unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn sidx_covers_the_segment() {
        let pending = pending(&[(90, 100, true, 10), (130, 130, false, 10)]);
        let sidx = pending.sidx(&video(), 52, 800).unwrap();

        assert_eq!(sidx.earliest_presentation_time, 100);
        assert_eq!(sidx.first_offset, 52);
        assert_eq!(sidx.references[0].referenced_size, 800);
        assert_eq!(sidx.references[0].subsegment_duration, 40);
        assert!(sidx.references[0].starts_with_sap);
    }
}
