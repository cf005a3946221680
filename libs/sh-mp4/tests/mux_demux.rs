use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use sh_mp4::{
    BaseOffsetPolicy, CodecId, Demuxer, DemuxerConfig, FourCC, FragmentPolicy, Mp4Box, MovieFragmentBox,
    MovieFragmentHeaderBox, MuxMode, Muxer, MuxerConfig, Sample, TrackConfig, TrackFragmentBox,
    TrackFragmentHeaderBox, TrackFragmentRunBox, TrackFragmentSample,
};

fn h264() -> TrackConfig {
    TrackConfig::video(CodecId::H264, 1280, 720, vec![1, 0x64, 0, 0x1f, 0xff, 0xe0, 0x00])
}

fn aac() -> TrackConfig {
    TrackConfig::audio(CodecId::Aac, 2, 48000, vec![0x11, 0x90])
}

fn payload(i: u64) -> Vec<u8> {
    vec![i as u8 + 1; 10 + i as usize]
}

fn demux(data: Vec<u8>) -> Demuxer<Cursor<Vec<u8>>> {
    let mut demuxer = Demuxer::new(Cursor::new(data));
    demuxer.demux().unwrap();
    demuxer
}

#[test]
fn progressive_round_trip() {
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::progressive()).unwrap();
    let track = muxer.add_track(h264()).unwrap();

    for i in 0..6u64 {
        let pts = i * 40 + if i % 2 == 1 { 40 } else { 0 };
        muxer.write_sample(track, &payload(i), i * 40, pts, i == 0).unwrap();
    }
    muxer.write_trailer().unwrap();

    let mut demuxer = demux(muxer.into_inner().into_inner());
    assert_eq!(demuxer.info().major_brand, Some(FourCC(*b"isom")));
    assert!(!demuxer.info().is_fragmented);

    let track = demuxer.tracks()[0].clone();
    assert_eq!(track.codec, CodecId::H264);
    assert_eq!(track.width, 1280);
    assert_eq!(track.samples.len(), 6);
    assert_eq!(track.samples[1].pts, 80);
    assert_eq!(track.sync_samples().count(), 1);

    for (i, sample) in track.samples.iter().enumerate() {
        let data = demuxer.read_sample_data(sample).unwrap();
        assert_eq!(data.to_vec(), payload(i as u64));
    }
}

#[test]
fn late_start_survives_a_progressive_round_trip() {
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::progressive()).unwrap();
    let track = muxer.add_track(h264().with_timescale(1000)).unwrap();

    for i in 0..4u64 {
        muxer.write_sample(track, &payload(i), 5000 + i * 40, 5000 + i * 40, i == 0).unwrap();
    }
    muxer.write_trailer().unwrap();

    let demuxer = demux(muxer.into_inner().into_inner());
    let dts: Vec<u64> = demuxer.tracks()[0].samples.iter().map(|s| s.dts).collect();
    assert_eq!(dts, vec![5000, 5040, 5080, 5120]);
    assert_eq!(demuxer.tracks()[0].start_dts_ms(), Some(5000));
}

#[test]
fn fragments_round_trip() {
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::fragmented()).unwrap();
    let track = muxer.add_track(h264()).unwrap();

    for i in 0..10u64 {
        muxer.write_sample(track, &payload(i), i * 40, i * 40, i % 4 == 0).unwrap();
    }
    muxer.finish().unwrap();

    let offsets: Vec<u64> = muxer.track(track).unwrap().fragments.iter().map(|f| f.offset).collect();
    assert_eq!(offsets.len(), 3);

    let mut demuxer = demux(muxer.into_inner().into_inner());
    assert!(demuxer.info().is_fragmented);
    assert_eq!(demuxer.info().major_brand, Some(FourCC(*b"iso5")));

    let access: Vec<u64> = demuxer.random_access().iter().map(|p| p.moof_offset).collect();
    assert_eq!(access, offsets);

    let read: Vec<u64> = demuxer.tracks()[0].fragments.iter().map(|f| f.offset).collect();
    assert_eq!(read, offsets);
    assert_eq!(demuxer.tracks()[0].fragments[1].first_dts, 160);

    let samples = demuxer.tracks()[0].samples.clone();
    assert_eq!(samples.len(), 10);
    for (i, sample) in samples.iter().enumerate() {
        assert_eq!(sample.dts, i as u64 * 40);
        assert_eq!(sample.keyframe, i % 4 == 0);
        assert_eq!(demuxer.read_sample_data(sample).unwrap().to_vec(), payload(i as u64));
    }
}

/// Composition offsets of a repeating I B B P pattern at 25 fps, 90 kHz.
const REORDER: [u64; 4] = [7200, 14400, 3600, 3600];

fn video_frame(i: u64) -> (u64, u64, bool) {
    let dts = i * 3600;
    (dts, dts + REORDER[(i % 4) as usize], i % 4 == 0)
}

#[test]
fn two_track_fragments_keep_reordered_timestamps() {
    let config = MuxerConfig {
        fragmentation: FragmentPolicy::Manual,
        ..MuxerConfig::fragmented()
    };
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), config).unwrap();
    let video = muxer.add_track(h264().with_timescale(90000)).unwrap();
    let audio = muxer.add_track(aac().with_timescale(48000)).unwrap();

    // the first fragment holds two GOPs, so its run has a keyframe in the middle
    for (frames, audio_frames) in [(0..8u64, 0..10u64), (8..12, 10..15)] {
        for i in frames {
            let (dts, pts, keyframe) = video_frame(i);
            muxer.write_sample(video, &payload(i), dts, pts, keyframe).unwrap();
        }
        for j in audio_frames {
            muxer.write_sample(audio, &[0xa0 + j as u8; 6], j * 1024, j * 1024, true).unwrap();
        }
        muxer.flush_fragment().unwrap();
    }
    muxer.finish().unwrap();

    let written_video: Vec<u64> = muxer.track(video).unwrap().fragments.iter().map(|f| f.offset).collect();
    assert_eq!(written_video.len(), 2);

    let mut demuxer = demux(muxer.into_inner().into_inner());
    assert_eq!(demuxer.tracks().len(), 2);

    let samples = demuxer.tracks()[0].samples.clone();
    assert_eq!(samples.len(), 12);
    for (i, sample) in samples.iter().enumerate() {
        let (dts, pts, keyframe) = video_frame(i as u64);
        assert_eq!((sample.dts, sample.pts, sample.keyframe), (dts, pts, keyframe), "video sample {}", i);
        assert_eq!(sample.size as usize, payload(i as u64).len());
        assert_eq!(demuxer.read_sample_data(sample).unwrap().to_vec(), payload(i as u64));
    }

    let samples = demuxer.tracks()[1].samples.clone();
    assert_eq!(samples.len(), 15);
    for (j, sample) in samples.iter().enumerate() {
        assert_eq!((sample.dts, sample.pts), (j as u64 * 1024, j as u64 * 1024));
        assert!(sample.keyframe);
        assert_eq!(demuxer.read_sample_data(sample).unwrap().to_vec(), vec![0xa0 + j as u8; 6]);
    }

    // the mfra at the end indexes every fragment of both tracks by first pts
    let points: Vec<(u32, u64, u64)> = demuxer
        .random_access()
        .iter()
        .map(|p| (p.track_id, p.time, p.moof_offset))
        .collect();
    assert_eq!(
        points,
        vec![
            (video, 7200, written_video[0]),
            (video, 8 * 3600 + 7200, written_video[1]),
            (audio, 0, written_video[0]),
            (audio, 10 * 1024, written_video[1]),
        ]
    );
}

/// An init segment for a video and an audio track, then one `moof` whose
/// `tfhd`s name neither a base offset nor `default-base-is-moof`. The audio
/// run has a zero data offset, so its data starts wherever its base is.
fn implicit_base_offsets() -> (Vec<u8>, u64) {
    let mut muxer = Muxer::new(Vec::new(), MuxerConfig::fragmented()).unwrap();
    let video = muxer.add_track(h264().with_timescale(90000)).unwrap();
    let audio = muxer.add_track(aac().with_timescale(48000)).unwrap();
    let mut data = muxer.init_segment().unwrap().to_vec();
    let moof_offset = data.len() as u64;

    let traf = |track_id, data_offset, size, duration, count| TrackFragmentBox {
        tfhd: TrackFragmentHeaderBox {
            track_id,
            ..Default::default()
        },
        track_runs: vec![TrackFragmentRunBox {
            data_offset: Some(data_offset),
            first_sample_flags: None,
            samples: vec![
                TrackFragmentSample {
                    duration: Some(duration),
                    size: Some(size),
                    ..Default::default()
                };
                count
            ],
        }],
        base_media_decode_time: None,
    };
    let moof = |video_offset| MovieFragmentBox {
        mfhd: MovieFragmentHeaderBox { sequence_number: 1 },
        trafs: vec![traf(video, video_offset, 3, 3600, 2), traf(audio, 0, 2, 1024, 1)],
    };

    let moof = moof(moof(0).size() as i32 + 8);
    data.extend_from_slice(&moof.to_bytes().unwrap());
    data.extend_from_slice(&[0, 0, 0, 16]);
    data.extend_from_slice(b"mdat");
    data.extend_from_slice(&[1, 1, 1, 2, 2, 2, 9, 9]);

    (data, moof_offset)
}

#[test]
fn previous_traf_end_continues_after_the_last_run() {
    let (data, moof_offset) = implicit_base_offsets();

    let config = DemuxerConfig {
        base_offset_policy: BaseOffsetPolicy::PreviousTrafEnd,
    };
    let mut demuxer = Demuxer::with_config(Cursor::new(data.clone()), config);
    demuxer.demux().unwrap();

    let video = demuxer.tracks()[0].samples.clone();
    assert_eq!(demuxer.read_sample_data(&video[0]).unwrap().to_vec(), vec![1, 1, 1]);
    assert_eq!(demuxer.read_sample_data(&video[1]).unwrap().to_vec(), vec![2, 2, 2]);
    assert_eq!(video[1].dts, 3600);

    let audio = demuxer.tracks()[1].samples[0];
    assert_eq!(audio.offset, video[1].end());
    assert_eq!(demuxer.read_sample_data(&audio).unwrap().to_vec(), vec![9, 9]);

    // the default policy anchors the audio run at the moof instead
    let demuxer = demux(data);
    assert_eq!(demuxer.tracks()[1].samples[0].offset, moof_offset);
}

#[test]
fn manual_fragments_hold_until_flushed() {
    let config = MuxerConfig {
        fragmentation: FragmentPolicy::Manual,
        ..MuxerConfig::fragmented()
    };
    let mut muxer = Muxer::new(Vec::new(), config).unwrap();
    let track = muxer.add_track(h264()).unwrap();

    for i in 0..4u64 {
        muxer.write_sample(track, &payload(i), i * 40, i * 40, true).unwrap();
    }
    assert!(muxer.get_ref().is_empty());

    muxer.flush_fragment().unwrap();
    assert_eq!(muxer.track(track).unwrap().fragments.len(), 1);
}

#[test]
fn tracks_interleave_by_time_across_timescales() {
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::progressive()).unwrap();
    let video = muxer.add_track(h264().with_timescale(90000)).unwrap();
    let audio = muxer.add_track(aac().with_timescale(1000)).unwrap();

    let mut written = Vec::new();
    for ms in (0..200u64).step_by(20) {
        if ms % 40 == 0 {
            muxer.write_sample(video, &[1; 4], ms * 90, ms * 90, ms == 0).unwrap();
            written.push(video);
        }
        muxer.write_sample(audio, &[2; 4], ms, ms, true).unwrap();
        written.push(audio);
    }
    muxer.write_trailer().unwrap();

    let mut demuxer = demux(muxer.into_inner().into_inner());
    assert_eq!(demuxer.track(video).unwrap().timescale, 90000);
    assert_eq!(demuxer.track(audio).unwrap().timescale, 1000);

    let order: Vec<u32> = demuxer.samples().map(|(id, _)| id).collect();
    assert_eq!(order, written);
}

#[test]
fn seek_lands_on_keyframe() {
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::progressive()).unwrap();
    let track = muxer.add_track(h264()).unwrap();

    for i in 0..10u64 {
        muxer.write_sample(track, &payload(i), i * 40, i * 40, i % 5 == 0).unwrap();
    }
    muxer.write_trailer().unwrap();

    let mut demuxer = demux(muxer.into_inner().into_inner());
    let (id, sample) = demuxer.seek_time(120).unwrap();
    assert_eq!(id, track);
    assert_eq!(sample.dts, 200);
    assert!(sample.keyframe);

    assert!(demuxer.seek_time(10_000).is_err());
}

#[test]
fn unknown_boxes_are_skipped() {
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::progressive()).unwrap();
    let track = muxer.add_track(aac()).unwrap();
    muxer.write_sample(track, &[7; 12], 0, 0, true).unwrap();
    muxer.write_trailer().unwrap();

    let mut data = muxer.into_inner().into_inner();
    data.extend_from_slice(&[0, 0, 0, 42]);
    data.extend_from_slice(b"zzzz");
    data.extend_from_slice(&[0xee; 34]);

    let mut demuxer = demux(data);
    let sample = demuxer.tracks()[0].samples[0];
    assert_eq!(demuxer.read_sample_data(&sample).unwrap().to_vec(), vec![7; 12]);
}

#[test]
fn truncated_file_is_reported() {
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::progressive()).unwrap();
    let track = muxer.add_track(aac()).unwrap();
    muxer.write_sample(track, &[7; 12], 0, 0, true).unwrap();
    muxer.write_trailer().unwrap();

    let mut data = muxer.into_inner().into_inner();
    data.truncate(data.len() - 10);

    let mut demuxer = Demuxer::new(Cursor::new(data));
    assert!(demuxer.demux().unwrap_err().is_corrupt());
}

#[test]
fn faststart_keeps_samples_readable() {
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::progressive()).unwrap();
    let video = muxer.add_track(h264()).unwrap();
    let audio = muxer.add_track(aac()).unwrap();

    for i in 0..5u64 {
        muxer.write_sample(video, &payload(i), i * 40, i * 40, i == 0).unwrap();
        muxer.write_sample(audio, &payload(i + 20), i * 40, i * 40, true).unwrap();
    }

    let mut out = Cursor::new(Vec::new());
    muxer.rewrite_with_moov(&mut out).unwrap();

    let mut demuxer = demux(out.into_inner());
    let pairs: Vec<(u32, Sample)> = demuxer.samples_by_offset().collect();
    assert_eq!(pairs.len(), 10);

    for (n, (id, sample)) in pairs.into_iter().enumerate() {
        let i = n as u64 / 2;
        let expected = if id == video { payload(i) } else { payload(i + 20) };
        assert_eq!(demuxer.read_sample_data(&sample).unwrap().to_vec(), expected);
    }
}

#[test]
fn dash_segments_follow_the_init_segment() {
    let mut muxer = Muxer::new(Vec::new(), MuxerConfig::dash()).unwrap();
    let track = muxer.add_track(h264()).unwrap();

    let mut init = Vec::new();
    muxer.write_init_segment(&mut init).unwrap();

    for i in 0..6u64 {
        muxer.write_sample(track, &payload(i), i * 40, i * 40, i % 3 == 0).unwrap();
    }
    muxer.finish().unwrap();
    assert_eq!(muxer.config().mode, MuxMode::Dash);

    let segments = muxer.into_inner();
    assert_eq!(&segments[4..8], b"styp");

    let mut data = init;
    data.extend_from_slice(&segments);

    let mut demuxer = demux(data);
    let samples = demuxer.tracks()[0].samples.clone();
    assert_eq!(samples.len(), 6);
    assert_eq!(samples[3].dts, 120);
    assert_eq!(demuxer.read_sample_data(&samples[5]).unwrap().to_vec(), payload(5));
}

/// Sink that remembers small writes and drops large ones, so multi-gigabyte
/// files can be produced without holding their payload.
#[derive(Default)]
struct SparseSink {
    writes: Vec<(u64, Vec<u8>)>,
    position: u64,
    len: u64,
}

impl SparseSink {
    const KEEP: usize = 64 * 1024;
}

impl Write for SparseSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() <= Self::KEEP {
            self.writes.push((self.position, buf.to_vec()));
        }

        self.position += buf.len() as u64;
        self.len = self.len.max(self.position);

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for SparseSink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = (buf.len() as u64).min(self.len.saturating_sub(self.position)) as usize;
        let start = self.position;
        let end = start + len as u64;

        buf[..len].iter_mut().for_each(|b| *b = 0);
        for (offset, data) in &self.writes {
            let data_end = offset + data.len() as u64;
            if data_end <= start || *offset >= end {
                continue;
            }

            let from = start.max(*offset);
            let to = end.min(data_end);
            buf[(from - start) as usize..(to - start) as usize]
                .copy_from_slice(&data[(from - offset) as usize..(to - offset) as usize]);
        }

        self.position = end;

        Ok(len)
    }
}

impl Seek for SparseSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::End(d) => (self.len as i64 + d) as u64,
            SeekFrom::Current(d) => (self.position as i64 + d) as u64,
        };

        Ok(self.position)
    }
}

#[test]
fn oversized_mdat_gets_a_64_bit_header() {
    let mut muxer = Muxer::new(SparseSink::default(), MuxerConfig::progressive()).unwrap();
    let track = muxer.add_track(h264()).unwrap();

    let chunk = vec![0x5a; 1 << 20];
    let count = 4097u64;
    for i in 0..count {
        muxer.write_sample(track, &chunk, i * 40, i * 40, i % 25 == 0).unwrap();
    }

    let written: Vec<u64> = muxer.track(track).unwrap().samples.iter().map(|s| s.offset).collect();
    muxer.write_trailer().unwrap();

    let mut sink = muxer.into_inner();

    // ftyp is 32 bytes, the free box behind it gave up its space
    let mut header = [0u8; 16];
    sink.seek(SeekFrom::Start(32)).unwrap();
    sink.read_exact(&mut header).unwrap();
    assert_eq!(&header[..8], &[0, 0, 0, 1, b'm', b'd', b'a', b't']);
    assert_eq!(u64::from_be_bytes(header[8..].try_into().unwrap()), count * (1 << 20) + 16);

    sink.seek(SeekFrom::Start(0)).unwrap();
    let mut demuxer = Demuxer::new(sink);
    demuxer.demux().unwrap();

    let offsets: Vec<u64> = demuxer.tracks()[0].samples.iter().map(|s| s.offset).collect();
    assert_eq!(offsets, written);
    assert_eq!(offsets[0], 48);
    assert!(*offsets.last().unwrap() > u32::MAX as u64);
}
