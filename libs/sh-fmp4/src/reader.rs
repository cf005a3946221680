use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::PathBuf,
    time::Instant,
};

use sh_media::{Frame, FrameDependency, FrameReadFilter, MediaTime, Stream};
use sh_mp4::Demuxer;

use tracing::*;

use crate::stream_for_track;

/// Reads the frames of an MP4 file in decode order across all tracks.
pub struct Mp4FileReadFilter {
    path: PathBuf,
    demuxer: Option<Demuxer<BufReader<File>>>,
    /// Track id to stream.
    streams: HashMap<u32, Stream>,
}

impl Mp4FileReadFilter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Mp4FileReadFilter {
            path: path.into(),
            demuxer: None,
            streams: HashMap::new(),
        }
    }

    /// Continues reading from the keyframe at or after `ms`.
    pub fn seek(&mut self, ms: u64) -> anyhow::Result<()> {
        let demuxer = match self.demuxer.as_mut() {
            Some(demuxer) => demuxer,
            None => anyhow::bail!("Reader is not started"),
        };

        let (track, sample) = demuxer.seek_time(ms)?;
        debug!("Seeked {} to track {} at dts {}", self.path.display(), track, sample.dts);

        Ok(())
    }
}

#[async_trait::async_trait]
impl FrameReadFilter for Mp4FileReadFilter {
    async fn start(&mut self) -> anyhow::Result<Vec<Stream>> {
        let path = self.path.clone();
        let demuxer = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            let mut demuxer = Demuxer::new(BufReader::new(File::open(path)?));
            demuxer.demux()?;

            Ok(demuxer)
        })
        .await??;

        let mut streams = Vec::new();
        for track in demuxer.tracks() {
            match stream_for_track(track) {
                Some(stream) => {
                    debug!(
                        "Track {} ({:?}) with {} samples",
                        track.id,
                        stream.codec,
                        track.samples.len()
                    );

                    self.streams.insert(track.id, stream.clone());
                    streams.push(stream);
                }
                None => warn!("Ignoring track {} with codec {:?}", track.id, track.codec),
            }
        }

        self.demuxer = Some(demuxer);

        Ok(streams)
    }

    async fn read(&mut self) -> anyhow::Result<Option<Frame>> {
        let demuxer = match self.demuxer.as_mut() {
            Some(demuxer) => demuxer,
            None => anyhow::bail!("Reader is not started"),
        };

        while let Some((track_id, sample)) = demuxer.next_sample() {
            let stream = match self.streams.get(&track_id) {
                Some(stream) => stream,
                None => continue,
            };

            let buffer = demuxer.read_sample_data(&sample)?;

            return Ok(Some(Frame {
                time: MediaTime {
                    pts: sample.pts,
                    dts: Some(sample.dts),
                    timebase: stream.timebase,
                },
                dependency: if sample.keyframe {
                    FrameDependency::None
                } else {
                    FrameDependency::Backwards
                },
                buffer,
                stream: stream.clone(),
                received: Instant::now(),
            }));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        tests::{audio_stream, frame, video_stream},
        Mp4RecordFilter, RecordConfig,
    };
    use sh_media::{FilterGraph, FrameWriteFilter};

    async fn recorded_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sh-fmp4-read-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("source.mp4");

        let video = video_stream();
        let audio = audio_stream();

        let mut recorder = Mp4RecordFilter::new(&path, RecordConfig::default());
        recorder.start(vec![video.clone(), audio.clone()]).await.unwrap();
        for i in 0..50u64 {
            recorder
                .write(frame(&video, i * 3600, i % 25 == 0, &[0, 0, 0, 1, 0x65, 0x88, 0x80]))
                .await
                .unwrap();
            recorder.write(frame(&audio, i * 1920, true, &[0x21, 0x10])).await.unwrap();
        }
        recorder.finish().await.unwrap();

        path
    }

    #[tokio::test]
    async fn frames_come_back_in_time_order() {
        let path = recorded_file("order").await;

        let mut reader = Mp4FileReadFilter::new(&path);
        let streams = reader.start().await.unwrap();
        assert_eq!(streams.len(), 2);
        assert!(streams[0].is_video());
        assert!(streams[1].is_audio());

        let mut count = 0;
        let mut last = 0f64;
        while let Some(frame) = reader.read().await.unwrap() {
            let seconds = frame.time.decode_time() as f64 / frame.time.timebase.denominator as f64;
            assert!(seconds >= last);
            last = seconds;
            count += 1;
        }
        assert_eq!(count, 100);
    }

    #[tokio::test]
    async fn seek_restarts_at_keyframe() {
        let path = recorded_file("seek").await;

        let mut reader = Mp4FileReadFilter::new(&path);
        reader.start().await.unwrap();
        reader.seek(500).unwrap();

        let frame = reader.read().await.unwrap().unwrap();
        assert!(frame.stream.is_video());
        assert!(frame.is_keyframe());
        assert_eq!(frame.time.decode_time(), 25 * 3600);
    }

    #[tokio::test]
    async fn graph_copies_a_recording() {
        let source = recorded_file("copy").await;
        let copy = source.with_file_name("copy.mp4");

        let mut graph = FilterGraph::new(
            Box::new(Mp4FileReadFilter::new(&source)),
            Box::new(Mp4RecordFilter::new(&copy, RecordConfig::default())),
        );
        graph.run().await.unwrap();

        let mut demuxer = Demuxer::new(File::open(&copy).unwrap());
        demuxer.demux().unwrap();
        assert_eq!(demuxer.tracks()[0].samples.len(), 50);
        assert_eq!(demuxer.tracks()[1].samples.len(), 50);
    }
}
