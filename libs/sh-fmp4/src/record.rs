use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::BufWriter,
    path::{Path, PathBuf},
    time::Duration,
};

use sh_media::{Frame, FrameWriteFilter, MediaDuration, MediaTime, Stream};
use sh_mp4::{Muxer, MuxerConfig};

use tracing::*;

use crate::{sample_payload, track_config};

#[derive(Debug, Clone, Default)]
pub struct RecordConfig {
    /// Start a new numbered file at the first keyframe after this much media
    /// time. `None` records a single file.
    pub fragment: Option<Duration>,
    /// Rewrite finished files with `moov` ahead of the media data.
    pub faststart: bool,
}

struct Recording {
    path: PathBuf,
    muxer: Muxer<File>,
    /// Stream id to track id.
    tracks: HashMap<u32, u32>,
    start_times: HashMap<u32, u64>,
    /// Time of the keyframe that opened this file.
    opened_at: Option<MediaTime>,
}

/// Records frames into progressive MP4 files.
pub struct Mp4RecordFilter {
    path: PathBuf,
    config: RecordConfig,
    streams: Vec<Stream>,
    current: Option<Recording>,
    written: Vec<PathBuf>,
}

impl Mp4RecordFilter {
    pub fn new<P: Into<PathBuf>>(path: P, config: RecordConfig) -> Self {
        Mp4RecordFilter {
            path: path.into(),
            config,
            streams: Vec::new(),
            current: None,
            written: Vec::new(),
        }
    }

    /// Every file finished so far.
    pub fn written_files(&self) -> &[PathBuf] {
        &self.written
    }

    fn next_path(&self) -> PathBuf {
        if self.config.fragment.is_none() {
            return self.path.clone();
        }

        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = self
            .path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("mp4"));

        self.path
            .with_file_name(format!("{}-{:03}.{}", stem, self.written.len(), extension))
    }

    fn open(&mut self) -> anyhow::Result<()> {
        let path = self.next_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut muxer = Muxer::new(file, MuxerConfig::progressive())?;

        let mut tracks = HashMap::new();
        for stream in &self.streams {
            let config = match track_config(stream) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Not recording stream {}: {}", stream.id, e);
                    continue;
                }
            };

            match muxer.add_track(config) {
                Ok(track) => {
                    tracks.insert(stream.id, track);
                }
                Err(e) => warn!("Not recording stream {}: {}", stream.id, e),
            }
        }

        if tracks.is_empty() {
            anyhow::bail!("No stream can be recorded to MP4");
        }

        info!("Recording to {}", path.display());

        self.current = Some(Recording {
            path,
            muxer,
            tracks,
            start_times: HashMap::new(),
            opened_at: None,
        });

        Ok(())
    }

    /// Finishes the open file, if any.
    async fn close(&mut self) -> anyhow::Result<()> {
        let recording = match self.current.take() {
            Some(recording) => recording,
            None => return Ok(()),
        };

        let faststart = self.config.faststart;
        let path = recording.path.clone();

        tokio::task::spawn_blocking(move || finish_recording(recording, faststart)).await??;

        info!("Finished recording {}", path.display());
        self.written.push(path);

        Ok(())
    }

    /// Keyframes of the video stream, or of any stream when there is no
    /// video.
    fn is_split_point(&self, frame: &Frame) -> bool {
        frame.is_keyframe() && (frame.stream.is_video() || !self.streams.iter().any(|s| s.is_video()))
    }

    fn should_split(&self, frame: &Frame) -> bool {
        let (limit, recording) = match (self.config.fragment, &self.current) {
            (Some(limit), Some(recording)) => (limit, recording),
            _ => return false,
        };

        if !self.is_split_point(frame) {
            return false;
        }

        match &recording.opened_at {
            Some(opened_at) => {
                let elapsed = MediaDuration {
                    duration: frame.time.decode_time() as i64 - opened_at.decode_time() as i64,
                    timebase: frame.time.timebase,
                };

                Duration::from(elapsed) >= limit
            }
            None => false,
        }
    }
}

fn finish_recording(mut recording: Recording, faststart: bool) -> anyhow::Result<()> {
    if !faststart {
        recording.muxer.write_trailer()?;
        return Ok(());
    }

    let temporary = temporary_path(&recording.path);
    let mut dest = BufWriter::new(File::create(&temporary)?);

    recording.muxer.rewrite_with_moov(&mut dest)?;
    drop(dest);
    drop(recording.muxer);

    std::fs::rename(&temporary, &recording.path)?;

    Ok(())
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");

    path.with_file_name(name)
}

#[async_trait::async_trait]
impl FrameWriteFilter for Mp4RecordFilter {
    async fn start(&mut self, streams: Vec<Stream>) -> anyhow::Result<()> {
        self.streams = streams;
        self.open()
    }

    async fn write(&mut self, frame: Frame) -> anyhow::Result<()> {
        if self.should_split(&frame) {
            self.close().await?;
            self.open()?;
        }

        let split_point = self.is_split_point(&frame);
        let recording = match self.current.as_mut() {
            Some(recording) => recording,
            None => anyhow::bail!("Recorder is not started"),
        };

        let track = match recording.tracks.get(&frame.stream.id) {
            Some(&track) => track,
            None => return Ok(()),
        };

        let payload = sample_payload(&frame);
        if payload.is_empty() {
            return Ok(());
        }

        let dts = frame.time.decode_time();
        let start = *recording.start_times.entry(frame.stream.id).or_insert(dts);

        if recording.opened_at.is_none() && split_point {
            recording.opened_at = Some(frame.time.clone());
        }

        recording.muxer.write_sample(
            track,
            &payload,
            dts.saturating_sub(start),
            frame.time.pts.saturating_sub(start),
            frame.is_keyframe(),
        )?;

        Ok(())
    }

    async fn finish(&mut self) -> anyhow::Result<()> {
        self.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{audio_stream, frame, video_stream};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sh-fmp4-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn demux(path: &Path) -> sh_mp4::Demuxer<File> {
        let mut demuxer = sh_mp4::Demuxer::new(File::open(path).unwrap());
        demuxer.demux().unwrap();
        demuxer
    }

    async fn record(filter: &mut Mp4RecordFilter, seconds: u64) {
        let video = video_stream();
        let audio = audio_stream();
        filter.start(vec![video.clone(), audio.clone()]).await.unwrap();

        // 25 fps video with a keyframe every second, 48 kHz audio
        for i in 0..seconds * 25 {
            let keyframe = i % 25 == 0;
            filter
                .write(frame(&video, i * 3600, keyframe, &[0, 0, 0, 1, 0x65, 0x88, 0x80]))
                .await
                .unwrap();
            filter.write(frame(&audio, i * 1920, true, &[0x21, 0x10, 0x04])).await.unwrap();
        }

        filter.finish().await.unwrap();
    }

    #[tokio::test]
    async fn records_one_progressive_file() {
        let path = scratch_dir("single").join("out.mp4");
        let mut filter = Mp4RecordFilter::new(&path, RecordConfig::default());
        record(&mut filter, 2).await;

        assert_eq!(filter.written_files(), &[path.clone()]);

        let mut demuxer = demux(&path);
        assert_eq!(demuxer.tracks().len(), 2);
        assert_eq!(demuxer.tracks()[0].samples.len(), 50);
        assert_eq!(demuxer.tracks()[0].sync_samples().count(), 2);

        let sample = demuxer.tracks()[0].samples[0];
        assert_eq!(demuxer.read_sample_data(&sample).unwrap().to_vec(), vec![0, 0, 0, 3, 0x65, 0x88, 0x80]);
    }

    #[tokio::test]
    async fn faststart_moves_moov_forward() {
        let path = scratch_dir("faststart").join("out.mp4");
        let config = RecordConfig {
            faststart: true,
            ..Default::default()
        };
        let mut filter = Mp4RecordFilter::new(&path, config);
        record(&mut filter, 1).await;

        let data = std::fs::read(&path).unwrap();
        let moov = data.windows(4).position(|w| w == b"moov").unwrap();
        let mdat = data.windows(4).position(|w| w == b"mdat").unwrap();
        assert!(moov < mdat);
        assert!(!temporary_path(&path).exists());

        let mut demuxer = demux(&path);
        let sample = demuxer.tracks()[1].samples[3];
        assert_eq!(demuxer.read_sample_data(&sample).unwrap().to_vec(), vec![0x21, 0x10, 0x04]);
    }

    #[tokio::test]
    async fn splits_at_keyframes() {
        let dir = scratch_dir("split");
        let config = RecordConfig {
            fragment: Some(Duration::from_secs(1)),
            faststart: false,
        };
        let mut filter = Mp4RecordFilter::new(dir.join("rec.mp4"), config);
        record(&mut filter, 3).await;

        let files = filter.written_files().to_vec();
        assert_eq!(
            files,
            vec![dir.join("rec-000.mp4"), dir.join("rec-001.mp4"), dir.join("rec-002.mp4")]
        );

        for file in &files {
            let demuxer = demux(file);
            let video = &demuxer.tracks()[0];
            assert_eq!(video.samples.len(), 25);
            assert_eq!(video.samples[0].dts, 0);
            assert!(video.samples[0].keyframe);
        }
    }
}
