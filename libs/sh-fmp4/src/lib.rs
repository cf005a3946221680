use bytes::Bytes;
use sh_media::{
    convert_bitstream, AudioCodecInfo, AudioCodecSpecificInfo, BitstreamFraming, ByteWriteFilter2,
    CodecInfo, CodecTypeInfo, Frame, FrameWriteFilter, Stream, VideoCodecSpecificInfo,
};
use sh_mp4::{CodecId, FragmentPolicy, Muxer, MuxerConfig, TrackConfig};

use std::collections::HashMap;

use tracing::*;

mod reader;
mod record;

pub use reader::*;
pub use record::*;

/// Duration given to the only sample of a snapshot, in timebase ticks.
const SNAPSHOT_DURATION: u64 = 1800;

/// Describes a stream as a muxer track. The timescale is the timebase
/// denominator of the stream.
pub fn track_config(stream: &Stream) -> anyhow::Result<TrackConfig> {
    let timescale = stream.timebase.denominator;

    let config = match &stream.codec.properties {
        CodecTypeInfo::Video(video) => {
            let codec = match video.extra {
                VideoCodecSpecificInfo::H264 { .. } => CodecId::H264,
                VideoCodecSpecificInfo::H265 { .. } => CodecId::H265,
            };

            TrackConfig::video(
                codec,
                video.width,
                video.height,
                video.decoder_configuration_record(),
            )
        }
        CodecTypeInfo::Audio(AudioCodecInfo {
            sample_rate,
            sample_bpp,
            sound_type,
            extra,
        }) => {
            let codec = match extra {
                AudioCodecSpecificInfo::Aac { .. } => CodecId::Aac,
                AudioCodecSpecificInfo::Opus { .. } => CodecId::Opus,
                AudioCodecSpecificInfo::Mp3 => CodecId::Mp3,
                AudioCodecSpecificInfo::G711A => CodecId::G711A,
                AudioCodecSpecificInfo::G711U => CodecId::G711U,
            };

            let mut config = TrackConfig::audio(
                codec,
                sound_type.channels(),
                *sample_rate,
                extra.decoder_specific_data().unwrap_or_default(),
            );
            if *sample_bpp > 0 {
                config.sample_size = *sample_bpp as u16;
            }

            config
        }
    };

    if timescale == 0 {
        anyhow::bail!("Stream {} has no timebase", stream.id);
    }

    Ok(config.with_timescale(timescale))
}

/// The inverse of [`track_config`], for tracks read back from a file.
pub fn stream_for_track(track: &sh_mp4::Track) -> Option<Stream> {
    use sh_media::{SoundType, VideoCodecInfo};
    use std::sync::Arc;

    let (name, properties) = match track.codec {
        CodecId::H264 => (
            "h264",
            CodecTypeInfo::Video(VideoCodecInfo::from_avc_record(
                track.width,
                track.height,
                &track.extra_data,
            )?),
        ),
        CodecId::H265 => (
            "hevc",
            CodecTypeInfo::Video(VideoCodecInfo {
                width: track.width,
                height: track.height,
                extra: VideoCodecSpecificInfo::H265 {
                    bitstream_format: BitstreamFraming::FourByteLength,
                    record: Arc::new(track.extra_data.clone()),
                },
            }),
        ),
        codec => {
            let (name, extra) = match codec {
                CodecId::Aac => (
                    "aac",
                    AudioCodecSpecificInfo::Aac {
                        extra: track.extra_data.clone(),
                    },
                ),
                CodecId::Opus => (
                    "opus",
                    AudioCodecSpecificInfo::Opus {
                        extra: track.extra_data.clone(),
                    },
                ),
                CodecId::Mp2 | CodecId::Mp3 => ("mp3", AudioCodecSpecificInfo::Mp3),
                CodecId::G711A => ("pcm_alaw", AudioCodecSpecificInfo::G711A),
                CodecId::G711U => ("pcm_mulaw", AudioCodecSpecificInfo::G711U),
                _ => return None,
            };

            (
                name,
                CodecTypeInfo::Audio(AudioCodecInfo {
                    sample_rate: track.sample_rate,
                    sample_bpp: track.sample_size as u32,
                    sound_type: SoundType::from_channels(track.channel_count),
                    extra,
                }),
            )
        }
    };

    Some(Stream {
        id: track.id,
        codec: Arc::new(CodecInfo { name, properties }),
        timebase: sh_media::Fraction::new(1, track.timescale),
    })
}

/// Frame payload as MP4 stores it, with length prefixed NAL units.
pub(crate) fn sample_payload(frame: &Frame) -> Bytes {
    match frame.stream.bitstream_format() {
        Some(source) => convert_bitstream(
            frame.buffer.clone(),
            source,
            BitstreamFraming::FourByteLength,
        ),
        None => frame.buffer.clone(),
    }
}

/// Builds a self-contained init segment and fragment holding one frame.
pub fn single_frame_fmp4(frame: Frame) -> anyhow::Result<Vec<u8>> {
    let mut muxer = Muxer::new(
        Vec::with_capacity(frame.buffer.len() + 1024),
        MuxerConfig {
            fragmentation: FragmentPolicy::Manual,
            ..MuxerConfig::fragmented()
        },
    )?;

    let track = muxer.add_track(track_config(&frame.stream)?)?;

    let payload = sample_payload(&frame);
    muxer.write_sample(track, &payload, 0, 0, true)?;
    muxer.flush_fragment_until(track, SNAPSHOT_DURATION)?;

    Ok(muxer.into_inner())
}

/// Turns frames into a fragmented MP4 byte stream. The init segment is sent
/// on start, then one buffer per finished fragment.
pub struct FragmentedMp4WriteFilter {
    target: Box<dyn ByteWriteFilter2 + Send + Unpin>,
    muxer: Option<Muxer<Vec<u8>>>,
    /// Stream id to track id.
    tracks: HashMap<u32, u32>,
    start_times: HashMap<u32, u64>,
}

impl FragmentedMp4WriteFilter {
    pub fn new(target: Box<dyn ByteWriteFilter2 + Send + Unpin>) -> Self {
        FragmentedMp4WriteFilter {
            target,
            muxer: None,
            tracks: HashMap::new(),
            start_times: HashMap::new(),
        }
    }

    /// Sends whatever the muxer produced since the last call.
    async fn forward(&mut self) -> anyhow::Result<()> {
        let muxer = match self.muxer.as_mut() {
            Some(muxer) => muxer,
            None => return Ok(()),
        };

        let bytes = std::mem::take(muxer.get_mut());
        if !bytes.is_empty() {
            self.target.write(Bytes::from(bytes)).await?;
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl FrameWriteFilter for FragmentedMp4WriteFilter {
    async fn start(&mut self, streams: Vec<Stream>) -> anyhow::Result<()> {
        self.target.start().await?;

        let mut muxer = Muxer::new(Vec::new(), MuxerConfig::fragmented())?;

        for stream in &streams {
            match track_config(stream).and_then(|config| Ok(muxer.add_track(config)?)) {
                Ok(track) => {
                    debug!("Muxing stream {} ({:?}) as track {}", stream.id, stream.codec, track);
                    self.tracks.insert(stream.id, track);
                }
                Err(e) => warn!("Skipping stream {}: {}", stream.id, e),
            }
        }

        if self.tracks.is_empty() {
            anyhow::bail!("No stream can be written to fragmented MP4");
        }

        muxer.write_header()?;
        self.muxer = Some(muxer);

        self.forward().await
    }

    async fn write(&mut self, frame: Frame) -> anyhow::Result<()> {
        let track = match self.tracks.get(&frame.stream.id) {
            Some(&track) => track,
            None => return Ok(()),
        };

        let dts = frame.time.decode_time();
        let start = *self.start_times.entry(frame.stream.id).or_insert(dts);

        let payload = sample_payload(&frame);
        if payload.is_empty() {
            trace!("Dropping empty frame on stream {}", frame.stream.id);
            return Ok(());
        }

        if let Some(muxer) = self.muxer.as_mut() {
            muxer.write_sample(
                track,
                &payload,
                dts.saturating_sub(start),
                frame.time.pts.saturating_sub(start),
                frame.is_keyframe(),
            )?;
        }

        self.forward().await
    }

    async fn finish(&mut self) -> anyhow::Result<()> {
        if let Some(muxer) = self.muxer.as_mut() {
            muxer.flush_fragment()?;
        }

        self.forward().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use sh_media::{
        AudioCodecInfo, ByteStreamWriteFilter, FrameDependency, MediaTime, SoundType,
        VideoCodecInfo,
    };
    use std::{sync::Arc, time::Instant};

    pub(crate) fn video_stream() -> Stream {
        Stream {
            id: 0,
            codec: Arc::new(CodecInfo {
                name: "h264",
                properties: CodecTypeInfo::Video(VideoCodecInfo {
                    width: 640,
                    height: 360,
                    extra: VideoCodecSpecificInfo::H264 {
                        bitstream_format: BitstreamFraming::FourByteStartCode,
                        profile_indication: 0x42,
                        profile_compatibility: 0,
                        level_indication: 0x1e,
                        sps: Arc::new(vec![0x67, 0x42, 0x00, 0x1e]),
                        pps: Arc::new(vec![0x68, 0xce, 0x38, 0x80]),
                    },
                }),
            }),
            timebase: sh_media::Fraction::new(1, 90000),
        }
    }

    pub(crate) fn audio_stream() -> Stream {
        Stream {
            id: 1,
            codec: Arc::new(CodecInfo {
                name: "aac",
                properties: CodecTypeInfo::Audio(AudioCodecInfo {
                    sample_rate: 48000,
                    sample_bpp: 16,
                    sound_type: SoundType::Stereo,
                    extra: AudioCodecSpecificInfo::Aac {
                        extra: vec![0x11, 0x90],
                    },
                }),
            }),
            timebase: sh_media::Fraction::new(1, 48000),
        }
    }

    pub(crate) fn frame(stream: &Stream, dts: u64, keyframe: bool, buffer: &'static [u8]) -> Frame {
        Frame {
            time: MediaTime {
                pts: dts,
                dts: Some(dts),
                timebase: stream.timebase,
            },
            dependency: if keyframe {
                FrameDependency::None
            } else {
                FrameDependency::Backwards
            },
            buffer: Bytes::from_static(buffer),
            stream: stream.clone(),
            received: Instant::now(),
        }
    }

    #[test]
    fn streams_map_to_tracks_and_back() {
        let config = track_config(&video_stream()).unwrap();
        assert_eq!(config.codec, CodecId::H264);
        assert_eq!(config.timescale, 90000);
        assert_eq!(&config.extra_data[..6], &[1, 0x42, 0, 0x1e, 0xff, 0xe1]);

        let track = sh_mp4::Track::new(1, config);
        let stream = stream_for_track(&track).unwrap();
        assert!(stream.is_video());
        assert_eq!(stream.timebase.denominator, 90000);
        assert_eq!(stream.bitstream_format(), Some(BitstreamFraming::FourByteLength));

        let config = track_config(&audio_stream()).unwrap();
        assert_eq!(config.codec, CodecId::Aac);
        assert_eq!(config.channel_count, 2);
        assert_eq!(config.extra_data, vec![0x11, 0x90]);
    }

    #[test]
    fn start_codes_become_length_prefixes() {
        let frame = frame(&video_stream(), 0, true, &[0, 0, 0, 1, 0x65, 0x88, 0x84]);
        assert_eq!(&sample_payload(&frame)[..], &[0, 0, 0, 3, 0x65, 0x88, 0x84]);
    }

    #[test]
    fn snapshot_is_a_complete_file() {
        let data = single_frame_fmp4(frame(&video_stream(), 0, true, &[0, 0, 0, 1, 0x65, 0x88])).unwrap();

        let mut demuxer = sh_mp4::Demuxer::new(std::io::Cursor::new(data));
        demuxer.demux().unwrap();

        let sample = demuxer.tracks()[0].samples[0];
        assert!(sample.keyframe);
        assert_eq!(demuxer.read_sample_data(&sample).unwrap().to_vec(), vec![0, 0, 0, 2, 0x65, 0x88]);
    }

    #[tokio::test]
    async fn fragments_are_forwarded() {
        let (target, rx) = ByteStreamWriteFilter::new();
        let mut filter = FragmentedMp4WriteFilter::new(Box::new(target));

        let video = video_stream();
        let audio = audio_stream();
        filter.start(vec![video.clone(), audio.clone()]).await.unwrap();

        let init = rx.recv().await.unwrap().unwrap();
        assert_eq!(&init[4..8], b"ftyp");

        filter.write(frame(&video, 0, true, &[0, 0, 0, 1, 0x65, 1])).await.unwrap();
        filter.write(frame(&audio, 0, true, &[0x21, 0x10])).await.unwrap();
        filter.write(frame(&video, 3600, false, &[0, 0, 0, 1, 0x41, 2])).await.unwrap();
        assert!(rx.is_empty());

        filter.write(frame(&video, 7200, true, &[0, 0, 0, 1, 0x65, 3])).await.unwrap();
        let fragment = rx.recv().await.unwrap().unwrap();
        assert_eq!(&fragment[4..8], b"moof");

        filter.finish().await.unwrap();
        let last = rx.recv().await.unwrap().unwrap();
        assert_eq!(&last[4..8], b"moof");

        let mut data = init.to_vec();
        data.extend_from_slice(&fragment);
        data.extend_from_slice(&last);

        let mut demuxer = sh_mp4::Demuxer::new(std::io::Cursor::new(data));
        demuxer.demux().unwrap();
        assert_eq!(demuxer.tracks()[0].samples.len(), 3);
        assert_eq!(demuxer.tracks()[1].samples.len(), 1);
        assert_eq!(demuxer.tracks()[0].samples[2].dts, 7200);
    }
}
