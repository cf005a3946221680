use async_channel::{Receiver, Sender};

use std::{fmt, sync::Arc, time::Instant};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::*;

mod bitstream_framer;
mod file_writer;

pub use bitstream_framer::*;
pub use file_writer::*;

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Fraction {
            numerator,
            denominator,
        }
    }

    pub fn simplify(&self) -> Fraction {
        use gcd::Gcd;

        let divisor = self.numerator.gcd(self.denominator).max(1);

        Fraction::new(self.numerator / divisor, self.denominator / divisor)
    }

    pub fn decimal(&self) -> f32 {
        self.numerator as f32 / self.denominator as f32
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl fmt::Debug for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Describes how H26x NAL units are framed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BitstreamFraming {
    /// NAL units are prefixed with a 4 byte length integer. Used by
    /// the 'AVC1' fourcc, mainly for storage in MP4 files.
    FourByteLength,

    TwoByteLength,

    /// NAL units are prefixed with a 4 byte start code '00 00 00 01'.
    FourByteStartCode,
}

impl BitstreamFraming {
    pub fn is_start_code(&self) -> bool {
        matches!(self, BitstreamFraming::FourByteStartCode)
    }
}

#[derive(Clone)]
pub enum VideoCodecSpecificInfo {
    H264 {
        bitstream_format: BitstreamFraming,
        profile_indication: u8,
        profile_compatibility: u8,
        level_indication: u8,
        sps: Arc<Vec<u8>>,
        pps: Arc<Vec<u8>>,
    },
    H265 {
        bitstream_format: BitstreamFraming,
        /// A complete `HEVCDecoderConfigurationRecord`.
        record: Arc<Vec<u8>>,
    },
}

#[derive(Clone)]
pub struct VideoCodecInfo {
    pub width: u32,
    pub height: u32,
    pub extra: VideoCodecSpecificInfo,
}

impl VideoCodecInfo {
    /// Parses the first SPS and PPS out of an `AVCDecoderConfigurationRecord`.
    pub fn from_avc_record(width: u32, height: u32, mut record: &[u8]) -> Option<Self> {
        if record.len() < 6 {
            return None;
        }

        let _version = record.get_u8();
        let profile_indication = record.get_u8();
        let profile_compatibility = record.get_u8();
        let level_indication = record.get_u8();
        let _length_size = record.get_u8();

        let sps_count = record.get_u8() & 0x1f;
        let sps = read_parameter_sets(&mut record, sps_count)?;

        if !record.has_remaining() {
            return None;
        }
        let pps_count = record.get_u8();
        let pps = read_parameter_sets(&mut record, pps_count)?;

        Some(VideoCodecInfo {
            width,
            height,
            extra: VideoCodecSpecificInfo::H264 {
                bitstream_format: BitstreamFraming::FourByteLength,
                profile_indication,
                profile_compatibility,
                level_indication,
                sps: Arc::new(sps.into_iter().next()?),
                pps: Arc::new(pps.into_iter().next()?),
            },
        })
    }

    pub fn parameter_sets(&self) -> Option<Vec<u8>> {
        match &self.extra {
            VideoCodecSpecificInfo::H264 { sps, pps, .. } => {
                let nuts = [sps.as_slice(), pps.as_slice()];

                Some(frame_nal_units(&nuts[..], BitstreamFraming::FourByteLength).to_vec())
            }
            VideoCodecSpecificInfo::H265 { .. } => None,
        }
    }

    /// The decoder configuration record stored in an `avcC` or `hvcC` box.
    pub fn decoder_configuration_record(&self) -> Vec<u8> {
        match &self.extra {
            VideoCodecSpecificInfo::H264 {
                profile_indication,
                profile_compatibility,
                level_indication,
                sps,
                pps,
                ..
            } => {
                let mut record = BytesMut::with_capacity(11 + sps.len() + pps.len());
                record.put_u8(1);
                record.put_u8(*profile_indication);
                record.put_u8(*profile_compatibility);
                record.put_u8(*level_indication);
                // 4 byte NAL lengths
                record.put_u8(0xff);
                record.put_u8(0xe1);
                record.put_u16(sps.len() as u16);
                record.put_slice(sps);
                record.put_u8(1);
                record.put_u16(pps.len() as u16);
                record.put_slice(pps);

                record.to_vec()
            }
            VideoCodecSpecificInfo::H265 { record, .. } => record.to_vec(),
        }
    }
}

fn read_parameter_sets(record: &mut &[u8], count: u8) -> Option<Vec<Vec<u8>>> {
    let mut sets = Vec::with_capacity(count as usize);

    for _ in 0..count {
        if record.remaining() < 2 {
            return None;
        }

        let len = record.get_u16() as usize;
        if record.remaining() < len {
            return None;
        }

        sets.push(record[..len].to_vec());
        record.advance(len);
    }

    Some(sets)
}

impl fmt::Debug for VideoCodecInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dar = Fraction::new(self.width, self.height).simplify();

        match &self.extra {
            VideoCodecSpecificInfo::H264 { sps, .. } => {
                use h264_reader::{nal::sps::SeqParameterSet, rbsp::decode_nal};

                let sps = sps
                    .get(1..)
                    .and_then(|body| SeqParameterSet::from_bytes(&decode_nal(body)).ok());

                match &sps {
                    Some(sps) => write!(
                        f,
                        "H264 ({:?}) {}x{}",
                        sps.profile(),
                        self.width,
                        self.height
                    )?,
                    None => write!(f, "H264 {}x{}", self.width, self.height)?,
                }

                write!(f, " [DAR {}:{}]", dar.numerator, dar.denominator)?;

                let frame_rate = sps.as_ref().and_then(|sps| {
                    sps.vui_parameters.as_ref().and_then(|vui| {
                        vui.timing_info
                            .as_ref()
                            .map(|t| Fraction::new(t.time_scale, t.num_units_in_tick))
                    })
                });

                if let Some(fps) = frame_rate.filter(|fps| fps.denominator != 0) {
                    write!(f, " {:.3} fps", fps.decimal())?;
                }

                Ok(())
            }
            VideoCodecSpecificInfo::H265 { .. } => write!(
                f,
                "H265 {}x{} [DAR {}:{}]",
                self.width, self.height, dar.numerator, dar.denominator
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AudioCodecSpecificInfo {
    Aac { extra: Vec<u8> },
    Opus { extra: Vec<u8> },
    Mp3,
    G711A,
    G711U,
}

impl AudioCodecSpecificInfo {
    pub fn decoder_specific_data(&self) -> Option<Vec<u8>> {
        match self {
            Self::Aac { extra } | Self::Opus { extra } => Some(extra.clone()),
            Self::Mp3 | Self::G711A | Self::G711U => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum SoundType {
    Mono,
    Stereo,
}

impl SoundType {
    pub fn from_channels(channels: u16) -> Self {
        if channels == 1 {
            SoundType::Mono
        } else {
            SoundType::Stereo
        }
    }

    pub fn channels(&self) -> u16 {
        match self {
            SoundType::Mono => 1,
            SoundType::Stereo => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AudioCodecInfo {
    pub sample_rate: u32,
    pub sample_bpp: u32,
    pub sound_type: SoundType,
    pub extra: AudioCodecSpecificInfo,
}

#[derive(Clone)]
pub enum CodecTypeInfo {
    Video(VideoCodecInfo),
    Audio(AudioCodecInfo),
}

impl fmt::Debug for CodecTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodecTypeInfo::Video(video) => write!(f, "{:?}", video),
            CodecTypeInfo::Audio(audio) => write!(f, "{:?}", audio),
        }
    }
}

#[derive(Clone)]
pub struct CodecInfo {
    pub name: &'static str,
    pub properties: CodecTypeInfo,
}

impl CodecInfo {
    pub fn video(&self) -> Option<&VideoCodecInfo> {
        if let CodecTypeInfo::Video(video) = &self.properties {
            Some(video)
        } else {
            None
        }
    }

    pub fn audio(&self) -> Option<&AudioCodecInfo> {
        if let CodecTypeInfo::Audio(audio) = &self.properties {
            Some(audio)
        } else {
            None
        }
    }
}

impl fmt::Debug for CodecInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.properties)
    }
}

#[derive(Debug, Clone)]
pub struct Stream {
    pub id: u32,
    pub codec: Arc<CodecInfo>,
    pub timebase: Fraction,
}

impl Stream {
    pub fn parameter_sets(&self) -> Option<Vec<u8>> {
        self.codec.video().and_then(|info| info.parameter_sets())
    }

    pub fn set_bitstream_format(&mut self, format: BitstreamFraming) {
        if let CodecTypeInfo::Video(VideoCodecInfo { extra, .. }) = &mut Arc::make_mut(&mut self.codec).properties {
            match extra {
                VideoCodecSpecificInfo::H264 {
                    bitstream_format, ..
                }
                | VideoCodecSpecificInfo::H265 {
                    bitstream_format, ..
                } => *bitstream_format = format,
            }
        }
    }

    pub fn bitstream_format(&self) -> Option<BitstreamFraming> {
        match &self.codec.video()?.extra {
            VideoCodecSpecificInfo::H264 {
                bitstream_format, ..
            }
            | VideoCodecSpecificInfo::H265 {
                bitstream_format, ..
            } => Some(*bitstream_format),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self.codec.properties, CodecTypeInfo::Video(_))
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.codec.properties, CodecTypeInfo::Audio(_))
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FrameDependency {
    None,
    Backwards,
    BiDirectional,
}

#[derive(Clone)]
pub struct Frame {
    pub time: MediaTime,
    pub dependency: FrameDependency,

    pub buffer: Bytes,
    pub stream: Stream,

    pub received: Instant,
}

impl Frame {
    pub fn is_keyframe(&self) -> bool {
        matches!(self.dependency, FrameDependency::None)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Frame")
            .field("time", &format_args!("{:?}", self.time))
            .field("dependency", &format_args!("{:?}", self.dependency))
            .field("buffer", &format_args!("[u8; {}]", self.buffer.len()))
            .field("stream", &format_args!("{:?}", self.stream))
            .finish()
    }
}

#[derive(Clone)]
pub struct MediaDuration {
    pub duration: i64,
    pub timebase: Fraction,
}

impl From<MediaDuration> for chrono::Duration {
    fn from(t: MediaDuration) -> chrono::Duration {
        chrono::Duration::nanoseconds(
            (1_000_000_000f64 * (t.duration as f64 / t.timebase.denominator as f64)) as i64,
        )
    }
}

impl From<MediaDuration> for std::time::Duration {
    fn from(t: MediaDuration) -> std::time::Duration {
        std::time::Duration::from_nanos(
            (1_000_000_000f64 * (t.duration as f64 / t.timebase.denominator as f64)).max(0.0) as u64,
        )
    }
}

#[derive(Clone)]
pub struct MediaTime {
    pub pts: u64,
    pub dts: Option<u64>,
    pub timebase: Fraction,
}

impl std::ops::Sub for &MediaTime {
    type Output = MediaDuration;

    fn sub(self, rhs: &MediaTime) -> Self::Output {
        self.since(rhs)
    }
}

impl fmt::Debug for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}pts ", self.pts)?;

        if let Some(dts) = self.dts {
            write!(f, "{}dts ", dts)?
        }

        write!(f, "{:?}base", self.timebase)?;

        Ok(())
    }
}

impl MediaTime {
    /// Decode time, falling back to the presentation time.
    pub fn decode_time(&self) -> u64 {
        self.dts.unwrap_or(self.pts)
    }

    pub fn since(&self, rhs: &MediaTime) -> MediaDuration {
        MediaDuration {
            duration: self.pts as i64 - rhs.pts as i64,
            timebase: self.timebase,
        }
    }

    pub fn in_base(&self, new_timebase: Fraction) -> MediaTime {
        let pts = convert_timebase(self.pts, self.timebase, new_timebase);
        let dts = self
            .dts
            .map(|ts| convert_timebase(ts, self.timebase, new_timebase));

        MediaTime {
            pts,
            dts,
            timebase: new_timebase,
        }
    }
}

fn convert_timebase(time: u64, original: Fraction, new: Fraction) -> u64 {
    let num = time as u128 * original.numerator as u128 * new.denominator as u128;
    let den = original.denominator as u128 * new.numerator as u128;

    if den == 0 {
        return time;
    }

    (num / den) as u64
}

pub struct FilterGraph {
    read: Box<dyn FrameReadFilter + Unpin + Send>,
    write: Box<dyn FrameWriteFilter + Unpin + Send>,
}

impl FilterGraph {
    pub fn new(
        read: Box<dyn FrameReadFilter + Unpin + Send>,
        write: Box<dyn FrameWriteFilter + Unpin + Send>,
    ) -> Self {
        Self { read, write }
    }

    /// Pumps frames from the reader to the writer until the reader runs dry.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let streams = self.read.start().await?;

        debug!("Starting filter graph with {} streams", streams.len());
        self.write.start(streams).await?;

        let mut frames = 0u64;
        while let Some(frame) = self.read.read().await? {
            self.write.write(frame).await?;
            frames += 1;
        }

        debug!("Filter graph ended after {} frames", frames);

        self.write.finish().await
    }
}

#[async_trait::async_trait]
pub trait FrameWriteFilter {
    async fn start(&mut self, streams: Vec<Stream>) -> anyhow::Result<()>;
    async fn write(&mut self, frame: Frame) -> anyhow::Result<()>;

    /// Called once after the last frame.
    async fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait FrameReadFilter {
    async fn start(&mut self) -> anyhow::Result<Vec<Stream>>;

    /// Next frame, or `None` at the end of the stream.
    async fn read(&mut self) -> anyhow::Result<Option<Frame>>;
}

#[async_trait::async_trait]
pub trait ByteWriteFilter2 {
    async fn start(&mut self) -> anyhow::Result<()>;
    async fn write(&mut self, bytes: bytes::Bytes) -> anyhow::Result<()>;
}

pub struct ByteStreamWriteFilter {
    tx: Sender<anyhow::Result<bytes::Bytes>>,
}

impl ByteStreamWriteFilter {
    pub fn new() -> (Self, Receiver<anyhow::Result<bytes::Bytes>>) {
        let (tx, rx) = async_channel::unbounded();

        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl ByteWriteFilter2 for ByteStreamWriteFilter {
    async fn start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn write(&mut self, data: bytes::Bytes) -> anyhow::Result<()> {
        self.tx.send(Ok(data)).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn con_test() {
        assert_eq!(
            1000,
            convert_timebase(500, Fraction::new(1, 500), Fraction::new(1, 1000))
        );
        assert_eq!(
            3600,
            convert_timebase(40, Fraction::new(1, 1000), Fraction::new(1, 90000))
        );
    }

    #[test]
    fn avc_record_round_trip() {
        let info = VideoCodecInfo {
            width: 1280,
            height: 720,
            extra: VideoCodecSpecificInfo::H264 {
                bitstream_format: BitstreamFraming::FourByteLength,
                profile_indication: 0x64,
                profile_compatibility: 0,
                level_indication: 0x1f,
                sps: Arc::new(vec![0x67, 0x64, 0x00, 0x1f]),
                pps: Arc::new(vec![0x68, 0xee, 0x3c, 0x80]),
            },
        };

        let record = info.decoder_configuration_record();
        assert_eq!(&record[..6], &[1, 0x64, 0, 0x1f, 0xff, 0xe1]);

        let parsed = VideoCodecInfo::from_avc_record(1280, 720, &record).unwrap();
        assert_eq!(parsed.decoder_configuration_record(), record);
        assert_eq!(
            parsed.parameter_sets().unwrap(),
            vec![0, 0, 0, 4, 0x67, 0x64, 0x00, 0x1f, 0, 0, 0, 4, 0x68, 0xee, 0x3c, 0x80]
        );
    }

    #[test]
    fn truncated_avc_record_is_rejected() {
        assert!(VideoCodecInfo::from_avc_record(1, 1, &[1, 0x64, 0, 0x1f, 0xff, 0xe1, 0, 9, 0x67]).is_none());
    }
}
