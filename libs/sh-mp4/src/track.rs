use four_cc::FourCC;

use tracing::debug;

use crate::{
    AudioSampleEntry, AvcConfigurationBox, CodecConfig, CodecId, DataEntryUrlBox,
    DataInformationBox, DataReferenceBox, EditBox, EditListBox, EditListEntry, EsDescriptorBox,
    Fragment, HandlerBox, HevcConfigurationBox, MediaBox, MediaHeader, MediaHeaderBox,
    MediaInformationBox, Mp4BoxError, OpusSpecificBox, Result, Sample, SampleDescriptionBox,
    SampleEncryptionEntry, SampleEntry, SampleTable, SampleTableBox, SeigSampleGroupEntry,
    SoundMediaHeaderBox, TrackBox, TrackEncryptionBox, TrackExtendsBox, TrackHeaderBox,
    TrackHeaderFlags, VideoMediaHeaderBox, VisualSampleEntry, LANGUAGE_UNDETERMINED,
};

/// Timescale of `mvhd`, `tkhd` and `elst` durations in written files.
pub const MOVIE_TIMESCALE: u32 = 1000;

pub const DEFAULT_TIMESCALE: u32 = 1000;

/// Everything needed to describe a new track to the muxer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackConfig {
    pub codec: CodecId,
    pub timescale: u32,
    /// SPS/PPS record, VPS record, AudioSpecificConfig or OpusHead.
    pub extra_data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub sample_size: u16,
}

impl TrackConfig {
    pub fn video(codec: CodecId, width: u32, height: u32, extra_data: Vec<u8>) -> Self {
        TrackConfig {
            codec,
            timescale: DEFAULT_TIMESCALE,
            extra_data,
            width,
            height,
            channel_count: 0,
            sample_rate: 0,
            sample_size: 0,
        }
    }

    pub fn audio(codec: CodecId, channel_count: u16, sample_rate: u32, extra_data: Vec<u8>) -> Self {
        TrackConfig {
            codec,
            timescale: DEFAULT_TIMESCALE,
            extra_data,
            width: 0,
            height: 0,
            channel_count,
            sample_rate,
            sample_size: 16,
        }
    }

    pub fn with_timescale(mut self, timescale: u32) -> Self {
        self.timescale = timescale;
        self
    }
}

/// One elementary stream of a file, owned by a single demuxer or muxer.
#[derive(Debug, Clone)]
pub struct Track {
    /// 1-based.
    pub id: u32,
    pub codec: CodecId,
    pub timescale: u32,
    /// In track timescale.
    pub duration: u64,
    pub width: u32,
    pub height: u32,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub sample_size: u16,
    pub extra_data: Vec<u8>,
    pub samples: Vec<Sample>,
    /// Every `moof` this track took part in, oldest first.
    pub fragments: Vec<Fragment>,

    /// The entry read from `stsd`, reused verbatim when the track is
    /// written again.
    pub(crate) sample_entry: Option<SampleEntry>,
    pub(crate) edit_list: Option<EditListBox>,
    pub(crate) table: SampleTable,
    pub(crate) trex: Option<TrackExtendsBox>,
    pub(crate) encryption: Vec<SampleEncryptionEntry>,
    pub(crate) seig: Option<SeigSampleGroupEntry>,
    last_dts: Option<u64>,
}

impl Track {
    pub fn new(id: u32, config: TrackConfig) -> Self {
        Track {
            id,
            codec: config.codec,
            timescale: config.timescale,
            duration: 0,
            width: config.width,
            height: config.height,
            channel_count: config.channel_count,
            sample_rate: config.sample_rate,
            sample_size: config.sample_size,
            extra_data: config.extra_data,
            samples: Vec::new(),
            fragments: Vec::new(),
            sample_entry: None,
            edit_list: None,
            table: SampleTable::default(),
            trex: None,
            encryption: Vec::new(),
            seig: None,
            last_dts: None,
        }
    }

    /// The parameters needed to add an equivalent track to a muxer.
    pub fn config(&self) -> TrackConfig {
        TrackConfig {
            codec: self.codec,
            timescale: self.timescale,
            extra_data: self.extra_data.clone(),
            width: self.width,
            height: self.height,
            channel_count: self.channel_count,
            sample_rate: self.sample_rate,
            sample_size: self.sample_size,
        }
    }

    /// A track opened by a `trak` box, filled in as its children are read.
    pub(crate) fn unresolved() -> Self {
        Track::new(0, TrackConfig::video(CodecId::Unknown(FourCC([0; 4])), 0, 0, Vec::new()))
    }

    pub fn is_video(&self) -> bool {
        self.codec.is_video()
    }

    pub fn is_audio(&self) -> bool {
        self.codec.is_audio()
    }

    /// Converts a time in this track's timescale to milliseconds.
    pub fn to_millis(&self, time: u64) -> u64 {
        rescale(time, self.timescale, 1000)
    }

    pub fn start_dts_ms(&self) -> Option<u64> {
        self.samples.first().map(|s| self.to_millis(s.dts))
    }

    pub fn end_dts_ms(&self) -> Option<u64> {
        self.samples.last().map(|s| self.to_millis(s.dts))
    }

    /// The keyframes of the track, for building seek indexes.
    pub fn sync_samples(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.samples.iter().filter(|s| s.keyframe)
    }

    /// Index of the first sample at or after `ms`. Video tracks only stop
    /// on keyframes.
    pub fn seek(&self, ms: u64) -> Option<usize> {
        let video = self.is_video();

        self.samples
            .iter()
            .position(|s| self.to_millis(s.dts) >= ms && (!video || s.keyframe))
    }

    /// Extends the track duration by the gap to `dts`. A decode time that
    /// goes backwards counts as one tick.
    pub(crate) fn extend_duration(&mut self, dts: u64) {
        if let Some(last) = self.last_dts {
            self.duration += if dts >= last { dts - last } else { 1 };
        }

        self.last_dts = Some(dts);
    }

    pub(crate) fn last_dts(&self) -> Option<u64> {
        self.last_dts
    }

    /// Duration in [`MOVIE_TIMESCALE`] units.
    pub fn movie_duration(&self) -> u64 {
        rescale(self.duration, self.timescale, MOVIE_TIMESCALE)
    }

    /// Takes over codec parameters from the first entry of a `stsd`.
    pub(crate) fn set_sample_description(&mut self, stsd: SampleDescriptionBox) -> Result<()> {
        let entry = match stsd.entries.into_iter().next() {
            Some(entry) => entry,
            None => return Ok(()),
        };

        self.codec = entry.codec();
        if let CodecId::Unknown(format) = self.codec {
            debug!("Track {} uses unknown sample entry {:?}", self.id, format);
        }

        if let Some(config) = entry.config() {
            self.extra_data = config.extra_data()?;
        }

        match &entry {
            SampleEntry::Visual(visual) => {
                self.width = visual.width as u32;
                self.height = visual.height as u32;
            }
            SampleEntry::Audio(audio) => {
                self.channel_count = audio.channel_count;
                self.sample_rate = audio.sample_rate;
                self.sample_size = audio.sample_size;
            }
            SampleEntry::Unknown { .. } => {}
        }

        self.sample_entry = Some(entry);

        Ok(())
    }

    /// Default protection parameters from the entry's `sinf/schi/tenc`.
    pub fn track_encryption(&self) -> Option<&TrackEncryptionBox> {
        let sinf = match self.sample_entry.as_ref()? {
            SampleEntry::Visual(visual) => visual.sinf.as_ref(),
            SampleEntry::Audio(audio) => audio.sinf.as_ref(),
            SampleEntry::Unknown { .. } => None,
        };

        sinf?.tenc.as_ref()
    }

    /// Materializes the sample list from the tables read out of `stbl`,
    /// starting at the leading empty edit if there is one.
    pub(crate) fn expand_table(&mut self, movie_timescale: u32) -> Result<()> {
        let first_dts = self
            .edit_list
            .as_ref()
            .and_then(|elst| elst.empty_duration())
            .map(|duration| rescale(duration, movie_timescale, self.timescale))
            .unwrap_or(0);

        self.samples = self.table.expand(first_dts)?;

        Ok(())
    }

    pub fn sample_entry(&self) -> Result<SampleEntry> {
        if let Some(entry) = &self.sample_entry {
            return Ok(entry.clone());
        }

        let format = self
            .codec
            .sample_entry_type()
            .ok_or(Mp4BoxError::UnsupportedCodec(self.codec))?;

        let config = match self.codec {
            CodecId::H264 => Some(CodecConfig::Avc(AvcConfigurationBox {
                config: self.extra_data.clone(),
            })),
            CodecId::H265 => Some(CodecConfig::Hevc(HevcConfigurationBox {
                config: self.extra_data.clone(),
            })),
            CodecId::Aac | CodecId::Mp2 | CodecId::Mp3 => Some(CodecConfig::Esds(EsDescriptorBox::new(
                self.id as u16,
                self.codec,
                self.extra_data.clone(),
            )?)),
            CodecId::Opus => Some(CodecConfig::Opus(self.opus_config()?)),
            CodecId::G711A | CodecId::G711U => None,
            CodecId::Unknown(_) => return Err(Mp4BoxError::UnsupportedCodec(self.codec)),
        };

        let entry = if self.is_video() {
            SampleEntry::Visual(VisualSampleEntry {
                format,
                data_reference_index: 1,
                width: self.width as u16,
                height: self.height as u16,
                config,
                sinf: None,
            })
        } else {
            SampleEntry::Audio(AudioSampleEntry {
                format,
                data_reference_index: 1,
                version: 0,
                channel_count: self.channel_count,
                sample_size: self.sample_size,
                sample_rate: self.sample_rate,
                quicktime_extension: Vec::new(),
                config,
                sinf: None,
            })
        };

        Ok(entry)
    }

    fn opus_config(&self) -> Result<OpusSpecificBox> {
        if !self.extra_data.is_empty() {
            return OpusSpecificBox::from_opus_head(&self.extra_data);
        }

        Ok(OpusSpecificBox {
            version: 0,
            output_channel_count: self.channel_count as u8,
            pre_skip: 0,
            input_sample_rate: self.sample_rate,
            output_gain: 0,
            channel_mapping_family: 0,
            channel_mapping_table: None,
        })
    }

    /// Builds the `trak` for this track around `table`. Fragmented files
    /// pass an empty table and no edit list.
    pub fn trak(&self, table: SampleTable, with_edit_list: bool) -> Result<TrackBox> {
        let handler_type = self
            .codec
            .handler_type()
            .ok_or(Mp4BoxError::UnsupportedCodec(self.codec))?;
        let video = self.is_video();

        let tkhd = TrackHeaderBox {
            flags: TrackHeaderFlags::ENABLED | TrackHeaderFlags::IN_MOVIE,
            creation_time: 0,
            modification_time: 0,
            track_id: self.id,
            duration: self.movie_duration(),
            alternate_group: 0,
            volume: if video { 0 } else { 0x0100 },
            width: if video { self.width << 16 } else { 0 },
            height: if video { self.height << 16 } else { 0 },
        };

        let edts = match self.samples.first() {
            Some(first) if with_edit_list => {
                let mut entries = Vec::with_capacity(2);

                // a late first sample is delayed by an empty edit, rounded to movie ticks
                let delay = rescale(first.dts, self.timescale, MOVIE_TIMESCALE);
                if delay > 0 {
                    entries.push(EditListEntry {
                        segment_duration: delay,
                        media_time: -1,
                        media_rate_integer: 1,
                        media_rate_fraction: 0,
                    });
                }

                entries.push(EditListEntry {
                    segment_duration: self.movie_duration(),
                    media_time: 0,
                    media_rate_integer: 1,
                    media_rate_fraction: 0,
                });

                Some(EditBox {
                    elst: EditListBox { entries },
                })
            }
            _ => None,
        };

        let media_header = if video {
            MediaHeader::Video(VideoMediaHeaderBox {})
        } else {
            MediaHeader::Sound(SoundMediaHeaderBox::default())
        };

        Ok(TrackBox {
            tkhd,
            edts,
            mdia: MediaBox {
                mdhd: MediaHeaderBox {
                    creation_time: 0,
                    modification_time: 0,
                    timescale: self.timescale,
                    duration: self.duration,
                    language: LANGUAGE_UNDETERMINED,
                },
                hdlr: HandlerBox {
                    handler_type,
                    name: self.codec.handler_name().to_string(),
                },
                minf: MediaInformationBox {
                    media_header: Some(media_header),
                    dinf: DataInformationBox {
                        dref: DataReferenceBox {
                            entries: vec![DataEntryUrlBox::self_contained()],
                        },
                    },
                    stbl: SampleTableBox {
                        stsd: SampleDescriptionBox {
                            entries: vec![self.sample_entry()?],
                        },
                        table,
                    },
                },
            },
        })
    }

    pub fn trex(&self) -> TrackExtendsBox {
        TrackExtendsBox::new(self.id)
    }
}

/// Converts `value` from one timescale to another, rounding down.
pub(crate) fn rescale(value: u64, from: u32, to: u32) -> u64 {
    if from == 0 || from == to {
        return value;
    }

    (value as u128 * to as u128 / from as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_track() -> Track {
        let mut track = Track::new(
            1,
            TrackConfig::video(CodecId::H264, 1280, 720, vec![1, 2, 3]).with_timescale(90000),
        );

        for i in 0..6u64 {
            track.samples.push(Sample {
                dts: i * 3600,
                pts: i * 3600,
                size: 10,
                offset: 48 + i * 10,
                keyframe: i % 3 == 0,
            });
        }

        track
    }

    #[test]
    fn seek_lands_on_keyframes_for_video() {
        let track = video_track();

        // samples sit at 0, 40, 80, 120, 160 and 200 ms
        assert_eq!(track.seek(0), Some(0));
        assert_eq!(track.seek(1), Some(3));
        assert_eq!(track.seek(120), Some(3));
        assert_eq!(track.seek(121), None);
        assert_eq!(track.sync_samples().count(), 2);
        assert_eq!(track.end_dts_ms(), Some(200));
    }

    #[test]
    fn seek_takes_any_audio_sample() {
        let mut track = video_track();
        track.codec = CodecId::Aac;
        track.samples.iter_mut().for_each(|s| s.keyframe = false);

        assert_eq!(track.seek(41), Some(2));
    }

    #[test]
    fn backwards_dts_counts_one_tick() {
        let mut track = Track::new(1, TrackConfig::audio(CodecId::Aac, 2, 48000, Vec::new()));

        track.extend_duration(0);
        track.extend_duration(1024);
        track.extend_duration(1000);
        track.extend_duration(2048);

        assert_eq!(track.duration, 1024 + 1 + 1048);
    }

    #[test]
    fn unknown_codec_is_unsupported() {
        let track = Track::new(
            1,
            TrackConfig::video(CodecId::Unknown(FourCC(*b"vp09")), 640, 480, Vec::new()),
        );

        assert!(matches!(
            track.sample_entry(),
            Err(Mp4BoxError::UnsupportedCodec(CodecId::Unknown(_)))
        ));
        assert!(matches!(
            track.trak(SampleTable::default(), false),
            Err(Mp4BoxError::UnsupportedCodec(_))
        ));
    }

    #[test]
    fn trak_headers() {
        let mut track = video_track();
        track.duration = 90000 * 3;

        let trak = track.trak(SampleTable::default(), true).unwrap();
        assert_eq!(trak.tkhd.duration, 3000);
        assert_eq!(trak.tkhd.width, 1280 << 16);
        assert_eq!(trak.tkhd.volume, 0);
        assert_eq!(trak.mdia.mdhd.timescale, 90000);
        assert_eq!(trak.mdia.mdhd.duration, 90000 * 3);
        assert_eq!(trak.edts.unwrap().elst.entries[0].segment_duration, 3000);

        let audio = Track::new(2, TrackConfig::audio(CodecId::G711A, 1, 8000, Vec::new()));
        let trak = audio.trak(SampleTable::default(), true).unwrap();
        assert_eq!(trak.tkhd.volume, 0x0100);
        assert_eq!(trak.tkhd.width, 0);
        assert!(trak.edts.is_none());
        assert_eq!(trak.mdia.hdlr.handler_type, FourCC(*b"soun"));
    }

    #[test]
    fn sample_description_round_trip() {
        let written = Track::new(
            3,
            TrackConfig::audio(CodecId::Aac, 2, 44100, vec![0x12, 0x10]).with_timescale(44100),
        );

        let mut read = Track::unresolved();
        read.set_sample_description(SampleDescriptionBox {
            entries: vec![written.sample_entry().unwrap()],
        })
        .unwrap();

        assert_eq!(read.codec, CodecId::Aac);
        assert_eq!(read.extra_data, vec![0x12, 0x10]);
        assert_eq!(read.channel_count, 2);
        assert_eq!(read.sample_rate, 44100);
    }

    #[test]
    fn opus_without_head_gets_defaults() {
        let track = Track::new(1, TrackConfig::audio(CodecId::Opus, 2, 48000, Vec::new()));

        match track.sample_entry().unwrap().config() {
            Some(CodecConfig::Opus(dops)) => {
                assert_eq!(dops.output_channel_count, 2);
                assert_eq!(dops.input_sample_rate, 48000);
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn empty_edit_seeds_first_dts() {
        let mut track = video_track();
        track.table = SampleTable::build(&track.samples, true).unwrap();
        track.edit_list = Some(EditListBox {
            entries: vec![EditListEntry {
                segment_duration: 500,
                media_time: -1,
                media_rate_integer: 1,
                media_rate_fraction: 0,
            }],
        });

        track.expand_table(1000).unwrap();
        assert_eq!(track.samples[0].dts, 45000);
        assert_eq!(track.samples[1].dts, 48600);
    }

    #[test]
    fn late_start_gets_an_empty_edit() {
        let mut track = video_track();
        let entries = |track: &Track| track.trak(SampleTable::default(), true).unwrap().edts.unwrap().elst.entries;

        assert_eq!(entries(&track).len(), 1);
        assert_eq!(entries(&track)[0].media_time, 0);

        track.samples.iter_mut().for_each(|s| s.dts += 9000);
        let late = entries(&track);
        assert_eq!(late.len(), 2);
        assert_eq!((late[0].media_time, late[0].segment_duration), (-1, 100));
        assert_eq!(late[1].media_time, 0);
        assert_eq!(track.trak(SampleTable::default(), false).unwrap().edts, None);
    }

    #[test]
    fn rescale_rounds_down() {
        assert_eq!(rescale(2700, 90000, 1000), 30);
        assert_eq!(rescale(1, 3, 1000), 333);
        assert_eq!(rescale(5, 0, 1000), 5);
    }
}
