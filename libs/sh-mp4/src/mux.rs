use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, WriteBytesExt};
use bytes::BytesMut;
use four_cc::FourCC;

use tracing::{debug, trace};

use crate::{
    fragment::{self, PendingFragment},
    BoxHeader, FileTypeBox, FragmentInfo, FragmentTrackInfo, FreeSpaceBox, Mp4Box, Mp4BoxError,
    MovieBox, MovieExtendsBox, MovieFragmentBox, MovieFragmentHeaderBox,
    MovieFragmentRandomAccessBox, MovieHeaderBox, Result, Sample, SampleTable, SegmentIndexBox,
    SegmentTypeBox, Track, TrackConfig, FREE, MDAT, MOVIE_TIMESCALE,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MuxMode {
    /// `ftyp`, `free`, `mdat`, then `moov` once every sample is known.
    #[default]
    Progressive,
    /// `ftyp` and `moov` up front, then `moof`+`mdat` pairs and a closing `mfra`.
    Fragmented,
    /// `styp`, `sidx`, `moof` and `mdat` per segment. The init segment is
    /// written separately.
    Dash,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum FragmentPolicy {
    /// Start a new fragment at every video keyframe, or at every keyframe
    /// when there is no video track.
    #[default]
    Keyframe,
    /// Only [`Muxer::flush_fragment`] ends a fragment.
    Manual,
}

#[derive(Debug, Clone, Default)]
pub struct MuxerConfig {
    pub mode: MuxMode,
    pub fragmentation: FragmentPolicy,
    /// Payload bytes of the `free` box written ahead of a progressive
    /// `mdat`. The box and the `mdat` header together always leave room for
    /// a 64-bit `mdat` header, so values between 1 and 7 are raised to 8.
    pub free_reserve: u32,
}

impl MuxerConfig {
    pub fn progressive() -> Self {
        MuxerConfig::default()
    }

    pub fn fragmented() -> Self {
        MuxerConfig {
            mode: MuxMode::Fragmented,
            ..Default::default()
        }
    }

    pub fn dash() -> Self {
        MuxerConfig {
            mode: MuxMode::Dash,
            ..Default::default()
        }
    }
}

struct MuxTrack {
    track: Track,
    pending: PendingFragment,
}

type FragmentCallback = Box<dyn FnMut(&FragmentInfo) + Send>;

/// Writes samples of one or more tracks into an MP4 byte stream.
pub struct Muxer<W> {
    writer: W,
    config: MuxerConfig,
    tracks: Vec<MuxTrack>,
    /// Bytes written so far.
    position: u64,
    free_offset: u64,
    /// Start of the progressive `mdat` payload.
    mdat_offset: u64,
    mdat_header_offset: u64,
    sequence_number: u32,
    init_written: bool,
    finished: bool,
    on_fragment: Option<FragmentCallback>,
}

impl<W: Write> Muxer<W> {
    /// Creates a muxer. Progressive muxers write their file header and the
    /// `mdat` placeholder right away.
    pub fn new(writer: W, mut config: MuxerConfig) -> Result<Self> {
        if (1..8).contains(&config.free_reserve) {
            config.free_reserve = 8;
        }

        let mut muxer = Muxer {
            writer,
            config,
            tracks: Vec::new(),
            position: 0,
            free_offset: 0,
            mdat_offset: 0,
            mdat_header_offset: 0,
            sequence_number: 0,
            init_written: false,
            finished: false,
            on_fragment: None,
        };

        if muxer.config.mode == MuxMode::Progressive {
            let mut buf = muxer.init_segment()?;
            muxer.free_offset = progressive_ftyp().size();
            muxer.mdat_header_offset = buf.len() as u64;

            BoxHeader::new(MDAT, 0).write(&mut buf);
            muxer.mdat_offset = buf.len() as u64;

            muxer.write_all(&buf)?;
            muxer.init_written = true;
        }

        Ok(muxer)
    }

    pub fn config(&self) -> &MuxerConfig {
        &self.config
    }

    /// Adds a track and returns its id. Fragmented output fixes the track
    /// list once the init segment is out.
    pub fn add_track(&mut self, config: TrackConfig) -> Result<u32> {
        if self.finished {
            return Err(Mp4BoxError::InvalidState("muxer is already finished"));
        }

        if self.init_written && self.config.mode != MuxMode::Progressive {
            return Err(Mp4BoxError::InvalidState("tracks must be added before the init segment"));
        }

        let id = self.tracks.len() as u32 + 1;
        let track = Track::new(id, config);

        // fail early on codecs that cannot be described
        track.sample_entry()?;

        debug!("Added track {} ({:?}, timescale {})", id, track.codec, track.timescale);

        self.tracks.push(MuxTrack {
            track,
            pending: PendingFragment::default(),
        });

        Ok(id)
    }

    pub fn track(&self, id: u32) -> Option<&Track> {
        self.tracks.iter().map(|t| &t.track).find(|t| t.id == id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> + '_ {
        self.tracks.iter().map(|t| &t.track)
    }

    /// Registers a callback run after every written fragment.
    pub fn on_fragment(&mut self, callback: impl FnMut(&FragmentInfo) + Send + 'static) {
        self.on_fragment = Some(Box::new(callback));
    }

    pub fn write_sample(&mut self, track_id: u32, data: &[u8], dts: u64, pts: u64, keyframe: bool) -> Result<()> {
        if self.finished {
            return Err(Mp4BoxError::InvalidState("sample written after the trailer"));
        }

        if data.is_empty() {
            return Err(Mp4BoxError::EmptySample);
        }

        let index = self
            .tracks
            .iter()
            .position(|t| t.track.id == track_id)
            .ok_or(Mp4BoxError::UnknownTrack(track_id))?;

        if self.config.mode == MuxMode::Progressive {
            let offset = self.position;
            self.write_all(data)?;

            let track = &mut self.tracks[index].track;
            track.extend_duration(dts);
            track.samples.push(Sample {
                dts,
                pts,
                size: data.len() as u32,
                offset,
                keyframe,
            });

            return Ok(());
        }

        if keyframe && self.starts_fragment(index) {
            self.flush(Some((index, dts)))?;
        }

        let track = &mut self.tracks[index];
        track.track.extend_duration(dts);
        track.pending.push(dts, pts, keyframe, data);

        Ok(())
    }

    fn starts_fragment(&self, index: usize) -> bool {
        if self.config.fragmentation != FragmentPolicy::Keyframe {
            return false;
        }

        let has_video = self.tracks.iter().any(|t| t.track.is_video());
        let triggers = self.tracks[index].track.is_video() || !has_video;

        triggers && self.tracks.iter().any(|t| !t.pending.is_empty())
    }

    /// Writes the pending samples of every track as one fragment.
    pub fn flush_fragment(&mut self) -> Result<()> {
        if self.finished {
            return Err(Mp4BoxError::InvalidState("muxer is already finished"));
        }

        self.flush(None)
    }

    /// Like [`Muxer::flush_fragment`], with the last sample of `track_id`
    /// lasting until `end_dts` instead of repeating the previous duration.
    pub fn flush_fragment_until(&mut self, track_id: u32, end_dts: u64) -> Result<()> {
        if self.finished {
            return Err(Mp4BoxError::InvalidState("muxer is already finished"));
        }

        let index = self
            .tracks
            .iter()
            .position(|t| t.track.id == track_id)
            .ok_or(Mp4BoxError::UnknownTrack(track_id))?;

        self.flush(Some((index, end_dts)))
    }

    /// Writes the fragmented init segment now instead of ahead of the first
    /// fragment. Does nothing for other modes or when it is already out.
    pub fn write_header(&mut self) -> Result<()> {
        if self.config.mode != MuxMode::Fragmented || self.init_written {
            return Ok(());
        }

        let init = self.init_segment()?;
        self.write_all(&init)?;
        self.init_written = true;

        Ok(())
    }

    /// `next` carries the decode time of the sample that follows the pending
    /// ones on a track, which fixes the duration of its last sample.
    fn flush(&mut self, next: Option<(usize, u64)>) -> Result<()> {
        if self.config.mode == MuxMode::Progressive {
            return Err(Mp4BoxError::InvalidState("progressive files have no fragments"));
        }

        let active: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| !self.tracks[i].pending.is_empty())
            .collect();
        if active.is_empty() {
            return Ok(());
        }

        self.write_header()?;

        self.sequence_number += 1;

        let mut bases = Vec::with_capacity(active.len());
        let mut mdat_len = 0;
        for &i in &active {
            bases.push(mdat_len);
            mdat_len += self.tracks[i].pending.data.len() as u64;
        }
        let mdat_header = BoxHeader::new(MDAT, mdat_len);

        let (moof, _) = self.moof(&active, &bases, 0, next)?;
        let data_start = moof.size() + mdat_header.header_size;
        let (moof, durations) = self.moof(&active, &bases, data_start, next)?;

        let mut buf = BytesMut::new();
        if self.config.mode == MuxMode::Dash {
            self.write_segment_index(&mut buf, &active, moof.size() + mdat_header.size)?;
        }

        let moof_offset = self.position + buf.len() as u64;
        moof.write(&mut buf)?;
        mdat_header.write(&mut buf);
        self.write_all(&buf)?;

        let mut info = FragmentInfo {
            sequence_number: self.sequence_number,
            offset: moof_offset,
            tracks: Vec::with_capacity(active.len()),
        };

        for (&i, &duration) in active.iter().zip(&durations) {
            let data = std::mem::take(&mut self.tracks[i].pending.data);
            self.write_all(&data)?;

            let MuxTrack { track, pending } = &mut self.tracks[i];
            if let Some(record) = pending.record(moof_offset, duration) {
                info.tracks.push(FragmentTrackInfo {
                    track_id: track.id,
                    duration,
                    first_pts: record.first_pts,
                    first_dts: record.first_dts,
                });
                track.fragments.push(record);
            }
            pending.clear();
        }

        debug!(
            "Wrote fragment {} at {} with {} bytes of samples",
            self.sequence_number, moof_offset, mdat_len
        );

        if let Some(callback) = self.on_fragment.as_mut() {
            callback(&info);
        }

        Ok(())
    }

    fn moof(
        &self,
        active: &[usize],
        bases: &[u64],
        data_start: u64,
        next: Option<(usize, u64)>,
    ) -> Result<(MovieFragmentBox, Vec<u64>)> {
        let mut trafs = Vec::with_capacity(active.len());
        let mut durations = Vec::with_capacity(active.len());

        for (&i, &base) in active.iter().zip(bases) {
            let MuxTrack { track, pending } = &self.tracks[i];
            let next_dts = next.filter(|&(index, _)| index == i).map(|(_, dts)| dts);

            let summary = pending.traf(track, data_start + base, next_dts)?;
            trafs.push(summary.traf);
            durations.push(summary.duration);
        }

        let moof = MovieFragmentBox {
            mfhd: MovieFragmentHeaderBox {
                sequence_number: self.sequence_number,
            },
            trafs,
        };

        Ok((moof, durations))
    }

    /// `styp` plus one `sidx` per track, each pointing past the ones that
    /// follow it at the `moof`.
    fn write_segment_index(&self, buf: &mut BytesMut, active: &[usize], segment_size: u64) -> Result<()> {
        SegmentTypeBox(FileTypeBox::new(
            FourCC(*b"msdh"),
            0,
            vec![FourCC(*b"msdh"), FourCC(*b"msix")],
        ))
        .write(buf)?;

        let mut sidxs = active
            .iter()
            .map(|&i| {
                let MuxTrack { track, pending } = &self.tracks[i];
                pending.sidx(track, 0, segment_size)
            })
            .collect::<Result<Vec<SegmentIndexBox>>>()?;

        let mut following = 0;
        for sidx in sidxs.iter_mut().rev() {
            sidx.first_offset = following;
            following += sidx.size();
        }

        for sidx in &sidxs {
            sidx.write(buf)?;
        }

        Ok(())
    }

    /// The boxes that open the output. Progressive files start with `ftyp`
    /// and the reservation `free` box. Fragmented output starts with `ftyp`
    /// and `moov`, which DASH players get as a separate init segment.
    pub fn init_segment(&self) -> Result<BytesMut> {
        if self.config.mode == MuxMode::Progressive {
            let ftyp = progressive_ftyp();
            let free = FreeSpaceBox {
                padding: self.config.free_reserve as u64,
            };

            let mut buf = BytesMut::with_capacity((ftyp.size() + free.size()) as usize);
            ftyp.write(&mut buf)?;
            free.write(&mut buf)?;

            return Ok(buf);
        }

        let ftyp = FileTypeBox::new(
            FourCC(*b"iso5"),
            0x200,
            vec![FourCC(*b"iso5"), FourCC(*b"iso6"), FourCC(*b"mp41")],
        );

        let traks = self
            .tracks
            .iter()
            .map(|t| t.track.trak(SampleTable::default(), false))
            .collect::<Result<Vec<_>>>()?;

        let moov = MovieBox {
            mvhd: MovieHeaderBox {
                creation_time: 0,
                modification_time: 0,
                timescale: MOVIE_TIMESCALE,
                duration: 0,
                next_track_id: self.tracks.len() as u32 + 1,
            },
            mvex: Some(MovieExtendsBox {
                mehd: None,
                trex: self.tracks.iter().map(|t| t.track.trex()).collect(),
            }),
            tracks: traks,
        };

        let mut buf = BytesMut::with_capacity((ftyp.size() + moov.size()) as usize);
        ftyp.write(&mut buf)?;
        moov.write(&mut buf)?;

        Ok(buf)
    }

    pub fn write_init_segment<S: Write>(&self, sink: &mut S) -> Result<()> {
        sink.write_all(&self.init_segment()?)?;

        Ok(())
    }

    /// Ends fragmented or DASH output: the last fragment and, for
    /// fragmented files, the `mfra` index. Progressive files need
    /// [`Muxer::write_trailer`] on a seekable sink.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(Mp4BoxError::InvalidState("trailer already written"));
        }

        match self.config.mode {
            MuxMode::Progressive => {
                return Err(Mp4BoxError::InvalidState("progressive trailer needs a seekable sink"))
            }
            MuxMode::Fragmented => {
                self.flush(None)?;
                self.write_header()?;

                let mfra = MovieFragmentRandomAccessBox::new(
                    self.tracks.iter().map(|t| fragment::tfra(&t.track)).collect(),
                );
                self.write_all(&mfra.to_bytes()?)?;
            }
            MuxMode::Dash => self.flush(None)?,
        }

        self.finished = true;
        self.writer.flush()?;

        Ok(())
    }

    /// `moov` describing every sample written so far, with sample offsets
    /// moved by `shift`.
    fn progressive_moov(&self, shift: u64) -> Result<MovieBox> {
        let mut traks = Vec::with_capacity(self.tracks.len());
        for MuxTrack { track, .. } in &self.tracks {
            let samples: Vec<Sample> = track
                .samples
                .iter()
                .map(|s| Sample {
                    offset: s.offset + shift,
                    ..*s
                })
                .collect();

            let table = SampleTable::build(&samples, track.is_video())?;
            traks.push(track.trak(table, true)?);
        }

        Ok(MovieBox {
            mvhd: MovieHeaderBox {
                creation_time: 0,
                modification_time: 0,
                timescale: MOVIE_TIMESCALE,
                duration: self.tracks.iter().map(|t| t.track.movie_duration()).max().unwrap_or(0),
                next_track_id: self.tracks.len() as u32 + 1,
            },
            mvex: None,
            tracks: traks,
        })
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.position += data.len() as u64;

        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Seek> Muxer<W> {
    /// Finishes the file. Progressive output gets its `mdat` size patched
    /// and `moov` appended; other modes behave like [`Muxer::finish`].
    pub fn write_trailer(&mut self) -> Result<()> {
        if self.config.mode != MuxMode::Progressive {
            return self.finish();
        }

        if self.finished {
            return Err(Mp4BoxError::InvalidState("trailer already written"));
        }

        self.patch_mdat_size()?;

        let moov = self.progressive_moov(0)?;
        self.write_all(&moov.to_bytes()?)?;

        self.finished = true;
        self.writer.flush()?;

        Ok(())
    }

    fn patch_mdat_size(&mut self) -> Result<()> {
        let payload = self.position - self.mdat_offset;

        if payload + BoxHeader::SIZE <= u32::MAX as u64 {
            self.writer
                .seek(SeekFrom::Start(self.mdat_header_offset))?;
            self.writer
                .write_u32::<BigEndian>((payload + BoxHeader::SIZE) as u32)?;
        } else {
            // the 64-bit header takes over the last 8 bytes of the free box
            let header_offset = self.mdat_offset - BoxHeader::LARGE_SIZE;
            let free_size = header_offset - self.free_offset;

            trace!("Upgrading mdat of {} bytes to a 64-bit size", payload);

            if free_size > 0 {
                self.writer.seek(SeekFrom::Start(self.free_offset))?;
                self.writer.write_u32::<BigEndian>(free_size as u32)?;
                self.writer.write_all(&FREE.0)?;
            }

            self.writer.seek(SeekFrom::Start(header_offset))?;
            self.writer.write_u32::<BigEndian>(1)?;
            self.writer.write_all(&MDAT.0)?;
            self.writer
                .write_u64::<BigEndian>(payload + BoxHeader::LARGE_SIZE)?;

            self.mdat_header_offset = header_offset;
        }

        self.writer.seek(SeekFrom::Start(self.position))?;

        Ok(())
    }
}

impl<W: Read + Write + Seek> Muxer<W> {
    /// Finishes a progressive file into `dest` with `moov` ahead of `mdat`,
    /// so playback can start before the whole file is fetched. Replaces
    /// [`Muxer::write_trailer`].
    pub fn rewrite_with_moov<D: Write>(&mut self, dest: &mut D) -> Result<()> {
        if self.config.mode != MuxMode::Progressive {
            return Err(Mp4BoxError::InvalidState("only progressive files can be rewritten"));
        }

        if self.finished {
            return Err(Mp4BoxError::InvalidState("trailer already written"));
        }

        self.patch_mdat_size()?;

        // offsets past 32 bits switch stco to co64, which changes the size
        let mut shift = self.progressive_moov(0)?.size();
        let moov = loop {
            let moov = self.progressive_moov(shift)?;
            if moov.size() == shift {
                break moov;
            }
            shift = moov.size();
        };

        self.writer.seek(SeekFrom::Start(0))?;
        copy_exact(&mut self.writer, dest, self.mdat_header_offset)?;

        dest.write_all(&moov.to_bytes()?)?;

        copy_exact(&mut self.writer, dest, self.position - self.mdat_header_offset)?;
        dest.flush()?;

        for MuxTrack { track, .. } in &mut self.tracks {
            for sample in &mut track.samples {
                sample.offset += shift;
            }
        }

        debug!("Rewrote progressive file with a {} byte moov up front", shift);

        self.finished = true;

        Ok(())
    }
}

fn copy_exact<R: Read, D: Write>(reader: &mut R, dest: &mut D, len: u64) -> Result<()> {
    let copied = io::copy(&mut reader.take(len), dest)?;
    if copied != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }

    Ok(())
}

fn progressive_ftyp() -> FileTypeBox {
    FileTypeBox::new(
        FourCC(*b"isom"),
        0x200,
        vec![
            FourCC(*b"isom"),
            FourCC(*b"iso2"),
            FourCC(*b"avc1"),
            FourCC(*b"mp41"),
        ],
    )
}
