use std::io::{Read, Seek, SeekFrom};

use bytes::Bytes;
use four_cc::FourCC;

use tracing::{debug, trace};

use crate::{
    fragment::FragmentState, is_container, track::rescale, AnyBox, BoxHeader, ChunkOffsets, Mp4Box,
    Mp4BoxError, ProtectionSystemHeaderBox, Result, Sample, SampleAuxiliaryInformationOffsetsBox,
    SampleAuxiliaryInformationSizesBox, SampleEncryptionEntry, SubsampleEntry, Track,
    TrackExtendsBox, MAX_BUFFERED_BOX_SIZE, MOVIE_TIMESCALE,
};

/// Where the data of a `traf` starts when its `tfhd` has neither an explicit
/// base data offset nor the `default-base-is-moof` flag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BaseOffsetPolicy {
    /// The start of the enclosing `moof`.
    #[default]
    MoofOffset,
    /// The end of the previous `traf`'s data, or the `moof` for the first one.
    PreviousTrafEnd,
}

#[derive(Debug, Clone, Default)]
pub struct DemuxerConfig {
    pub base_offset_policy: BaseOffsetPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieInfo {
    pub major_brand: Option<FourCC>,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
    pub timescale: u32,
    /// In movie timescale.
    pub duration: u64,
    pub creation_time: u64,
    pub modification_time: u64,
    pub is_fragmented: bool,
}

/// One `tfra` entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RandomAccessPoint {
    pub track_id: u32,
    /// In track timescale.
    pub time: u64,
    pub moof_offset: u64,
}

/// What a decryptor needs to know about one protected sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleEncryption {
    pub kid: [u8; 16],
    pub iv: Vec<u8>,
    pub crypt_byte_block: u8,
    pub skip_byte_block: u8,
    /// Empty when the whole sample is protected.
    pub subsamples: Vec<SubsampleEntry>,
    pub pssh: Vec<ProtectionSystemHeaderBox>,
}

/// Registers of a single box tree walk.
#[derive(Debug, Default)]
pub(crate) struct ParserState {
    /// Index of the track opened by the last `trak`.
    track: Option<usize>,
    fragment: FragmentState,
    saiz: Option<SampleAuxiliaryInformationSizesBox>,
    /// Whether the current `traf` carried a `senc`.
    senc_seen: bool,
    /// `trex` boxes not yet matched to a `trak`, which may come later in `moov`.
    trex: Vec<TrackExtendsBox>,
}

impl ParserState {
    /// The track boxes currently apply to: the `traf` one inside a fragment,
    /// otherwise the open `trak`.
    fn current(&self) -> Option<usize> {
        self.fragment.current.or(self.track)
    }
}

pub struct Demuxer<R> {
    reader: R,
    config: DemuxerConfig,
    info: MovieInfo,
    tracks: Vec<Track>,
    pssh: Vec<ProtectionSystemHeaderBox>,
    random_access: Vec<RandomAccessPoint>,
    /// Next sample index per track.
    cursors: Vec<usize>,
}

impl<R: Read + Seek> Demuxer<R> {
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, DemuxerConfig::default())
    }

    pub fn with_config(reader: R, config: DemuxerConfig) -> Self {
        Demuxer {
            reader,
            config,
            info: MovieInfo::default(),
            tracks: Vec::new(),
            pssh: Vec::new(),
            random_access: Vec::new(),
            cursors: Vec::new(),
        }
    }

    /// Walks the whole box tree and builds the sample list of every track.
    pub fn demux(&mut self) -> Result<()> {
        let mut state = ParserState::default();

        let end = self.reader.seek(SeekFrom::End(0))?;
        let mut position = 0;

        while position < end {
            self.reader.seek(SeekFrom::Start(position))?;

            let header = match BoxHeader::read(&mut self.reader)? {
                Some(header) => header,
                None => break,
            };

            let box_end = if header.size == 0 {
                end
            } else {
                position + header.size
            };

            if is_container(header.name) {
                trace!("Entering {:?} at {}", header.name, position);
                self.enter_container(&header, position, &mut state)?;
                position += header.header_size;
                continue;
            }

            if AnyBox::is_known(header.name) {
                let len = box_end.saturating_sub(position + header.header_size);
                let body = self.read_body(&header, len)?;

                let any = AnyBox::read(&header, &body)?;
                self.dispatch(any, &mut state)?;
            } else {
                trace!("Skipping {:?} of {} bytes at {}", header.name, header.size, position);
            }

            position = box_end;
        }

        self.attach_track_extends(&mut state)?;
        self.finish()
    }

    fn read_body(&mut self, header: &BoxHeader, len: u64) -> Result<Vec<u8>> {
        if len > MAX_BUFFERED_BOX_SIZE {
            return Err(Mp4BoxError::corrupt(
                header.name,
                format!("{} byte body is too large to buffer", len),
            ));
        }

        let mut body = vec![0u8; len as usize];
        self.reader
            .read_exact(&mut body)
            .map_err(|e| Mp4BoxError::from(e).in_box(header.name))?;

        Ok(body)
    }

    fn enter_container(&mut self, header: &BoxHeader, position: u64, state: &mut ParserState) -> Result<()> {
        match &header.name.0 {
            b"trak" => {
                self.tracks.push(Track::unresolved());
                state.track = Some(self.tracks.len() - 1);
            }
            b"mvex" => self.info.is_fragmented = true,
            b"moof" => {
                self.attach_track_extends(state)?;
                state.fragment.begin_moof(position, header.size);
                state.saiz = None;
            }
            b"traf" => {
                state.saiz = None;
                state.senc_seen = false;
            }
            _ => {}
        }

        Ok(())
    }

    /// Hands the collected `trex` defaults to their tracks. A `trex` whose
    /// track never showed up is an error.
    fn attach_track_extends(&mut self, state: &mut ParserState) -> Result<()> {
        for trex in state.trex.drain(..) {
            let track = self
                .tracks
                .iter_mut()
                .find(|t| t.id == trex.track_id)
                .ok_or(Mp4BoxError::UnknownTrack(trex.track_id))?;
            track.trex = Some(trex);
        }

        Ok(())
    }

    fn current_track(&mut self, state: &ParserState, name: FourCC) -> Result<&mut Track> {
        state
            .current()
            .and_then(move |index| self.tracks.get_mut(index))
            .ok_or_else(|| Mp4BoxError::corrupt(name, "outside of a track"))
    }

    fn dispatch(&mut self, any: AnyBox, state: &mut ParserState) -> Result<()> {
        let name = any.name();

        match any {
            AnyBox::Ftyp(ftyp) => self.set_brands(ftyp.major_brand, ftyp.minor_version, ftyp.compatible_brands),
            AnyBox::Styp(styp) => self.set_brands(styp.0.major_brand, styp.0.minor_version, styp.0.compatible_brands),
            AnyBox::Mvhd(mvhd) => {
                self.info.timescale = mvhd.timescale;
                self.info.duration = mvhd.duration;
                self.info.creation_time = mvhd.creation_time;
                self.info.modification_time = mvhd.modification_time;
            }
            AnyBox::Tkhd(tkhd) => {
                let track = self.current_track(state, name)?;
                track.id = tkhd.track_id;
                track.width = tkhd.width >> 16;
                track.height = tkhd.height >> 16;
            }
            AnyBox::Mdhd(mdhd) => {
                if mdhd.timescale == 0 {
                    return Err(Mp4BoxError::corrupt(name, "zero timescale"));
                }

                let track = self.current_track(state, name)?;
                track.timescale = mdhd.timescale;
                track.duration = mdhd.duration;
            }
            AnyBox::Elst(elst) => self.current_track(state, name)?.edit_list = Some(elst),
            AnyBox::Stsd(stsd) => self.current_track(state, name)?.set_sample_description(stsd)?,
            AnyBox::Stts(stts) => self.current_track(state, name)?.table.stts = stts,
            AnyBox::Ctts(ctts) => self.current_track(state, name)?.table.ctts = Some(ctts),
            AnyBox::Stsc(stsc) => self.current_track(state, name)?.table.stsc = stsc,
            AnyBox::Stsz(stsz) => self.current_track(state, name)?.table.stsz = stsz,
            AnyBox::Stco(stco) => self.current_track(state, name)?.table.chunk_offsets = ChunkOffsets::Stco(stco),
            AnyBox::Co64(co64) => self.current_track(state, name)?.table.chunk_offsets = ChunkOffsets::Co64(co64),
            AnyBox::Stss(stss) => self.current_track(state, name)?.table.stss = Some(stss),
            AnyBox::Mehd(mehd) => {
                if self.info.duration == 0 {
                    self.info.duration = mehd.fragment_duration;
                }
            }
            AnyBox::Trex(trex) => state.trex.push(trex),
            AnyBox::Tfhd(tfhd) => {
                state
                    .fragment
                    .begin_traf(tfhd, &self.tracks, self.config.base_offset_policy)?;
            }
            AnyBox::Tfdt(tfdt) => state.fragment.base_decode_time(&tfdt),
            AnyBox::Trun(trun) => state.fragment.read_run(&trun, &mut self.tracks)?,
            AnyBox::Tfra(tfra) => {
                self.random_access.extend(tfra.entries.iter().map(|entry| RandomAccessPoint {
                    track_id: tfra.track_id,
                    time: entry.time,
                    moof_offset: entry.moof_offset,
                }));
            }
            AnyBox::Senc(senc) => {
                let track = self.current_track(state, name)?;
                let entries = senc.entries(iv_size(track))?;
                track.encryption.extend(entries);
                state.senc_seen = true;
            }
            AnyBox::Saiz(saiz) => state.saiz = Some(saiz),
            AnyBox::Saio(saio) => {
                if !state.senc_seen {
                    self.read_aux_info(&saio, state)?;
                }
            }
            AnyBox::Sgpd(sgpd) => {
                if let Some(seig) = sgpd.seig().next().cloned() {
                    self.current_track(state, name)?.seig = Some(seig);
                }
            }
            AnyBox::Pssh(pssh) => self.pssh.push(pssh),
            AnyBox::Hdlr(_) | AnyBox::Mfhd(_) | AnyBox::Mfro(_) | AnyBox::Sidx(_) | AnyBox::Unknown(_) => {
                trace!("Ignoring {:?}", name);
            }
        }

        Ok(())
    }

    fn set_brands(&mut self, major_brand: FourCC, minor_version: u32, compatible_brands: Vec<FourCC>) {
        if self.info.major_brand.is_some() {
            return;
        }

        self.info.major_brand = Some(major_brand);
        self.info.minor_version = minor_version;
        self.info.compatible_brands = compatible_brands;
    }

    /// Reads sample auxiliary information that lives outside of a `senc`,
    /// at the first `saio` offset from the start of the `moof`.
    fn read_aux_info(&mut self, saio: &SampleAuxiliaryInformationOffsetsBox, state: &ParserState) -> Result<()> {
        let (saiz, &first) = match (state.saiz.as_ref(), saio.offsets.first()) {
            (Some(saiz), Some(first)) => (saiz, first),
            _ => return Ok(()),
        };

        let index = match state.current() {
            Some(index) => index,
            None => return Ok(()),
        };
        let iv_size = iv_size(&self.tracks[index]);

        self.reader
            .seek(SeekFrom::Start(state.fragment.moof_offset + first))?;

        let mut entries = Vec::with_capacity(saiz.sample_count as usize);
        for i in 0..saiz.sample_count as usize {
            let size = saiz.info_size(i).unwrap_or(iv_size);

            let mut info = vec![0u8; size as usize];
            self.reader
                .read_exact(&mut info)
                .map_err(|e| Mp4BoxError::from(e).in_box(SampleAuxiliaryInformationOffsetsBox::NAME))?;

            entries.push(SampleEncryptionEntry::read(&mut &info[..], iv_size.min(size), size > iv_size)?);
        }

        debug!("Read {} aux info records from {}", entries.len(), state.fragment.moof_offset + first);
        self.tracks[index].encryption.extend(entries);

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.info.timescale == 0 {
            self.info.timescale = MOVIE_TIMESCALE;
        }

        for track in &mut self.tracks {
            if !self.info.is_fragmented {
                track.expand_table(self.info.timescale)?;
            } else if track.duration == 0 {
                if let (Some(first), Some(last)) = (track.samples.first(), track.samples.last()) {
                    track.duration = last.dts - first.dts;
                }
            }

            debug!(
                "Track {} ({:?}): {} samples, timescale {}",
                track.id,
                track.codec,
                track.samples.len(),
                track.timescale
            );
        }

        self.cursors = vec![0; self.tracks.len()];

        Ok(())
    }

    /// Reads the payload of a sample.
    pub fn read_sample_data(&mut self, sample: &Sample) -> Result<Bytes> {
        self.reader.seek(SeekFrom::Start(sample.offset))?;

        let mut data = vec![0u8; sample.size as usize];
        self.reader.read_exact(&mut data)?;

        Ok(Bytes::from(data))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R> Demuxer<R> {
    pub fn info(&self) -> &MovieInfo {
        &self.info
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: u32) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn pssh(&self) -> &[ProtectionSystemHeaderBox] {
        &self.pssh
    }

    /// Entries of the trailing `mfra`, if the file has one.
    pub fn random_access(&self) -> &[RandomAccessPoint] {
        &self.random_access
    }

    /// The next sample in global decode order, with the id of its track.
    /// Ties go to the track that comes first.
    pub fn next_sample(&mut self) -> Option<(u32, Sample)> {
        let movie_timescale = self.info.timescale;

        self.pick(|track, sample| rescale(sample.dts, track.timescale, movie_timescale))
    }

    /// The next sample in file order, regardless of timestamps.
    pub fn next_sample_by_offset(&mut self) -> Option<(u32, Sample)> {
        self.pick(|_, sample| sample.offset)
    }

    fn pick(&mut self, key: impl Fn(&Track, &Sample) -> u64) -> Option<(u32, Sample)> {
        let mut best: Option<(usize, u64)> = None;

        for (index, track) in self.tracks.iter().enumerate() {
            let sample = match track.samples.get(self.cursors[index]) {
                Some(sample) => sample,
                None => continue,
            };

            let value = key(track, sample);
            if best.map_or(true, |(_, best)| value < best) {
                best = Some((index, value));
            }
        }

        let (index, _) = best?;
        let track = &self.tracks[index];
        let sample = track.samples[self.cursors[index]];
        self.cursors[index] += 1;

        Some((track.id, sample))
    }

    pub fn samples(&mut self) -> Samples<'_, R> {
        Samples { demuxer: self }
    }

    pub fn samples_by_offset(&mut self) -> SamplesByOffset<'_, R> {
        SamplesByOffset { demuxer: self }
    }

    /// Positions every track at `ms`. The video track, or the first track
    /// if there is none, lands on the first fitting sample; the others on
    /// the first sample stored at or after it.
    pub fn seek_time(&mut self, ms: u64) -> Result<(u32, Sample)> {
        let primary = self
            .tracks
            .iter()
            .position(|t| t.is_video())
            .or_else(|| (!self.tracks.is_empty()).then(|| 0))
            .ok_or(Mp4BoxError::SeekFailed(ms))?;

        let track = &self.tracks[primary];
        let index = track.seek(ms).ok_or(Mp4BoxError::SeekFailed(ms))?;
        let target = track.samples[index];
        let track_id = track.id;

        for (i, track) in self.tracks.iter().enumerate() {
            self.cursors[i] = if i == primary {
                index
            } else {
                track
                    .samples
                    .iter()
                    .position(|s| s.offset >= target.offset)
                    .unwrap_or(track.samples.len())
            };
        }

        debug!("Seeked to {}ms, track {} sample {}", ms, track_id, index);

        Ok((track_id, target))
    }

    /// Protection parameters of a sample, or `None` for clear tracks.
    pub fn sample_encryption(&self, track_id: u32, index: usize) -> Result<Option<SampleEncryption>> {
        let track = self.track(track_id).ok_or(Mp4BoxError::UnknownTrack(track_id))?;
        let tenc = track.track_encryption();

        let (kid, crypt_byte_block, skip_byte_block, constant_iv) = match (&track.seig, tenc) {
            (Some(seig), _) => (
                seig.kid,
                seig.crypt_byte_block,
                seig.skip_byte_block,
                seig.constant_iv.clone(),
            ),
            (None, Some(tenc)) => (
                tenc.default_kid,
                tenc.default_crypt_byte_block,
                tenc.default_skip_byte_block,
                tenc.default_constant_iv.clone(),
            ),
            (None, None) if !track.encryption.is_empty() => ([0; 16], 0, 0, None),
            (None, None) => return Ok(None),
        };

        let entry = track.encryption.get(index);
        let iv = entry
            .map(|e| e.iv.clone())
            .filter(|iv| !iv.is_empty())
            .or(constant_iv)
            .unwrap_or_default();

        Ok(Some(SampleEncryption {
            kid,
            iv,
            crypt_byte_block,
            skip_byte_block,
            subsamples: entry.map(|e| e.subsamples.clone()).unwrap_or_default(),
            pssh: self.pssh.clone(),
        }))
    }
}

fn iv_size(track: &Track) -> u8 {
    track
        .seig
        .as_ref()
        .map(|seig| seig.per_sample_iv_size)
        .or_else(|| track.track_encryption().map(|tenc| tenc.default_per_sample_iv_size))
        .unwrap_or(8)
}

/// Samples in global decode order, see [`Demuxer::next_sample`].
pub struct Samples<'a, R> {
    demuxer: &'a mut Demuxer<R>,
}

impl<'a, R> Iterator for Samples<'a, R> {
    type Item = (u32, Sample);

    fn next(&mut self) -> Option<Self::Item> {
        self.demuxer.next_sample()
    }
}

/// Samples in file order, see [`Demuxer::next_sample_by_offset`].
pub struct SamplesByOffset<'a, R> {
    demuxer: &'a mut Demuxer<R>,
}

impl<'a, R> Iterator for SamplesByOffset<'a, R> {
    type Item = (u32, Sample);

    fn next(&mut self) -> Option<Self::Item> {
        self.demuxer.next_sample_by_offset()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::{
        CodecId, FileTypeBox, Mp4Box, MovieExtendsBox, MovieFragmentBox, MovieFragmentHeaderBox,
        MovieHeaderBox, SampleAuxiliaryInformationSizesBox, SampleTable, TrackConfig,
        TrackFragmentBox, TrackFragmentHeaderBox, TrackFragmentRunBox, TrackFragmentSample,
    };

    fn track(id: u32, timescale: u32, dts: &[u64]) -> Track {
        let mut track = Track::new(
            id,
            TrackConfig::audio(CodecId::Aac, 2, 48000, Vec::new()).with_timescale(timescale),
        );
        track.samples = dts
            .iter()
            .enumerate()
            .map(|(i, &dts)| Sample {
                dts,
                pts: dts,
                size: 1,
                offset: 1000 - i as u64 * 10 + id as u64,
                keyframe: true,
            })
            .collect();

        track
    }

    fn demuxer(tracks: Vec<Track>) -> Demuxer<Cursor<Vec<u8>>> {
        let mut demuxer = Demuxer::new(Cursor::new(Vec::new()));
        demuxer.info.timescale = 1000;
        demuxer.cursors = vec![0; tracks.len()];
        demuxer.tracks = tracks;

        demuxer
    }

    #[test]
    fn samples_come_in_decode_order() {
        let mut demuxer = demuxer(vec![
            track(1, 1000, &[0, 40, 80]),
            track(2, 90000, &[0, 1800, 3600, 5400, 7200]),
        ]);

        let order: Vec<_> = demuxer.samples().map(|(id, s)| (id, s.dts)).collect();
        assert_eq!(
            order,
            vec![(1, 0), (2, 0), (2, 1800), (1, 40), (2, 3600), (2, 5400), (1, 80), (2, 7200)]
        );
    }

    #[test]
    fn samples_by_offset_follow_the_file() {
        let mut demuxer = demuxer(vec![track(1, 1000, &[0, 40]), track(2, 1000, &[0, 40])]);

        let offsets: Vec<_> = demuxer.samples_by_offset().map(|(_, s)| s.offset).collect();
        assert_eq!(offsets, vec![1001, 991, 1002, 992]);
    }

    #[test]
    fn seek_aligns_other_tracks_by_offset() {
        let mut video = track(1, 1000, &[0, 40, 80, 120]);
        video.codec = CodecId::H264;
        for (i, sample) in video.samples.iter_mut().enumerate() {
            sample.offset = i as u64 * 100;
            sample.keyframe = i % 2 == 0;
        }
        let mut audio = track(2, 1000, &[0, 40, 80, 120]);
        for (i, sample) in audio.samples.iter_mut().enumerate() {
            sample.offset = i as u64 * 100 + 50;
        }

        let mut demuxer = demuxer(vec![audio, video]);

        let (id, sample) = demuxer.seek_time(50).unwrap();
        assert_eq!((id, sample.dts), (1, 80));
        assert_eq!(demuxer.next_sample().map(|(id, s)| (id, s.dts)), Some((2, 80)));

        assert!(matches!(demuxer.seek_time(500), Err(Mp4BoxError::SeekFailed(500))));
    }

    #[test]
    fn truncated_leaf_is_corrupt() {
        let ftyp = FileTypeBox::new(FourCC(*b"isom"), 0, vec![FourCC(*b"isom")]);
        let bytes = ftyp.to_bytes().unwrap();

        let mut demuxer = Demuxer::new(Cursor::new(bytes[..bytes.len() - 2].to_vec()));
        assert!(demuxer.demux().unwrap_err().is_corrupt());
    }

    #[test]
    fn brands_come_from_the_first_type_box() {
        let mut data = BytesMut::new();
        FileTypeBox::new(FourCC(*b"iso5"), 0x200, vec![FourCC(*b"iso6")])
            .write(&mut data)
            .unwrap();
        FileTypeBox::new(FourCC(*b"isom"), 1, vec![])
            .write(&mut data)
            .unwrap();

        let mut demuxer = Demuxer::new(Cursor::new(data.to_vec()));
        demuxer.demux().unwrap();

        assert_eq!(demuxer.info().major_brand, Some(FourCC(*b"iso5")));
        assert_eq!(demuxer.info().minor_version, 0x200);
        assert_eq!(demuxer.info().timescale, MOVIE_TIMESCALE);
    }

    /// A `moov` laid out as `mvhd`, `mvex`, then one `trak` per id in
    /// `track_ids`, followed by a `moof` for track 1 that relies on the
    /// `trex` defaults.
    fn extends_before_tracks(track_ids: &[u32]) -> Vec<u8> {
        let mvhd = MovieHeaderBox {
            creation_time: 0,
            modification_time: 0,
            timescale: 1000,
            duration: 0,
            next_track_id: 2,
        };
        let mvex = MovieExtendsBox {
            mehd: None,
            trex: vec![TrackExtendsBox {
                default_sample_duration: 10,
                default_sample_size: 4,
                ..TrackExtendsBox::new(1)
            }],
        };

        let mut children = BytesMut::new();
        mvhd.write(&mut children).unwrap();
        mvex.write(&mut children).unwrap();
        for &id in track_ids {
            Track::new(id, TrackConfig::audio(CodecId::Aac, 2, 48000, vec![0x11, 0x90]))
                .trak(SampleTable::default(), false)
                .unwrap()
                .write(&mut children)
                .unwrap();
        }

        let mut data = BytesMut::new();
        BoxHeader::new(FourCC(*b"moov"), children.len() as u64).write(&mut data);
        data.extend_from_slice(&children);

        let moof = MovieFragmentBox {
            mfhd: MovieFragmentHeaderBox { sequence_number: 1 },
            trafs: vec![TrackFragmentBox {
                tfhd: TrackFragmentHeaderBox {
                    track_id: 1,
                    default_base_is_moof: true,
                    ..Default::default()
                },
                track_runs: vec![TrackFragmentRunBox {
                    data_offset: None,
                    first_sample_flags: None,
                    samples: vec![TrackFragmentSample::default(); 3],
                }],
                base_media_decode_time: None,
            }],
        };
        moof.write(&mut data).unwrap();

        data.to_vec()
    }

    #[test]
    fn extends_may_precede_tracks() {
        let mut demuxer = Demuxer::new(Cursor::new(extends_before_tracks(&[1])));
        demuxer.demux().unwrap();

        let track = &demuxer.tracks()[0];
        assert_eq!(track.trex.as_ref().map(|t| t.default_sample_size), Some(4));
        assert_eq!(track.samples.iter().map(|s| s.dts).collect::<Vec<_>>(), vec![0, 10, 20]);
        assert!(track.samples.iter().all(|s| s.size == 4));
    }

    #[test]
    fn extends_without_a_track_are_rejected() {
        let mut demuxer = Demuxer::new(Cursor::new(extends_before_tracks(&[2])));

        assert!(matches!(demuxer.demux(), Err(Mp4BoxError::UnknownTrack(1))));
    }

    #[test]
    fn aux_info_is_read_through_saio() {
        let mut demuxer = demuxer(vec![track(1, 1000, &[])]);
        demuxer.info.is_fragmented = true;

        let moof = MovieFragmentBox {
            mfhd: MovieFragmentHeaderBox { sequence_number: 1 },
            trafs: vec![TrackFragmentBox {
                tfhd: TrackFragmentHeaderBox {
                    track_id: 1,
                    default_base_is_moof: true,
                    ..Default::default()
                },
                track_runs: vec![TrackFragmentRunBox {
                    data_offset: Some(0),
                    first_sample_flags: None,
                    samples: vec![
                        TrackFragmentSample {
                            size: Some(4),
                            ..Default::default()
                        };
                        2
                    ],
                }],
                base_media_decode_time: None,
            }],
        };
        let mut data = moof.to_bytes().unwrap().to_vec();
        let aux_offset = data.len() as u64;
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
        demuxer.reader = Cursor::new(data);

        let mut state = ParserState::default();
        state.fragment.begin_moof(0, moof.size());
        state.track = Some(0);
        state.saiz = Some(SampleAuxiliaryInformationSizesBox {
            default_sample_info_size: 8,
            sample_count: 2,
            ..Default::default()
        });
        let saio = SampleAuxiliaryInformationOffsetsBox {
            aux_info_type: None,
            offsets: vec![aux_offset],
        };
        demuxer.read_aux_info(&saio, &state).unwrap();

        let first = demuxer.sample_encryption(1, 0).unwrap().unwrap();
        assert_eq!(first.iv, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(first.subsamples.is_empty());
        let second = demuxer.sample_encryption(1, 1).unwrap().unwrap();
        assert_eq!(second.iv, vec![9, 10, 11, 12, 13, 14, 15, 16]);
    }

    #[test]
    fn clear_tracks_have_no_encryption() {
        let demuxer = demuxer(vec![track(1, 1000, &[0])]);

        assert_eq!(demuxer.sample_encryption(1, 0).unwrap(), None);
        assert!(matches!(
            demuxer.sample_encryption(9, 0),
            Err(Mp4BoxError::UnknownTrack(9))
        ));
    }
}
