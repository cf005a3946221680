use four_cc::FourCC;

use crate::{read_body, BoxHeader, Mp4Box, Mp4BoxError};

mod avcc;
mod co64;
mod ctts;
mod dinf;
mod dops;
mod dref;
mod edts;
mod elst;
mod esds;
mod free;
mod frma;
mod ftyp;
mod hdlr;
mod hvcc;
mod mdhd;
mod mdia;
mod mehd;
mod mfhd;
mod mfra;
mod mfro;
mod minf;
mod moof;
mod moov;
mod mvex;
mod mvhd;
mod pssh;
mod saio;
mod saiz;
mod sample_entry;
mod schm;
mod senc;
mod sgpd;
mod sidx;
mod sinf;
mod smhd;
mod stbl;
mod stco;
mod stsc;
mod stsd;
mod stss;
mod stsz;
mod stts;
mod styp;
mod tenc;
mod tfdt;
mod tfhd;
mod tfra;
mod tkhd;
mod traf;
mod trak;
mod trex;
mod trun;
mod url;
mod vmhd;

pub use self::{
    avcc::*, co64::*, ctts::*, dinf::*, dops::*, dref::*, edts::*, elst::*, esds::*, free::*,
    frma::*, ftyp::*, hdlr::*, hvcc::*, mdhd::*, mdia::*, mehd::*, mfhd::*, mfra::*, mfro::*,
    minf::*, moof::*, moov::*, mvex::*, mvhd::*, pssh::*, saio::*, saiz::*, sample_entry::*,
    schm::*, senc::*, sgpd::*, sidx::*, sinf::*, smhd::*, stbl::*, stco::*, stsc::*, stsd::*,
    stss::*, stsz::*, stts::*, styp::*, tenc::*, tfdt::*, tfhd::*, tfra::*, tkhd::*, traf::*,
    trak::*, trex::*, trun::*, url::*, vmhd::*,
};

pub const MDAT: FourCC = FourCC(*b"mdat");
pub const FREE: FourCC = FourCC(*b"free");
pub const SKIP: FourCC = FourCC(*b"skip");

/// Boxes whose body is nothing but child boxes. A box tree walk descends
/// into these instead of reading them.
pub fn is_container(name: FourCC) -> bool {
    matches!(
        &name.0,
        b"moov"
            | b"trak"
            | b"mdia"
            | b"minf"
            | b"stbl"
            | b"edts"
            | b"dinf"
            | b"mvex"
            | b"moof"
            | b"traf"
            | b"mfra"
    )
}

/// Every leaf box the demuxer acts on, keyed by its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyBox {
    Ftyp(FileTypeBox),
    Styp(SegmentTypeBox),
    Mvhd(MovieHeaderBox),
    Tkhd(TrackHeaderBox),
    Mdhd(MediaHeaderBox),
    Hdlr(HandlerBox),
    Elst(EditListBox),
    Stsd(SampleDescriptionBox),
    Stts(TimeToSampleBox),
    Ctts(CompositionOffsetBox),
    Stsc(SampleToChunkBox),
    Stsz(SampleSizeBox),
    Stco(ChunkOffsetBox),
    Co64(ChunkLargeOffsetBox),
    Stss(SyncSampleBox),
    Mehd(MovieExtendsHeaderBox),
    Trex(TrackExtendsBox),
    Mfhd(MovieFragmentHeaderBox),
    Tfhd(TrackFragmentHeaderBox),
    Tfdt(TrackFragmentBaseMediaDecodeTimeBox),
    Trun(TrackFragmentRunBox),
    Tfra(TrackFragmentRandomAccessBox),
    Mfro(MovieFragmentRandomAccessOffsetBox),
    Sidx(SegmentIndexBox),
    Senc(SampleEncryptionBox),
    Saiz(SampleAuxiliaryInformationSizesBox),
    Saio(SampleAuxiliaryInformationOffsetsBox),
    Sgpd(SampleGroupDescriptionBox),
    Pssh(ProtectionSystemHeaderBox),
    /// Anything else, skipped by its declared size.
    Unknown(FourCC),
}

impl AnyBox {
    /// Decodes the body of a leaf box that has already been read into memory.
    pub fn read(header: &BoxHeader, body: &[u8]) -> Result<AnyBox, Mp4BoxError> {
        let any = match &header.name.0 {
            b"ftyp" => AnyBox::Ftyp(read_body(header, body)?),
            b"styp" => AnyBox::Styp(read_body(header, body)?),
            b"mvhd" => AnyBox::Mvhd(read_body(header, body)?),
            b"tkhd" => AnyBox::Tkhd(read_body(header, body)?),
            b"mdhd" => AnyBox::Mdhd(read_body(header, body)?),
            b"hdlr" => AnyBox::Hdlr(read_body(header, body)?),
            b"elst" => AnyBox::Elst(read_body(header, body)?),
            b"stsd" => AnyBox::Stsd(read_body(header, body)?),
            b"stts" => AnyBox::Stts(read_body(header, body)?),
            b"ctts" => AnyBox::Ctts(read_body(header, body)?),
            b"stsc" => AnyBox::Stsc(read_body(header, body)?),
            b"stsz" => AnyBox::Stsz(read_body(header, body)?),
            b"stco" => AnyBox::Stco(read_body(header, body)?),
            b"co64" => AnyBox::Co64(read_body(header, body)?),
            b"stss" => AnyBox::Stss(read_body(header, body)?),
            b"mehd" => AnyBox::Mehd(read_body(header, body)?),
            b"trex" => AnyBox::Trex(read_body(header, body)?),
            b"mfhd" => AnyBox::Mfhd(read_body(header, body)?),
            b"tfhd" => AnyBox::Tfhd(read_body(header, body)?),
            b"tfdt" => AnyBox::Tfdt(read_body(header, body)?),
            b"trun" => AnyBox::Trun(read_body(header, body)?),
            b"tfra" => AnyBox::Tfra(read_body(header, body)?),
            b"mfro" => AnyBox::Mfro(read_body(header, body)?),
            b"sidx" => AnyBox::Sidx(read_body(header, body)?),
            b"senc" => AnyBox::Senc(read_body(header, body)?),
            b"saiz" => AnyBox::Saiz(read_body(header, body)?),
            b"saio" => AnyBox::Saio(read_body(header, body)?),
            b"sgpd" => AnyBox::Sgpd(read_body(header, body)?),
            b"pssh" => AnyBox::Pssh(read_body(header, body)?),
            _ => AnyBox::Unknown(header.name),
        };

        Ok(any)
    }

    /// Whether [`AnyBox::read`] decodes boxes of this type. Bodies of other
    /// types never need to be loaded.
    pub fn is_known(name: FourCC) -> bool {
        matches!(
            &name.0,
            b"ftyp"
                | b"styp"
                | b"mvhd"
                | b"tkhd"
                | b"mdhd"
                | b"hdlr"
                | b"elst"
                | b"stsd"
                | b"stts"
                | b"ctts"
                | b"stsc"
                | b"stsz"
                | b"stco"
                | b"co64"
                | b"stss"
                | b"mehd"
                | b"trex"
                | b"mfhd"
                | b"tfhd"
                | b"tfdt"
                | b"trun"
                | b"tfra"
                | b"mfro"
                | b"sidx"
                | b"senc"
                | b"saiz"
                | b"saio"
                | b"sgpd"
                | b"pssh"
        )
    }

    pub fn name(&self) -> FourCC {
        match self {
            AnyBox::Ftyp(_) => FileTypeBox::NAME,
            AnyBox::Styp(_) => SegmentTypeBox::NAME,
            AnyBox::Mvhd(_) => MovieHeaderBox::NAME,
            AnyBox::Tkhd(_) => TrackHeaderBox::NAME,
            AnyBox::Mdhd(_) => MediaHeaderBox::NAME,
            AnyBox::Hdlr(_) => HandlerBox::NAME,
            AnyBox::Elst(_) => EditListBox::NAME,
            AnyBox::Stsd(_) => SampleDescriptionBox::NAME,
            AnyBox::Stts(_) => TimeToSampleBox::NAME,
            AnyBox::Ctts(_) => CompositionOffsetBox::NAME,
            AnyBox::Stsc(_) => SampleToChunkBox::NAME,
            AnyBox::Stsz(_) => SampleSizeBox::NAME,
            AnyBox::Stco(_) => ChunkOffsetBox::NAME,
            AnyBox::Co64(_) => ChunkLargeOffsetBox::NAME,
            AnyBox::Stss(_) => SyncSampleBox::NAME,
            AnyBox::Mehd(_) => MovieExtendsHeaderBox::NAME,
            AnyBox::Trex(_) => TrackExtendsBox::NAME,
            AnyBox::Mfhd(_) => MovieFragmentHeaderBox::NAME,
            AnyBox::Tfhd(_) => TrackFragmentHeaderBox::NAME,
            AnyBox::Tfdt(_) => TrackFragmentBaseMediaDecodeTimeBox::NAME,
            AnyBox::Trun(_) => TrackFragmentRunBox::NAME,
            AnyBox::Tfra(_) => TrackFragmentRandomAccessBox::NAME,
            AnyBox::Mfro(_) => MovieFragmentRandomAccessOffsetBox::NAME,
            AnyBox::Sidx(_) => SegmentIndexBox::NAME,
            AnyBox::Senc(_) => SampleEncryptionBox::NAME,
            AnyBox::Saiz(_) => SampleAuxiliaryInformationSizesBox::NAME,
            AnyBox::Saio(_) => SampleAuxiliaryInformationOffsetsBox::NAME,
            AnyBox::Sgpd(_) => SampleGroupDescriptionBox::NAME,
            AnyBox::Pssh(_) => ProtectionSystemHeaderBox::NAME,
            AnyBox::Unknown(name) => *name,
        }
    }
}
