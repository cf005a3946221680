use four_cc::FourCC;

/// The elementary stream formats the muxer and demuxer understand.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CodecId {
    H264,
    H265,
    Aac,
    G711A,
    G711U,
    Mp2,
    Mp3,
    Opus,
    /// A sample entry the catalog does not describe, kept by its type.
    Unknown(FourCC),
}

pub const HANDLER_VIDEO: FourCC = FourCC(*b"vide");
pub const HANDLER_SOUND: FourCC = FourCC(*b"soun");

impl CodecId {
    pub fn is_video(&self) -> bool {
        matches!(self, CodecId::H264 | CodecId::H265)
    }

    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            CodecId::Aac
                | CodecId::G711A
                | CodecId::G711U
                | CodecId::Mp2
                | CodecId::Mp3
                | CodecId::Opus
        )
    }

    /// MPEG-4 object type indication as carried in `esds`.
    pub fn object_type_indication(&self) -> Option<u8> {
        match self {
            CodecId::H264 => Some(0x21),
            CodecId::H265 => Some(0x23),
            CodecId::Aac => Some(0x40),
            CodecId::G711A => Some(0xfd),
            CodecId::G711U => Some(0xfe),
            CodecId::Mp2 => Some(0x6b),
            CodecId::Mp3 => Some(0x69),
            CodecId::Opus | CodecId::Unknown(_) => None,
        }
    }

    /// Both MPEG audio object types resolve to MP3.
    pub fn from_object_type_indication(object_type: u8) -> Option<CodecId> {
        match object_type {
            0x21 => Some(CodecId::H264),
            0x23 => Some(CodecId::H265),
            0x40 => Some(CodecId::Aac),
            0xfd => Some(CodecId::G711A),
            0xfe => Some(CodecId::G711U),
            0x6b | 0x69 => Some(CodecId::Mp3),
            _ => None,
        }
    }

    /// The `stream_type` byte of the decoder config descriptor, with the
    /// upstream flag and reserved bit already folded in.
    pub(crate) fn esds_stream_type(&self) -> u8 {
        match self {
            CodecId::H264 | CodecId::H265 => 0x11,
            CodecId::G711A | CodecId::G711U | CodecId::Aac => 0x15,
            _ => (0x38 << 2) | 1,
        }
    }

    pub fn sample_entry_type(&self) -> Option<FourCC> {
        match self {
            CodecId::H264 => Some(FourCC(*b"avc1")),
            CodecId::H265 => Some(FourCC(*b"hvc1")),
            CodecId::Aac | CodecId::Mp2 | CodecId::Mp3 => Some(FourCC(*b"mp4a")),
            CodecId::G711A => Some(FourCC(*b"alaw")),
            CodecId::G711U => Some(FourCC(*b"ulaw")),
            CodecId::Opus => Some(FourCC(*b"Opus")),
            CodecId::Unknown(_) => None,
        }
    }

    /// Maps a sample entry type to a codec. `mp4a` entries need their
    /// `esds` to be told apart and resolve to AAC here.
    pub fn from_sample_entry_type(format: FourCC) -> CodecId {
        match &format.0 {
            b"avc1" | b"avc3" => CodecId::H264,
            b"hvc1" | b"hev1" => CodecId::H265,
            b"mp4a" => CodecId::Aac,
            b"alaw" => CodecId::G711A,
            b"ulaw" => CodecId::G711U,
            b"Opus" | b"opus" => CodecId::Opus,
            b".mp3" => CodecId::Mp3,
            _ => CodecId::Unknown(format),
        }
    }

    pub fn handler_type(&self) -> Option<FourCC> {
        if self.is_video() {
            Some(HANDLER_VIDEO)
        } else if self.is_audio() {
            Some(HANDLER_SOUND)
        } else {
            None
        }
    }

    pub(crate) fn handler_name(&self) -> &'static str {
        if self.is_video() {
            "VideoHandler"
        } else {
            "SoundHandler"
        }
    }
}
