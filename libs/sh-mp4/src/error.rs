use std::io;

use four_cc::FourCC;

use crate::CodecId;

pub type Result<T, E = Mp4BoxError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Mp4BoxError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Corrupt {box_type:?} box: {reason}")]
    Corrupt { box_type: FourCC, reason: String },

    #[error("Unsupported codec: {0:?}")]
    UnsupportedCodec(CodecId),

    #[error("Sample data is empty")]
    EmptySample,

    #[error("No track with id {0}")]
    UnknownTrack(u32),

    #[error("Invalid muxer state: {0}")]
    InvalidState(&'static str),

    #[error("No sample at or after {0}ms")]
    SeekFailed(u64),
}

impl Mp4BoxError {
    pub fn corrupt(box_type: FourCC, reason: impl Into<String>) -> Self {
        Mp4BoxError::Corrupt {
            box_type,
            reason: reason.into(),
        }
    }

    /// Reinterprets a short read inside an already buffered box body as
    /// corruption of that box.
    pub(crate) fn in_box(self, box_type: FourCC) -> Self {
        match self {
            Mp4BoxError::IoError(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Mp4BoxError::corrupt(box_type, "truncated box body")
            }
            other => other,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, Mp4BoxError::Corrupt { .. })
    }
}
