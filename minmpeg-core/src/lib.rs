//! minmpeg Core Library
//!
//! This library provides the data model shared by every stage of the minmpeg
//! pipeline: pixel frames, the codec/container table, slide timing and the
//! error kinds reported at the public boundary.

pub mod frame;
pub mod media;
pub mod timeline;

pub use frame::{Geometry, PixelFormat, PixelFrame};
pub use media::{Codec, Color, Container, EncodeSpec};
pub use timeline::{plan_slides, SlideEntry};

/// Output frame rate of every operation
pub const OUTPUT_FPS: u32 = 30;

/// Result type for minmpeg-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for minmpeg-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Container {container} does not support codec {codec}")]
    ContainerCodecMismatch { container: Container, codec: Codec },

    #[cfg(feature = "serde")]
    #[error("Invalid slide manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidInput`]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Public error category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::ContainerCodecMismatch { .. } => ErrorKind::ContainerCodecMismatch,
            #[cfg(feature = "serde")]
            Error::Manifest(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Error categories reported at the public boundary.
///
/// The discriminants are the numeric codes of the C ABI; `0` is reserved for
/// success there and never used by an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub enum ErrorKind {
    /// Malformed caller arguments
    InvalidInput = 1,
    /// No usable backend for the codec on this host
    CodecUnavailable = 2,
    /// The container cannot carry the codec
    ContainerCodecMismatch = 3,
    /// Filesystem failure
    IoError = 4,
    /// The backend failed while encoding
    EncodeError = 5,
    /// A source image or video could not be parsed
    DecodeError = 6,
}

impl ErrorKind {
    /// Numeric code shared with the C ABI and the CLI exit status
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::CodecUnavailable => "codec unavailable",
            ErrorKind::ContainerCodecMismatch => "container/codec mismatch",
            ErrorKind::IoError => "I/O error",
            ErrorKind::EncodeError => "encode error",
            ErrorKind::DecodeError => "decode error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ErrorKind::InvalidInput.code(), 1);
        assert_eq!(ErrorKind::CodecUnavailable.code(), 2);
        assert_eq!(ErrorKind::ContainerCodecMismatch.code(), 3);
        assert_eq!(ErrorKind::IoError.code(), 4);
        assert_eq!(ErrorKind::EncodeError.code(), 5);
        assert_eq!(ErrorKind::DecodeError.code(), 6);
    }

    #[test]
    fn test_core_error_kinds() {
        assert_eq!(Error::invalid("x").kind(), ErrorKind::InvalidInput);
        let err = Error::ContainerCodecMismatch {
            container: Container::WebM,
            codec: Codec::H264,
        };
        assert_eq!(err.kind(), ErrorKind::ContainerCodecMismatch);
        assert_eq!(err.to_string(), "Container WebM does not support codec H264");
    }
}
