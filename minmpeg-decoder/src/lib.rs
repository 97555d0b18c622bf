//! minmpeg Decoder Library
//!
//! This library turns source media into a stream of [`PixelFrame`]s at the
//! output frame rate: still images and existing videos are decoded, normalised
//! to one geometry by the frame compositor and laid out on the output clock by
//! the timeline builders.
//!
//! [`PixelFrame`]: minmpeg_core::PixelFrame

pub mod frame_compositor;
pub mod image_decoder;
pub mod timeline;
pub mod video_reader;

pub use image_decoder::decode_image;
pub use timeline::{JuxtaposeFrames, SlideshowFrames};
pub use video_reader::{DecodedFrame, VideoReader, VideoSource};

use minmpeg_core::ErrorKind;
use std::path::PathBuf;

/// Result type for minmpeg-decoder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for minmpeg-decoder operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] minmpeg_core::Error),

    #[error("Cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot decode image '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("AVIF decode error in '{path}': {message}")]
    AvifDecode { path: PathBuf, message: String },

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),

    #[error("No video stream found in '{0}'")]
    NoVideoStream(PathBuf),

    #[error("Video '{0}' contains no frames")]
    EmptyVideo(PathBuf),

    #[error("Decoding error: {0}")]
    Decode(String),
}

impl Error {
    /// Public error category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Core(e) => e.kind(),
            Error::Io { .. } => ErrorKind::IoError,
            Error::Image { .. }
            | Error::AvifDecode { .. }
            | Error::Ffmpeg(_)
            | Error::NoVideoStream(_)
            | Error::EmptyVideo(_)
            | Error::Decode(_) => ErrorKind::DecodeError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let io = Error::Io {
            path: "a.png".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(io.kind(), ErrorKind::IoError);
        assert_eq!(Error::EmptyVideo("v.webm".into()).kind(), ErrorKind::DecodeError);
        assert_eq!(
            Error::Core(minmpeg_core::Error::invalid("x")).kind(),
            ErrorKind::InvalidInput
        );

        let truncated = Error::Image {
            path: "t.png".into(),
            source: image::ImageError::IoError(std::io::ErrorKind::UnexpectedEof.into()),
        };
        assert_eq!(truncated.kind(), ErrorKind::DecodeError);
    }
}
