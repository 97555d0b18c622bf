//! minmpeg Encoder Library
//!
//! This library turns a stream of [`PixelFrame`]s into an MP4 or WebM file.
//! The capability registry decides which backend realises a codec on this
//! host; the [`EncoderSink`] drives that backend and only moves the output
//! into place once the encode has succeeded.
//!
//! [`PixelFrame`]: minmpeg_core::PixelFrame

pub mod capability;
pub mod external;
pub mod ffmpeg_encoder;
pub mod progress_tracker;
pub mod quality;
pub mod sink;

pub use capability::{candidates, check, Availability, Backend};
pub use sink::{EncodeSummary, EncoderSink};

use minmpeg_core::{ErrorKind, Geometry};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Result type for minmpeg-encoder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for minmpeg-encoder operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] minmpeg_core::Error),

    #[error("Codec unavailable: {0}")]
    CodecUnavailable(String),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),

    #[error("Cannot write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run '{program}': {source}")]
    Process {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    ExternalFailed {
        program: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("External encoder did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Encoder produced an empty file '{0}'")]
    EmptyOutput(PathBuf),

    #[error("Frame is {actual}, sink expects {expected}")]
    GeometryMismatch { expected: Geometry, actual: Geometry },

    #[error("Encoding error: {0}")]
    Encode(String),
}

impl Error {
    /// Public error category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Core(e) => e.kind(),
            Error::CodecUnavailable(_) => ErrorKind::CodecUnavailable,
            Error::Io { .. } => ErrorKind::IoError,
            Error::GeometryMismatch { .. } => ErrorKind::InvalidInput,
            Error::Ffmpeg(_)
            | Error::Process { .. }
            | Error::ExternalFailed { .. }
            | Error::Timeout(_)
            | Error::EmptyOutput(_)
            | Error::Encode(_) => ErrorKind::EncodeError,
        }
    }
}

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Worker threads handed to the encoder backend
    pub threads: usize,
    /// Upper bound on how long an external encoder may take to exit once
    /// its input is closed
    pub external_timeout: Duration,
    /// Frames between progress log lines
    pub progress_interval: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            external_timeout: Duration::from_secs(600),
            progress_interval: 30,
        }
    }
}

impl EncoderConfig {
    /// Thread count variable
    pub const THREADS_ENV: &'static str = "MINMPEG_THREADS";
    /// External encoder timeout variable, in seconds
    pub const TIMEOUT_ENV: &'static str = "MINMPEG_ENCODE_TIMEOUT_SECS";

    /// Defaults overridden by `MINMPEG_THREADS` and
    /// `MINMPEG_ENCODE_TIMEOUT_SECS`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(threads) = parse_var::<usize>(&lookup, Self::THREADS_ENV) {
            config.threads = threads.max(1);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, Self::TIMEOUT_ENV) {
            config.external_timeout = Duration::from_secs(secs);
        }
        config
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

static FFMPEG_INIT: OnceLock<std::result::Result<(), ffmpeg_next::Error>> = OnceLock::new();

/// Initialize FFmpeg once per process with libav logging lowered to errors
pub(crate) fn init_ffmpeg() -> Result<()> {
    FFMPEG_INIT
        .get_or_init(|| {
            let result = ffmpeg_next::init();
            if result.is_ok() {
                ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);
            }
            result
        })
        .clone()
        .map_err(Error::Ffmpeg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::CodecUnavailable("none".into()).kind(),
            ErrorKind::CodecUnavailable
        );
        assert_eq!(Error::Timeout(Duration::from_secs(1)).kind(), ErrorKind::EncodeError);
        assert_eq!(Error::EmptyOutput("o.mp4".into()).kind(), ErrorKind::EncodeError);
        let mismatch = minmpeg_core::Error::ContainerCodecMismatch {
            container: minmpeg_core::Container::WebM,
            codec: minmpeg_core::Codec::H264,
        };
        assert_eq!(Error::from(mismatch).kind(), ErrorKind::ContainerCodecMismatch);
    }

    #[test]
    fn test_config_from_env() {
        let vars: HashMap<&str, &str> = [
            (EncoderConfig::THREADS_ENV, "3"),
            (EncoderConfig::TIMEOUT_ENV, "45"),
        ]
        .into();
        let config = EncoderConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.threads, 3);
        assert_eq!(config.external_timeout, Duration::from_secs(45));
        assert_eq!(config.progress_interval, 30);
    }

    #[test]
    fn test_config_ignores_bad_values() {
        let config = EncoderConfig::from_lookup(|name| match name {
            EncoderConfig::THREADS_ENV => Some("many".into()),
            _ => None,
        });
        assert_eq!(config, EncoderConfig::default());
    }
}
