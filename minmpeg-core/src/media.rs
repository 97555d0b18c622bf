//! Codec, container and encode option types

use crate::{Error, Result, OUTPUT_FPS};
use std::fmt;
use std::path::PathBuf;

/// Video codec of the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(C)]
pub enum Codec {
    Av1 = 0,
    H264 = 1,
}

/// Container format of the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(C)]
pub enum Container {
    Mp4 = 0,
    WebM = 1,
}

impl Codec {
    pub const ALL: [Codec; 2] = [Codec::Av1, Codec::H264];
}

impl Container {
    pub const ALL: [Container; 2] = [Container::Mp4, Container::WebM];

    /// Checks the static container/codec compatibility table
    pub fn supports_codec(self, codec: Codec) -> bool {
        match (self, codec) {
            (Container::Mp4, _) => true,
            (Container::WebM, Codec::Av1) => true,
            (Container::WebM, Codec::H264) => false,
        }
    }

    /// Muxer short name understood by libav and the ffmpeg executable
    pub fn format_name(self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::WebM => "webm",
        }
    }

    /// Conventional file extension, without the dot
    pub fn extension(self) -> &'static str {
        self.format_name()
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl TryFrom<i32> for Codec {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Codec::Av1),
            1 => Ok(Codec::H264),
            other => Err(Error::invalid(format!("unknown codec value {other}"))),
        }
    }
}

impl TryFrom<i32> for Container {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Container::Mp4),
            1 => Ok(Container::WebM),
            other => Err(Error::invalid(format!("unknown container value {other}"))),
        }
    }
}

impl std::str::FromStr for Codec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "av1" => Ok(Codec::Av1),
            "h264" | "h.264" | "avc" => Ok(Codec::H264),
            _ => Err(Error::invalid(format!("unknown codec '{s}'"))),
        }
    }
}

impl std::str::FromStr for Container {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(Container::Mp4),
            "webm" => Ok(Container::WebM),
            _ => Err(Error::invalid(format!("unknown container '{s}'"))),
        }
    }
}

/// RGB background color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const BLACK: Color = Color::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgb(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

impl std::str::FromStr for Color {
    type Err = Error;

    /// Parses `#rrggbb` / `rrggbb` hex notation
    fn from_str(s: &str) -> Result<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid(format!("invalid color '{s}', expected #rrggbb")));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| Error::invalid(format!("invalid color '{s}'")))
        };
        Ok(Color::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// Everything the encoder sink needs to know about the requested output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSpec {
    pub container: Container,
    pub codec: Codec,
    /// Quality (0-100, where 100 is highest quality)
    pub quality: u8,
    /// Explicit path of the external encoder executable
    pub backend_path: Option<PathBuf>,
}

impl EncodeSpec {
    /// Highest accepted quality value
    pub const MAX_QUALITY: u8 = 100;

    /// Creates a spec without an external encoder override
    pub fn new(container: Container, codec: Codec, quality: u8) -> Self {
        Self {
            container,
            codec,
            quality,
            backend_path: None,
        }
    }

    pub fn with_backend_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backend_path = Some(path.into());
        self
    }

    /// Output frame rate; fixed for every operation
    pub fn fps(&self) -> u32 {
        OUTPUT_FPS
    }

    /// Validates the spec.
    ///
    /// The container/codec table is checked first so a bad pair always
    /// reports the same error regardless of the other fields.
    pub fn validate(&self) -> Result<()> {
        if !self.container.supports_codec(self.codec) {
            return Err(Error::ContainerCodecMismatch {
                container: self.container,
                codec: self.codec,
            });
        }
        if self.quality > Self::MAX_QUALITY {
            return Err(Error::invalid(format!(
                "quality must be between 0 and {}, got {}",
                Self::MAX_QUALITY,
                self.quality
            )));
        }
        if matches!(&self.backend_path, Some(p) if p.as_os_str().is_empty()) {
            return Err(Error::invalid("external encoder path is empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_table() {
        assert!(Container::Mp4.supports_codec(Codec::Av1));
        assert!(Container::Mp4.supports_codec(Codec::H264));
        assert!(Container::WebM.supports_codec(Codec::Av1));
        assert!(!Container::WebM.supports_codec(Codec::H264));
    }

    #[test]
    fn test_validate_checks_mismatch_before_quality() {
        let spec = EncodeSpec::new(Container::WebM, Codec::H264, 200);
        assert!(matches!(
            spec.validate(),
            Err(Error::ContainerCodecMismatch { .. })
        ));

        let spec = EncodeSpec::new(Container::WebM, Codec::Av1, 101);
        assert!(matches!(spec.validate(), Err(Error::InvalidInput(_))));

        let spec = EncodeSpec::new(Container::Mp4, Codec::H264, 100);
        assert!(spec.validate().is_ok());
        assert_eq!(spec.fps(), 30);
    }

    #[test]
    fn test_empty_backend_path_is_invalid() {
        let spec = EncodeSpec::new(Container::Mp4, Codec::H264, 50).with_backend_path("");
        assert!(matches!(spec.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(Codec::try_from(0).unwrap(), Codec::Av1);
        assert_eq!(Codec::try_from(1).unwrap(), Codec::H264);
        assert!(Codec::try_from(2).is_err());
        assert_eq!(Container::try_from(1).unwrap(), Container::WebM);
        assert!(Container::try_from(-1).is_err());
    }

    #[test]
    fn test_parse_names_and_colors() {
        assert_eq!("AV1".parse::<Codec>().unwrap(), Codec::Av1);
        assert_eq!("webm".parse::<Container>().unwrap(), Container::WebM);
        assert!("mkv".parse::<Container>().is_err());
        assert_eq!("#ff8000".parse::<Color>().unwrap(), Color::new(255, 128, 0));
        assert_eq!("000000".parse::<Color>().unwrap(), Color::BLACK);
        assert!("#fff".parse::<Color>().is_err());
        assert_eq!(Color::default(), Color::WHITE);
    }
}
