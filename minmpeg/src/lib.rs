//! minmpeg
//!
//! Minimal video generation. Two operations are offered:
//!
//! - [`slideshow`]: still images, each held for its own duration
//! - [`juxtapose`]: two videos placed side by side
//!
//! Both produce MP4 or WebM files encoded with AV1 or H.264 at 30 fps. The
//! container/codec pair is validated and an encoder backend is found before
//! any frame is decoded; a failed run never leaves a partial output file.
//!
//! The free functions use a [`Pipeline`] configured from the environment.
//! Build a [`Pipeline`] directly to control threads and timeouts.

use minmpeg_decoder::{JuxtaposeFrames, SlideshowFrames, VideoReader};
use minmpeg_encoder::EncoderSink;
use std::path::Path;

pub use minmpeg_core::{
    Codec, Color, Container, EncodeSpec, ErrorKind, Geometry, PixelFrame, SlideEntry, OUTPUT_FPS,
};
pub use minmpeg_encoder::{Availability, Backend, EncodeSummary, EncoderConfig};

/// Result type for minmpeg operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for minmpeg operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] minmpeg_core::Error),

    #[error(transparent)]
    Decoder(#[from] minmpeg_decoder::Error),

    #[error(transparent)]
    Encoder(#[from] minmpeg_encoder::Error),
}

impl Error {
    /// Public error category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Core(e) => e.kind(),
            Error::Decoder(e) => e.kind(),
            Error::Encoder(e) => e.kind(),
        }
    }
}

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Checks that `codec` has a usable encoder backend on this host
pub fn availability(codec: Codec, backend_path: Option<&Path>) -> Result<Backend> {
    Pipeline::from_env().availability(codec, backend_path)
}

/// Creates a slideshow video from a sequence of images.
///
/// All images are resized to the dimensions of the first one.
pub fn slideshow(
    entries: &[SlideEntry],
    output_path: &Path,
    container: Container,
    codec: Codec,
    quality: u8,
    backend_path: Option<&Path>,
) -> Result<EncodeSummary> {
    let spec = encode_spec(container, codec, quality, backend_path);
    Pipeline::from_env().slideshow(entries, output_path, &spec)
}

/// Combines two videos side by side.
///
/// The output is `left.width + right.width` wide and as tall as the taller
/// input, which lasts as long as the longer input. The shorter side is
/// top-aligned over `background` (white when `None`) and holds its last
/// frame once it runs out.
#[allow(clippy::too_many_arguments)]
pub fn juxtapose(
    left_path: &Path,
    right_path: &Path,
    output_path: &Path,
    container: Container,
    codec: Codec,
    quality: u8,
    background: Option<Color>,
    backend_path: Option<&Path>,
) -> Result<EncodeSummary> {
    let spec = encode_spec(container, codec, quality, backend_path);
    Pipeline::from_env().juxtapose(
        left_path,
        right_path,
        output_path,
        &spec,
        background.unwrap_or_default(),
    )
}

fn encode_spec(container: Container, codec: Codec, quality: u8, backend_path: Option<&Path>) -> EncodeSpec {
    let spec = EncodeSpec::new(container, codec, quality);
    match backend_path {
        Some(path) => spec.with_backend_path(path),
        None => spec,
    }
}

/// Runs slideshow and juxtapose operations with one encoder configuration
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: EncoderConfig,
}

impl Pipeline {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Pipeline configured by `MINMPEG_*` environment variables
    pub fn from_env() -> Self {
        Self::new(EncoderConfig::from_env())
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// The backend that would encode `codec`, or `CodecUnavailable`
    pub fn availability(&self, codec: Codec, backend_path: Option<&Path>) -> Result<Backend> {
        match minmpeg_encoder::check(codec, backend_path) {
            Availability::Available(backend) => Ok(backend),
            Availability::Unavailable(reason) => {
                Err(minmpeg_encoder::Error::CodecUnavailable(reason).into())
            }
        }
    }

    /// Creates a slideshow video at `output_path`
    pub fn slideshow(
        &self,
        entries: &[SlideEntry],
        output_path: &Path,
        spec: &EncodeSpec,
    ) -> Result<EncodeSummary> {
        spec.validate()?;
        require_path(output_path, "output path")?;
        minmpeg_core::plan_slides(entries)?;
        let backends = self.backends(spec)?;

        tracing::info!(
            slides = entries.len(),
            output = %output_path.display(),
            container = %spec.container,
            codec = %spec.codec,
            "creating slideshow"
        );

        let frames = SlideshowFrames::new(entries)?;
        self.encode(
            frames.geometry(),
            frames.total_frames(),
            frames,
            output_path,
            spec,
            &backends,
        )
    }

    /// Combines `left_path` and `right_path` side by side into `output_path`
    pub fn juxtapose(
        &self,
        left_path: &Path,
        right_path: &Path,
        output_path: &Path,
        spec: &EncodeSpec,
        background: Color,
    ) -> Result<EncodeSummary> {
        spec.validate()?;
        require_path(left_path, "left video path")?;
        require_path(right_path, "right video path")?;
        require_path(output_path, "output path")?;
        let backends = self.backends(spec)?;

        tracing::info!(
            left = %left_path.display(),
            right = %right_path.display(),
            output = %output_path.display(),
            container = %spec.container,
            codec = %spec.codec,
            "creating juxtaposition"
        );

        let left = VideoReader::open(left_path)?;
        let right = VideoReader::open(right_path)?;
        let frames = JuxtaposeFrames::new(left, right, background)?;
        self.encode(
            frames.geometry(),
            frames.total_frames(),
            frames,
            output_path,
            spec,
            &backends,
        )
    }

    fn backends(&self, spec: &EncodeSpec) -> Result<Vec<Backend>> {
        let backend_path = spec.backend_path.as_deref();
        let backends = minmpeg_encoder::candidates(spec.codec, backend_path);
        if backends.is_empty() {
            let reason = minmpeg_encoder::capability::unavailable_reason(spec.codec, backend_path);
            return Err(minmpeg_encoder::Error::CodecUnavailable(reason).into());
        }
        Ok(backends)
    }

    fn encode<I>(
        &self,
        geometry: Geometry,
        total_frames: u64,
        frames: I,
        output_path: &Path,
        spec: &EncodeSpec,
        backends: &[Backend],
    ) -> Result<EncodeSummary>
    where
        I: Iterator<Item = minmpeg_decoder::Result<PixelFrame>>,
    {
        let mut sink = self.open_sink(geometry, total_frames, output_path, spec, backends)?;
        for frame in frames {
            sink.push(&frame?)?;
        }
        let summary = sink.finish()?;

        tracing::info!(
            output = %summary.path.display(),
            frames = summary.frames,
            bytes = summary.bytes,
            "video written"
        );
        Ok(summary)
    }

    /// Opens the first backend that accepts the job. A backend that fails
    /// to open is skipped; nothing has been written to it yet.
    fn open_sink(
        &self,
        geometry: Geometry,
        total_frames: u64,
        output_path: &Path,
        spec: &EncodeSpec,
        backends: &[Backend],
    ) -> Result<EncoderSink> {
        let mut last_error = None;
        for backend in backends {
            match EncoderSink::create(output_path, spec, backend, geometry, total_frames, &self.config) {
                Ok(sink) => {
                    tracing::debug!(%backend, %geometry, total_frames, "selected encoder backend");
                    return Ok(sink);
                }
                Err(e) if matches!(e.kind(), ErrorKind::EncodeError | ErrorKind::CodecUnavailable) => {
                    tracing::warn!(%backend, error = %e, "encoder backend failed to open, trying the next one");
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(match last_error {
            Some(e) => e.into(),
            None => minmpeg_encoder::Error::CodecUnavailable(format!("no {} backend", spec.codec)).into(),
        })
    }
}

fn require_path(path: &Path, what: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(minmpeg_core::Error::invalid(format!("{what} is empty")).into());
    }
    Ok(())
}
