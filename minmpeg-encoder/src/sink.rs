//! Encoder sink: frames in, finished file out
//!
//! The backend writes to a temporary file next to the output path. Only a
//! successful [`EncoderSink::finish`] renames it into place; every other
//! exit (error, early drop) stops the backend and deletes the temporary.

use crate::capability::Backend;
use crate::external::{ExternalEncoder, ExternalJob};
use crate::ffmpeg_encoder::InProcessEncoder;
use crate::progress_tracker::ProgressTracker;
use crate::{EncoderConfig, Error, Result};
use minmpeg_core::{EncodeSpec, Geometry, PixelFrame};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// The backend chosen for this sink
enum Running {
    InProcess(InProcessEncoder),
    External(ExternalEncoder),
}

impl Running {
    fn write_frame(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Running::InProcess(encoder) => encoder.write_frame(data),
            Running::External(encoder) => encoder.write_frame(data),
        }
    }

    fn finish(&mut self) -> Result<()> {
        match self {
            Running::InProcess(encoder) => encoder.finish(),
            Running::External(encoder) => encoder.finish(),
        }
    }
}

/// Statistics of a completed encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    pub path: PathBuf,
    pub frames: u64,
    pub bytes: u64,
}

/// Streams frames of one geometry into an output file through one backend
pub struct EncoderSink {
    // Declared before `temp`: the backend must release the file before the
    // temporary is deleted
    backend: Running,
    temp: TempPath,
    output: PathBuf,
    geometry: Geometry,
    encode_geometry: Geometry,
    scratch: Vec<u8>,
    progress: ProgressTracker,
}

impl EncoderSink {
    /// Opens `backend` for frames of `geometry`, writing to a temporary file
    /// beside `output`.
    ///
    /// Odd dimensions are encoded one pixel larger with the last row/column
    /// repeated, as 4:2:0 chroma needs even sizes.
    pub fn create(
        output: &Path,
        spec: &EncodeSpec,
        backend: &Backend,
        geometry: Geometry,
        total_frames: u64,
        config: &EncoderConfig,
    ) -> Result<Self> {
        spec.validate()?;
        if geometry.is_degenerate() {
            return Err(minmpeg_core::Error::invalid(format!("cannot encode {geometry} frames")).into());
        }

        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(".minmpeg-")
            .suffix(&format!(".{}", spec.container.extension()))
            .tempfile_in(dir)
            .map_err(|source| Error::Io {
                path: output.to_path_buf(),
                source,
            })?
            .into_temp_path();

        let encode_geometry = geometry.even_ceil();
        let running = match backend {
            Backend::InProcess { encoder } => Running::InProcess(InProcessEncoder::open(
                &temp,
                spec.container,
                encoder,
                encode_geometry,
                spec.fps(),
                spec.quality,
                config.threads,
            )?),
            Backend::External { program, encoder } => {
                let job = ExternalJob {
                    encoder,
                    container: spec.container,
                    geometry: encode_geometry,
                    fps: spec.fps(),
                    quality: spec.quality,
                    threads: config.threads,
                };
                Running::External(ExternalEncoder::spawn(
                    program,
                    &job,
                    &temp,
                    config.external_timeout,
                )?)
            }
        };

        tracing::debug!(
            %backend,
            output = %output.display(),
            %geometry,
            %encode_geometry,
            "encoder sink ready"
        );

        Ok(Self {
            backend: running,
            temp,
            output: output.to_path_buf(),
            geometry,
            encode_geometry,
            scratch: Vec::new(),
            progress: ProgressTracker::new(total_frames, config.progress_interval, backend.to_string()),
        })
    }

    /// Geometry every pushed frame must have
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Encodes one frame
    pub fn push(&mut self, frame: &PixelFrame) -> Result<()> {
        if frame.geometry() != self.geometry {
            return Err(Error::GeometryMismatch {
                expected: self.geometry,
                actual: frame.geometry(),
            });
        }

        let data: &[u8] = if self.encode_geometry == self.geometry {
            frame.as_bytes()
        } else {
            pad_to_even(frame, self.encode_geometry, &mut self.scratch);
            &self.scratch
        };
        self.backend.write_frame(data)?;
        self.progress.advance();
        Ok(())
    }

    /// Completes the encode and moves the file to the output path
    pub fn finish(self) -> Result<EncodeSummary> {
        let EncoderSink {
            mut backend,
            temp,
            output,
            progress,
            ..
        } = self;

        let finished = if progress.processed() == 0 {
            Err(Error::Encode("no frames were produced".into()))
        } else {
            backend.finish()
        };
        // Release the file before `temp` can delete or rename it
        drop(backend);
        finished?;

        let bytes = std::fs::metadata(&temp)
            .map_err(|source| Error::Io {
                path: temp.to_path_buf(),
                source,
            })?
            .len();
        if bytes == 0 {
            return Err(Error::EmptyOutput(output));
        }

        temp.persist(&output).map_err(|e| Error::Io {
            path: output.clone(),
            source: e.error,
        })?;
        progress.finish();

        Ok(EncodeSummary {
            path: output,
            frames: progress.processed(),
            bytes,
        })
    }
}

/// Copies `frame` into `out` at `target` size, repeating the last column
/// and row to fill the extra pixel
fn pad_to_even(frame: &PixelFrame, target: Geometry, out: &mut Vec<u8>) {
    let bpp = PixelFrame::FORMAT.bytes_per_pixel();
    out.clear();
    out.reserve(target.frame_len(PixelFrame::FORMAT));

    let extra_columns = target.width.saturating_sub(frame.width()) as usize;
    for y in 0..target.height {
        let row = frame.row(y.min(frame.height() - 1));
        out.extend_from_slice(row);
        let last = &row[row.len() - bpp..];
        for _ in 0..extra_columns {
            out.extend_from_slice(last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minmpeg_core::{Codec, Color, Container, ErrorKind};
    use std::time::Duration;

    #[test]
    fn test_pad_to_even_repeats_edges() {
        let frame = PixelFrame::new(
            3,
            3,
            (0..27).map(|v| v as u8).collect(),
        )
        .unwrap();
        let mut out = Vec::new();
        pad_to_even(&frame, Geometry::new(4, 4), &mut out);

        assert_eq!(out.len(), 4 * 4 * 3);
        let padded = PixelFrame::new(4, 4, out).unwrap();
        assert_eq!(padded.pixel(3, 0), frame.pixel(2, 0));
        assert_eq!(padded.pixel(1, 3), frame.pixel(1, 2));
        assert_eq!(padded.pixel(3, 3), frame.pixel(2, 2));
        assert_eq!(&padded.row(1)[..9], frame.row(1));
    }

    #[test]
    fn test_create_rejects_bad_input_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.webm");
        let backend = Backend::InProcess { encoder: "libsvtav1" };
        let config = EncoderConfig::default();

        let mismatch = EncodeSpec::new(Container::WebM, Codec::H264, 50);
        let err = EncoderSink::create(&output, &mismatch, &backend, Geometry::new(8, 8), 1, &config)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ContainerCodecMismatch);

        let spec = EncodeSpec::new(Container::WebM, Codec::Av1, 50);
        let err = EncoderSink::create(&output, &spec, &backend, Geometry::new(0, 8), 1, &config)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unwritable_output_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("missing").join("out.mp4");
        let spec = EncodeSpec::new(Container::Mp4, Codec::Av1, 50);
        let err = EncoderSink::create(
            &output,
            &spec,
            &Backend::InProcess { encoder: "libsvtav1" },
            Geometry::new(8, 8),
            1,
            &EncoderConfig::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::IoError);
    }

    #[cfg(unix)]
    fn external_sink(program: &str, output: &Path) -> EncoderSink {
        let spec = EncodeSpec::new(Container::Mp4, Codec::H264, 50);
        let backend = Backend::External {
            program: PathBuf::from(program),
            encoder: "libx264",
        };
        let config = EncoderConfig {
            external_timeout: Duration::from_secs(10),
            ..EncoderConfig::default()
        };
        EncoderSink::create(output, &spec, &backend, Geometry::new(4, 4), 2, &config).unwrap()
    }

    fn leftover_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_backend_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let mut sink = external_sink("false", &output);

        let frame = PixelFrame::filled(4, 4, Color::BLACK);
        // The child may already be gone, so the push itself can fail
        let result = sink.push(&frame).and_then(|()| sink.finish().map(|_| ()));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::EncodeError);
        assert!(leftover_files(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_empty_output_is_encode_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        // `true` exits successfully without writing anything
        let mut sink = external_sink("true", &output);

        let frame = PixelFrame::filled(4, 4, Color::BLACK);
        let result = sink.push(&frame).and_then(|()| sink.finish().map(|_| ()));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::EncodeError);
        assert!(leftover_files(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_dropped_sink_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let sink = external_sink("cat", &output);
        drop(sink);
        assert!(leftover_files(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_push_rejects_other_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let mut sink = external_sink("cat", &output);
        assert_eq!(sink.geometry(), Geometry::new(4, 4));

        let err = sink.push(&PixelFrame::filled(2, 2, Color::WHITE)).unwrap_err();
        assert!(matches!(err, Error::GeometryMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        drop(sink);
        assert!(leftover_files(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_finish_without_frames_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let sink = external_sink("cat", &output);

        let err = sink.finish().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncodeError);
        assert!(leftover_files(dir.path()).is_empty());
    }
}
