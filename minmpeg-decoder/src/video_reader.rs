//! Video reading and frame extraction using FFmpeg

use crate::{Error, Result};
use ffmpeg_next as ffmpeg;
use minmpeg_core::{Geometry, PixelFrame};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static FFMPEG_INIT: OnceLock<std::result::Result<(), ffmpeg::Error>> = OnceLock::new();

/// Initialize FFmpeg once per process; later calls return the first outcome
pub(crate) fn init_ffmpeg() -> Result<()> {
    FFMPEG_INIT
        .get_or_init(|| {
            let result = ffmpeg::init();
            if result.is_ok() {
                ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
            }
            result
        })
        .clone()
        .map_err(Error::Ffmpeg)
}

/// A decoded source frame with its presentation time relative to the first
/// frame of the stream
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub pts_us: u64,
    pub frame: PixelFrame,
}

/// A finite, forward-only sequence of frames in presentation order, plus the
/// stream metadata the timeline needs up front
pub trait VideoSource: Iterator<Item = Result<DecodedFrame>> {
    /// Path the frames are read from, for diagnostics
    fn path(&self) -> &Path;

    /// Native frame size of the stream
    fn geometry(&self) -> Geometry;

    /// Stream duration in milliseconds
    fn duration_ms(&self) -> u64;
}

/// Video reader that lazily decodes frames from a video file.
///
/// Frames are consumed once; reopen the file to read it again.
pub struct VideoReader {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    video_stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: Option<(ffmpeg::software::scaling::Context, ScalerKey)>,
    time_base: ffmpeg::Rational,
    frame_rate: (u32, u32),
    duration_ms: u64,
    frame_count: u64,
    first_timestamp: Option<i64>,
    frames_read: u64,
    draining: bool,
    finished: bool,
}

type ScalerKey = (ffmpeg::format::Pixel, u32, u32);

impl VideoReader {
    /// Opens a video file and reads its stream metadata
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::metadata(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        init_ffmpeg()?;

        let input = ffmpeg::format::input(&path)?;

        // Find the video stream
        let (video_stream_index, time_base, frame_rate, stream_frames, stream_duration, decoder) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| Error::NoVideoStream(path.to_path_buf()))?;

            let avg = stream.avg_frame_rate();
            let rate = if avg.numerator() > 0 && avg.denominator() > 0 {
                avg
            } else {
                stream.rate()
            };

            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
            let decoder = context.decoder().video()?;

            (
                stream.index(),
                stream.time_base(),
                (rate.numerator().max(0) as u32, rate.denominator().max(0) as u32),
                stream.frames(),
                stream.duration(),
                decoder,
            )
        };

        let fps = if frame_rate.0 > 0 && frame_rate.1 > 0 {
            frame_rate.0 as f64 / frame_rate.1 as f64
        } else {
            0.0
        };

        let mut duration_ms = if stream_duration > 0 {
            timestamp_to_us(stream_duration, time_base) / 1000
        } else if input.duration() > 0 {
            (input.duration() as u64) * 1000 / ffmpeg::ffi::AV_TIME_BASE as u64
        } else {
            0
        };

        let frame_count = if stream_frames > 0 {
            stream_frames as u64
        } else {
            (duration_ms as f64 * fps / 1000.0).round() as u64
        };

        if duration_ms == 0 && fps > 0.0 {
            duration_ms = (frame_count as f64 * 1000.0 / fps).round() as u64;
        }

        tracing::debug!(
            path = %path.display(),
            width = decoder.width(),
            height = decoder.height(),
            fps,
            frame_count,
            duration_ms,
            "opened video"
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            video_stream_index,
            decoder,
            scaler: None,
            time_base,
            frame_rate,
            duration_ms,
            frame_count,
            first_timestamp: None,
            frames_read: 0,
            draining: false,
            finished: false,
        })
    }

    /// Gets the video width
    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    /// Gets the video height
    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    /// Gets the frame rate as a rational number (numerator, denominator)
    pub fn frame_rate(&self) -> (u32, u32) {
        self.frame_rate
    }

    /// Frame rate as frames per second, 0.0 when the stream does not say
    pub fn fps(&self) -> f64 {
        match self.frame_rate {
            (num, den) if num > 0 && den > 0 => num as f64 / den as f64,
            _ => 0.0,
        }
    }

    /// Number of frames, from the container or estimated from the duration
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Gets the total duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Decodes the next frame, or returns `None` at the end of the stream
    pub fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        if self.finished {
            return Ok(None);
        }

        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            match receive_outcome(self.decoder.receive_frame(&mut decoded))? {
                Receive::Frame => return self.convert(&decoded).map(Some),
                Receive::Drained => {
                    self.finished = true;
                    return Ok(None);
                }
                Receive::NeedInput => {}
            }
            if self.draining {
                self.finished = true;
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() == self.video_stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    // Flush decoder
                    self.decoder.send_eof()?;
                    self.draining = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<DecodedFrame> {
        let key = (decoded.format(), decoded.width(), decoded.height());
        let (width, height) = (key.1, key.2);

        // Setup scaler for RGB conversion, again if the stream changes size
        if self.scaler.as_ref().map_or(true, |(_, k)| *k != key) {
            let context = ffmpeg::software::scaling::Context::get(
                key.0,
                width,
                height,
                ffmpeg::format::Pixel::RGB24,
                width,
                height,
                ffmpeg::software::scaling::Flags::BILINEAR,
            )?;
            self.scaler = Some((context, key));
        }

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        if let Some((scaler, _)) = self.scaler.as_mut() {
            scaler.run(decoded, &mut rgb_frame)?;
        }

        let row_bytes = width as usize * PixelFrame::FORMAT.bytes_per_pixel();
        let stride = rgb_frame.stride(0);
        let plane = rgb_frame.data(0);
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            let row = plane.get(start..start + row_bytes).ok_or_else(|| {
                Error::Decode(format!(
                    "short RGB plane while reading '{}'",
                    self.path.display()
                ))
            })?;
            data.extend_from_slice(row);
        }
        let frame = PixelFrame::new(width, height, data)?;

        let pts_us = match decoded.timestamp().or_else(|| decoded.pts()) {
            Some(ts) => {
                let origin = *self.first_timestamp.get_or_insert(ts);
                timestamp_to_us(ts.saturating_sub(origin).max(0), self.time_base)
            }
            None => match self.frame_rate {
                (num, den) if num > 0 => self.frames_read * 1_000_000 * den as u64 / num as u64,
                _ => 0,
            },
        };
        self.frames_read += 1;

        Ok(DecodedFrame { pts_us, frame })
    }
}

impl Iterator for VideoReader {
    type Item = Result<DecodedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_frame() {
            Ok(frame) => frame.map(Ok),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl VideoSource for VideoReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn geometry(&self) -> Geometry {
        Geometry::new(self.width(), self.height())
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}

/// Converts a stream timestamp to microseconds, rounding down
fn timestamp_to_us(ts: i64, time_base: ffmpeg::Rational) -> u64 {
    let (num, den) = (time_base.numerator() as i128, time_base.denominator() as i128);
    if ts <= 0 || num <= 0 || den <= 0 {
        return 0;
    }
    (ts as i128 * num * 1_000_000 / den) as u64
}

#[derive(Debug, PartialEq, Eq)]
enum Receive {
    Frame,
    NeedInput,
    Drained,
}

/// Classifies `receive_frame`: only EAGAIN asks for more packets, any other
/// failure is a decode fault
fn receive_outcome(result: std::result::Result<(), ffmpeg::Error>) -> Result<Receive> {
    match result {
        Ok(()) => Ok(Receive::Frame),
        Err(ffmpeg::Error::Other {
            errno: ffmpeg::util::error::EAGAIN,
        }) => Ok(Receive::NeedInput),
        Err(ffmpeg::Error::Eof) => Ok(Receive::Drained),
        Err(e) => Err(e.into()),
    }
}
