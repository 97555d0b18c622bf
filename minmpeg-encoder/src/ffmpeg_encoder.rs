//! In-process encoding through libav
//!
//! The flow per frame:
//!   1. packed RGB24 rows → ffmpeg `frame::Video` (RGB24)
//!   2. swscale RGB24 → YUV420P (required by every supported encoder)
//!   3. encoder → packets, rescaled to the stream time base
//!   4. packets interleaved into the MP4/WebM muxer

use crate::quality::encoder_options;
use crate::{Error, Result};
use ffmpeg_next as ffmpeg;
use minmpeg_core::{Container, Geometry, PixelFrame};
use std::path::Path;

/// A libav encoder and muxer writing one output file
pub struct InProcessEncoder {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    rgb_frame: ffmpeg::frame::Video,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    geometry: Geometry,
    next_pts: i64,
}

impl InProcessEncoder {
    /// Opens `encoder_name` and writes the container header to `path`.
    ///
    /// `geometry` must have even dimensions. Failures here happen before any
    /// frame is accepted, so the caller may still try another backend.
    pub fn open(
        path: &Path,
        container: Container,
        encoder_name: &str,
        geometry: Geometry,
        fps: u32,
        quality: u8,
        threads: usize,
    ) -> Result<Self> {
        crate::init_ffmpeg()?;

        let codec = ffmpeg::encoder::find_by_name(encoder_name).ok_or_else(|| {
            Error::CodecUnavailable(format!("{encoder_name} is not linked into libav"))
        })?;

        let mut output = ffmpeg::format::output_as(&path, container.format_name())?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let encoder_time_base = ffmpeg::Rational(1, fps as i32);
        let encoder = {
            let mut stream = output.add_stream(codec)?;
            let context = ffmpeg::codec::context::Context::new_with_codec(codec);
            let mut video = context.encoder().video()?;

            video.set_width(geometry.width);
            video.set_height(geometry.height);
            video.set_format(ffmpeg::format::Pixel::YUV420P);
            video.set_time_base(encoder_time_base);
            video.set_frame_rate(Some(ffmpeg::Rational(fps as i32, 1)));
            if global_header {
                video.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
            }

            let mut opts = ffmpeg::Dictionary::new();
            for (name, value) in encoder_options(encoder_name, quality, geometry, fps, threads) {
                opts.set(name, &value);
            }

            let encoder = video.open_as_with(codec, opts).map_err(|e| {
                Error::Encode(format!(
                    "{encoder_name} refused {geometry} at {fps} fps: {e}"
                ))
            })?;
            stream.set_time_base(encoder_time_base);
            stream.set_parameters(&encoder);
            encoder
        };

        output.write_header()?;
        // The muxer may pick its own stream time base while writing the header
        let stream_time_base = output
            .stream(0)
            .map(|s| s.time_base())
            .ok_or_else(|| Error::Encode("muxer lost the video stream".into()))?;

        let scaler = ffmpeg::software::scaling::Context::get(
            ffmpeg::format::Pixel::RGB24,
            geometry.width,
            geometry.height,
            ffmpeg::format::Pixel::YUV420P,
            geometry.width,
            geometry.height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )?;
        let rgb_frame =
            ffmpeg::frame::Video::new(ffmpeg::format::Pixel::RGB24, geometry.width, geometry.height);

        tracing::debug!(
            encoder = encoder_name,
            %container,
            %geometry,
            ?stream_time_base,
            "opened in-process encoder"
        );

        Ok(Self {
            output,
            encoder,
            scaler,
            rgb_frame,
            encoder_time_base,
            stream_time_base,
            geometry,
            next_pts: 0,
        })
    }

    /// Encodes one frame of packed RGB24 rows at the opened geometry
    pub fn write_frame(&mut self, data: &[u8]) -> Result<()> {
        let row_bytes = self.geometry.width as usize * PixelFrame::FORMAT.bytes_per_pixel();
        if data.len() != row_bytes * self.geometry.height as usize {
            return Err(Error::Encode(format!(
                "frame buffer of {} bytes does not match {}",
                data.len(),
                self.geometry
            )));
        }

        // Copy RGB pixels into the frame (respecting stride)
        {
            let stride = self.rgb_frame.stride(0);
            let dst = self.rgb_frame.data_mut(0);
            for (y, row) in data.chunks_exact(row_bytes).enumerate() {
                let offset = y * stride;
                dst[offset..offset + row_bytes].copy_from_slice(row);
            }
        }

        // A fresh YUV frame each time: the encoder may keep a reference to
        // the previous one in its lookahead
        let mut yuv_frame = ffmpeg::frame::Video::empty();
        self.scaler.run(&self.rgb_frame, &mut yuv_frame)?;
        yuv_frame.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder.send_frame(&yuv_frame)?;
        self.write_packets()
    }

    /// Flushes the encoder and writes the container trailer
    pub fn finish(&mut self) -> Result<()> {
        self.encoder.send_eof()?;
        self.write_packets()?;
        self.output.write_trailer()?;
        Ok(())
    }

    fn write_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet.write_interleaved(&mut self.output)?;
        }
        Ok(())
    }
}
