//! Quality (0-100) to backend rate-control mapping
//!
//! Every mapping is monotonic: a higher quality never yields a coarser
//! quantizer or a lower bitrate.

use minmpeg_core::{EncodeSpec, Geometry};

/// Bits per pixel used by bitrate-driven encoders at quality 0 and 100
const MIN_BPP: f64 = 0.02;
const MAX_BPP: f64 = 0.30;

fn inverted(quality: u8, scale: f64) -> u32 {
    let quality = quality.min(EncodeSpec::MAX_QUALITY);
    ((100 - quality) as f64 * scale / 100.0).round() as u32
}

/// CRF for libsvtav1 and libaom-av1: 63 (worst) down to 0
pub fn av1_crf(quality: u8) -> u32 {
    inverted(quality, 63.0)
}

/// Quantizer for librav1e: 255 (worst) down to 0
pub fn rav1e_qp(quality: u8) -> u32 {
    inverted(quality, 255.0)
}

/// CRF for libx264: 51 (worst) down to 0
pub fn x264_crf(quality: u8) -> u32 {
    inverted(quality, 51.0)
}

/// Target bitrate in bits per second for encoders without a constant
/// quality mode
pub fn h264_bitrate(geometry: Geometry, fps: u32, quality: u8) -> u64 {
    let quality = quality.min(EncodeSpec::MAX_QUALITY) as f64 / 100.0;
    let bpp = MIN_BPP + (MAX_BPP - MIN_BPP) * quality;
    let pixels_per_second = geometry.width as f64 * geometry.height as f64 * fps as f64;
    (pixels_per_second * bpp).round() as u64
}

/// Encoder private options for `encoder`, as libav option name/value pairs.
///
/// The same pairs are passed to the in-process encoder as an options
/// dictionary and to the ffmpeg executable as `-name value` arguments.
pub fn encoder_options(
    encoder: &str,
    quality: u8,
    geometry: Geometry,
    fps: u32,
    threads: usize,
) -> Vec<(&'static str, String)> {
    let mut options = Vec::new();
    match encoder {
        "libsvtav1" => {
            options.push(("crf", av1_crf(quality).to_string()));
            options.push(("preset", "8".to_string()));
        }
        "libaom-av1" => {
            // b=0 selects constant quality mode
            options.push(("crf", av1_crf(quality).to_string()));
            options.push(("b", "0".to_string()));
            options.push(("cpu-used", "6".to_string()));
            options.push(("row-mt", "1".to_string()));
        }
        "librav1e" => {
            options.push(("qp", rav1e_qp(quality).to_string()));
            options.push(("speed", "6".to_string()));
        }
        "libx264" => {
            options.push(("crf", x264_crf(quality).to_string()));
            options.push(("preset", "medium".to_string()));
        }
        _ => {
            options.push(("b", h264_bitrate(geometry, fps, quality).to_string()));
        }
    }
    if threads > 0 {
        options.push(("threads", threads.to_string()));
    }
    options
}
