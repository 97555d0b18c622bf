//! Still image decoding

use crate::{Error, Result};
use minmpeg_core::PixelFrame;
use std::path::Path;

/// `ftyp` brands that identify an AVIF still or sequence
const AVIF_BRANDS: [&[u8; 4]; 2] = [b"avif", b"avis"];

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Decodes an image file into an RGB24 frame.
///
/// AVIF files are decoded with libavif; every other format is sniffed from
/// its contents by the `image` crate. Empty or truncated files are rejected
/// instead of producing a partial frame.
pub fn decode_image(path: &Path) -> Result<PixelFrame> {
    let data = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_image_bytes(path, &data)
}

/// Decodes in-memory image bytes; `path` is only used in error messages
pub fn decode_image_bytes(path: &Path, data: &[u8]) -> Result<PixelFrame> {
    if data.is_empty() {
        return Err(Error::Decode(format!("image '{}' is empty", path.display())));
    }

    let img = if is_avif(data) {
        libavif_image::read(data).map_err(|e| Error::AvifDecode {
            path: path.to_path_buf(),
            message: format!("{:?}", e),
        })?
    } else {
        // The JPEG decoder fills a cut-off scan with grey instead of failing
        if data.starts_with(&JPEG_SOI) && !has_jpeg_eoi(data) {
            return Err(Error::Decode(format!(
                "image '{}' is truncated: JPEG end marker missing",
                path.display()
            )));
        }
        image::load_from_memory(data).map_err(|source| Error::Image {
            path: path.to_path_buf(),
            source,
        })?
    };

    let rgb = img.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(Error::Decode(format!(
            "image '{}' has no pixels",
            path.display()
        )));
    }

    tracing::trace!(path = %path.display(), width = rgb.width(), height = rgb.height(), "decoded image");
    Ok(PixelFrame::from_image(rgb))
}

fn is_avif(data: &[u8]) -> bool {
    data.len() >= 12 && &data[4..8] == b"ftyp" && AVIF_BRANDS.iter().any(|b| &data[8..12] == *b)
}

/// Whether the data ends with the EOI marker, ignoring trailing zero or
/// whitespace padding
fn has_jpeg_eoi(data: &[u8]) -> bool {
    let end = data
        .iter()
        .rposition(|&b| b != 0 && !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    data[..end].ends_with(&JPEG_EOI)
}
