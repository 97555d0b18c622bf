//! Pixel frame data structures

use crate::{Color, Error, Result};
use image::{Rgb, RgbImage};

/// Pixel layout of every frame in a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit R, G, B
    Rgb24,
}

impl PixelFormat {
    /// Number of bytes used by one pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
        }
    }
}

/// Width and height shared by every frame of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    /// Creates a new geometry
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Geometry of two frames placed side by side, top-aligned
    pub fn side_by_side(left: Geometry, right: Geometry) -> Self {
        Self {
            width: left.width + right.width,
            height: left.height.max(right.height),
        }
    }

    /// Returns true if either dimension is zero
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Smallest geometry with even dimensions that contains this one
    pub fn even_ceil(&self) -> Self {
        Self {
            width: (self.width + 1) & !1,
            height: (self.height + 1) & !1,
        }
    }

    /// Size in bytes of one frame with this geometry
    pub fn frame_len(&self, format: PixelFormat) -> usize {
        self.width as usize * self.height as usize * format.bytes_per_pixel()
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single RGB24 frame.
///
/// The buffer is always exactly `width * height * 3` bytes; frames are moved
/// between pipeline stages rather than shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFrame {
    image: RgbImage,
}

impl PixelFrame {
    /// Pixel format of every frame
    pub const FORMAT: PixelFormat = PixelFormat::Rgb24;

    /// Creates a frame from a raw RGB24 buffer
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = Geometry::new(width, height).frame_len(Self::FORMAT);
        if data.len() != expected {
            return Err(Error::invalid(format!(
                "frame buffer is {} bytes, expected {expected} for {width}x{height} RGB24",
                data.len()
            )));
        }
        RgbImage::from_raw(width, height, data)
            .map(Self::from_image)
            .ok_or_else(|| Error::invalid("frame buffer does not match its dimensions"))
    }

    /// Creates a frame filled with a single color
    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        Self::from_image(RgbImage::from_pixel(width, height, Rgb(color.to_rgb())))
    }

    /// Wraps an already decoded RGB image
    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.width(), self.height())
    }

    /// Raw RGB24 bytes, row-major without padding
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Bytes of row `y`
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width() as usize * Self::FORMAT.bytes_per_pixel();
        let start = y as usize * stride;
        &self.image.as_raw()[start..start + stride]
    }

    /// Color of the pixel at (`x`, `y`)
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        let Rgb([r, g, b]) = *self.image.get_pixel(x, y);
        Color { r, g, b }
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_length() {
        assert!(PixelFrame::new(2, 2, vec![0; 11]).is_err());
        let frame = PixelFrame::new(2, 2, vec![7; 12]).unwrap();
        assert_eq!(frame.geometry(), Geometry::new(2, 2));
        assert_eq!(frame.as_bytes().len(), 12);
    }

    #[test]
    fn test_filled_and_rows() {
        let frame = PixelFrame::filled(3, 2, Color::new(1, 2, 3));
        assert_eq!(frame.row(1), &[1, 2, 3, 1, 2, 3, 1, 2, 3]);
        assert_eq!(frame.pixel(2, 1), Color::new(1, 2, 3));
    }

    #[test]
    fn test_geometry_helpers() {
        let g = Geometry::side_by_side(Geometry::new(100, 100), Geometry::new(50, 80));
        assert_eq!(g, Geometry::new(150, 100));
        assert_eq!(Geometry::new(151, 99).even_ceil(), Geometry::new(152, 100));
        assert!(Geometry::new(0, 10).is_degenerate());
        assert_eq!(Geometry::new(4, 2).frame_len(PixelFormat::Rgb24), 24);
    }
}
