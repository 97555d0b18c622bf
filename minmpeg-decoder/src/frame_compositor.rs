//! Frame compositor: pure per-frame transforms
//!
//! Every function takes ownership of its input where the result can reuse
//! the buffer, so frames are moved rather than copied when nothing changes.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use minmpeg_core::{Color, PixelFrame};

/// Filter used by [`resize`]; fixed so output is reproducible
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Scales a frame to exactly `target_width` x `target_height` (bilinear).
///
/// Aspect ratio is not preserved; callers wanting letterboxing pad
/// explicitly.
pub fn resize(frame: PixelFrame, target_width: u32, target_height: u32) -> PixelFrame {
    assert!(
        target_width > 0 && target_height > 0,
        "resize target must be non-empty"
    );
    if frame.width() == target_width && frame.height() == target_height {
        return frame;
    }
    let resized = imageops::resize(frame.as_image(), target_width, target_height, RESIZE_FILTER);
    PixelFrame::from_image(resized)
}

/// Places `frame` at (0, 0) of a `target_width` x `target_height` canvas
/// filled with `background`.
///
/// Anything of the source that falls outside the canvas is cropped.
pub fn pad_top_align(
    frame: PixelFrame,
    target_width: u32,
    target_height: u32,
    background: Color,
) -> PixelFrame {
    if frame.width() == target_width && frame.height() == target_height {
        return frame;
    }

    let mut canvas = RgbImage::from_pixel(target_width, target_height, Rgb(background.to_rgb()));
    let copy_width = frame.width().min(target_width) as usize * PixelFrame::FORMAT.bytes_per_pixel();
    let dst_stride = target_width as usize * PixelFrame::FORMAT.bytes_per_pixel();

    {
        let dst: &mut [u8] = &mut canvas;
        for y in 0..frame.height().min(target_height) {
            let row = &frame.row(y)[..copy_width];
            let start = y as usize * dst_stride;
            dst[start..start + copy_width].copy_from_slice(row);
        }
    }

    PixelFrame::from_image(canvas)
}

/// Joins two frames of equal height side by side
pub fn concat_horizontal(left: &PixelFrame, right: &PixelFrame) -> PixelFrame {
    assert_eq!(
        left.height(),
        right.height(),
        "concat_horizontal needs frames of equal height"
    );

    let width = left.width() + right.width();
    let mut joined = RgbImage::new(width, left.height());
    if width == 0 || left.height() == 0 {
        return PixelFrame::from_image(joined);
    }

    let left_len = left.width() as usize * PixelFrame::FORMAT.bytes_per_pixel();
    {
        let dst: &mut [u8] = &mut joined;
        for (y, row) in dst
            .chunks_exact_mut(width as usize * PixelFrame::FORMAT.bytes_per_pixel())
            .enumerate()
        {
            row[..left_len].copy_from_slice(left.row(y as u32));
            row[left_len..].copy_from_slice(right.row(y as u32));
        }
    }
    PixelFrame::from_image(joined)
}

/// Repeats a frame: the result is pixel-identical to the input.
///
/// Used to keep showing a still slide, or the last frame of a video that ran
/// out before the other side of a juxtaposition.
pub fn hold(frame: &PixelFrame) -> PixelFrame {
    frame.clone()
}
