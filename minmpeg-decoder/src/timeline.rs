//! Timeline builders: lay source media out on the 30 fps output clock
//!
//! Both builders are iterators, so a whole output video is never held in
//! memory. The first error ends the sequence.

use crate::frame_compositor::{concat_horizontal, hold, pad_top_align, resize};
use crate::video_reader::{DecodedFrame, VideoSource};
use crate::{decode_image, Error, Result};
use minmpeg_core::timeline::{frames_for_duration, tick_time_us};
use minmpeg_core::{plan_slides, Color, Geometry, PixelFrame, SlideEntry};

/// Output frames of a slideshow: each slide held for its planned frame count
pub struct SlideshowFrames<'a> {
    entries: &'a [SlideEntry],
    counts: Vec<u64>,
    geometry: Geometry,
    first: Option<PixelFrame>,
    current: Option<PixelFrame>,
    next_slide: usize,
    remaining: u64,
    emitted: u64,
    total_frames: u64,
    failed: bool,
}

impl<'a> SlideshowFrames<'a> {
    /// Plans the slideshow and decodes the first slide, which fixes the
    /// output geometry
    pub fn new(entries: &'a [SlideEntry]) -> Result<Self> {
        let counts = plan_slides(entries)?;
        let first = decode_image(&entries[0].path)?;
        let geometry = first.geometry();
        let total_frames = counts.iter().sum();

        tracing::debug!(
            slides = entries.len(),
            total_frames,
            %geometry,
            "planned slideshow"
        );

        Ok(Self {
            entries,
            counts,
            geometry,
            first: Some(first),
            current: None,
            next_slide: 0,
            remaining: 0,
            emitted: 0,
            total_frames,
            failed: false,
        })
    }

    /// Geometry of every output frame
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Number of frames the iterator yields when no slide fails to decode
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Frames planned per slide
    pub fn frame_counts(&self) -> &[u64] {
        &self.counts
    }

    fn load_slide(&mut self, index: usize) -> Result<PixelFrame> {
        if let Some(first) = self.first.take() {
            return Ok(first);
        }
        let entry = &self.entries[index];
        let image = decode_image(&entry.path)?;
        if image.geometry() != self.geometry {
            tracing::debug!(
                path = %entry.path.display(),
                from = %image.geometry(),
                to = %self.geometry,
                "resizing slide"
            );
        }
        Ok(resize(image, self.geometry.width, self.geometry.height))
    }
}

impl Iterator for SlideshowFrames<'_> {
    type Item = Result<PixelFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        while self.remaining == 0 {
            if self.next_slide >= self.entries.len() {
                return None;
            }
            let index = self.next_slide;
            self.next_slide += 1;

            // Slides planned for zero frames are still decoded so a broken
            // file is reported rather than skipped
            match self.load_slide(index) {
                Ok(frame) => {
                    self.current = Some(frame);
                    self.remaining = self.counts[index];
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        self.remaining -= 1;
        self.emitted += 1;
        let frame = if self.remaining == 0 {
            self.current.take()
        } else {
            self.current.as_ref().map(hold)
        };
        frame.map(Ok)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let left = self.total_frames.saturating_sub(self.emitted) as usize;
        (0, Some(left))
    }
}

/// One input of a juxtaposition, normalised to its padded output column
struct Side<S> {
    source: S,
    native: Geometry,
    height: u32,
    background: Color,
    current: PixelFrame,
    pending: Option<DecodedFrame>,
}

impl<S: VideoSource> Side<S> {
    fn open(mut source: S, height: u32, background: Color) -> Result<Self> {
        let native = source.geometry();
        let first = source
            .next()
            .transpose()?
            .ok_or_else(|| Error::EmptyVideo(source.path().to_path_buf()))?;
        let pending = source.next().transpose()?;
        let current = normalise(first.frame, native, height, background);

        Ok(Self {
            source,
            native,
            height,
            background,
            current,
            pending,
        })
    }

    /// Moves to the latest source frame presented at or before `tick_us`.
    /// Once the source is exhausted the last frame is kept.
    fn advance_to(&mut self, tick_us: u64) -> Result<()> {
        let mut latest = None;
        while self.pending.as_ref().is_some_and(|f| f.pts_us <= tick_us) {
            latest = self.pending.take();
            self.pending = self.source.next().transpose()?;
        }
        if let Some(decoded) = latest {
            self.current = normalise(decoded.frame, self.native, self.height, self.background);
        }
        Ok(())
    }
}

fn normalise(frame: PixelFrame, native: Geometry, height: u32, background: Color) -> PixelFrame {
    let frame = resize(frame, native.width, native.height);
    pad_top_align(frame, native.width, height, background)
}

/// Output frames of two videos placed side by side.
///
/// Each side keeps its native size, top-aligned over `background`; the shorter
/// video holds its last frame until the longer one ends.
pub struct JuxtaposeFrames<S: VideoSource> {
    left: Side<S>,
    right: Side<S>,
    geometry: Geometry,
    tick: u64,
    total_frames: u64,
    failed: bool,
}

impl<S: VideoSource> JuxtaposeFrames<S> {
    /// Reads the first frame of both sources and fixes the output layout
    pub fn new(left: S, right: S, background: Color) -> Result<Self> {
        let (left_geometry, right_geometry) = (left.geometry(), right.geometry());
        if left_geometry.is_degenerate() || right_geometry.is_degenerate() {
            return Err(minmpeg_core::Error::invalid(format!(
                "cannot juxtapose {left_geometry} with {right_geometry}"
            ))
            .into());
        }

        let geometry = Geometry::side_by_side(left_geometry, right_geometry);
        let duration_ms = left.duration_ms().max(right.duration_ms());
        let total_frames = frames_for_duration(duration_ms).max(1);

        tracing::debug!(
            left = %left_geometry,
            right = %right_geometry,
            output = %geometry,
            duration_ms,
            total_frames,
            "planned juxtaposition"
        );

        Ok(Self {
            left: Side::open(left, geometry.height, background)?,
            right: Side::open(right, geometry.height, background)?,
            geometry,
            tick: 0,
            total_frames,
            failed: false,
        })
    }

    /// Geometry of every output frame
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Number of frames the iterator yields when both sources decode cleanly
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}

impl<S: VideoSource> Iterator for JuxtaposeFrames<S> {
    type Item = Result<PixelFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.tick >= self.total_frames {
            return None;
        }

        let now = tick_time_us(self.tick);
        if let Err(e) = self.left.advance_to(now) {
            self.failed = true;
            return Some(Err(e));
        }
        if let Err(e) = self.right.advance_to(now) {
            self.failed = true;
            return Some(Err(e));
        }

        self.tick += 1;
        Some(Ok(concat_horizontal(&self.left.current, &self.right.current)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let left = self.total_frames.saturating_sub(self.tick) as usize;
        (0, Some(left))
    }
}
