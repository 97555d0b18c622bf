//! Slide timing and output clock helpers

use crate::{Error, Result, OUTPUT_FPS};
use std::path::PathBuf;

/// One still image of a slideshow and how long it stays on screen
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlideEntry {
    /// Path to the image file
    pub path: PathBuf,
    /// Display duration in milliseconds, must be positive
    pub duration_ms: u32,
}

impl SlideEntry {
    /// Creates a new slide entry
    pub fn new(path: impl Into<PathBuf>, duration_ms: u32) -> Self {
        Self {
            path: path.into(),
            duration_ms,
        }
    }

    /// Parses a JSON array of `{"path": ..., "duration_ms": ...}` objects
    #[cfg(feature = "serde")]
    pub fn parse_manifest(json: &str) -> Result<Vec<SlideEntry>> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Number of output frames covering `duration_ms`, rounded to nearest
pub fn frames_for_duration(duration_ms: u64) -> u64 {
    (duration_ms * OUTPUT_FPS as u64 + 500) / 1000
}

/// Presentation time of output tick `tick` in microseconds (floored)
pub fn tick_time_us(tick: u64) -> u64 {
    tick * 1_000_000 / OUTPUT_FPS as u64
}

/// Computes how many output frames each slide is held for.
///
/// Frame boundaries are rounded on the cumulative timeline, so the total is
/// exactly `frames_for_duration(sum of durations)` and every slide is within
/// one frame of its own rounded duration. Slides shorter than half a frame
/// may get zero frames.
pub fn plan_slides(entries: &[SlideEntry]) -> Result<Vec<u64>> {
    if entries.is_empty() {
        return Err(Error::invalid("No slides provided"));
    }

    let mut counts = Vec::with_capacity(entries.len());
    let mut elapsed_ms: u64 = 0;
    let mut emitted: u64 = 0;

    for (index, entry) in entries.iter().enumerate() {
        if entry.duration_ms == 0 {
            return Err(Error::invalid(format!(
                "slide {index} ({}) has a zero duration",
                entry.path.display()
            )));
        }
        elapsed_ms += entry.duration_ms as u64;
        let boundary = frames_for_duration(elapsed_ms);
        counts.push(boundary - emitted);
        emitted = boundary;
    }

    if emitted == 0 {
        return Err(Error::invalid(format!(
            "slideshow lasts {elapsed_ms} ms, too short for a single frame"
        )));
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slides(durations: &[u32]) -> Vec<SlideEntry> {
        durations
            .iter()
            .enumerate()
            .map(|(i, &d)| SlideEntry::new(format!("slide{i}.png"), d))
            .collect()
    }

    #[test]
    fn test_three_one_second_slides() {
        let counts = plan_slides(&slides(&[1000, 1000, 1000])).unwrap();
        assert_eq!(counts, vec![30, 30, 30]);
        assert_eq!(counts.iter().sum::<u64>(), 90);
    }

    #[test]
    fn test_cumulative_rounding_stays_within_one_frame() {
        let durations = [1010, 17, 333, 1250, 49, 2001];
        let counts = plan_slides(&slides(&durations)).unwrap();
        let total_ms: u64 = durations.iter().map(|&d| d as u64).sum();
        assert_eq!(counts.iter().sum::<u64>(), frames_for_duration(total_ms));

        for (count, &d) in counts.iter().zip(durations.iter()) {
            let own = frames_for_duration(d as u64) as i64;
            assert!((*count as i64 - own).abs() <= 1, "{count} vs {own}");
        }
    }

    #[test]
    fn test_invalid_slide_lists() {
        assert!(matches!(plan_slides(&[]), Err(Error::InvalidInput(_))));
        assert!(matches!(
            plan_slides(&slides(&[500, 0])),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            plan_slides(&slides(&[10])),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_clock_helpers() {
        assert_eq!(frames_for_duration(1000), 30);
        assert_eq!(frames_for_duration(2000), 60);
        assert_eq!(frames_for_duration(16), 0);
        assert_eq!(frames_for_duration(17), 1);
        assert_eq!(tick_time_us(0), 0);
        assert_eq!(tick_time_us(1), 33_333);
        assert_eq!(tick_time_us(30), 1_000_000);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_parse_manifest() {
        let json = r#"[{"path": "a.png", "duration_ms": 500}, {"path": "b.jpg", "duration_ms": 1500}]"#;
        let entries = SlideEntry::parse_manifest(json).unwrap();
        assert_eq!(entries, vec![SlideEntry::new("a.png", 500), SlideEntry::new("b.jpg", 1500)]);
        assert!(SlideEntry::parse_manifest("{}").is_err());
    }
}
