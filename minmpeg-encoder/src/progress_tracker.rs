//! Progress tracking with ETA estimation

use std::time::{Duration, Instant};

/// Logs encode progress every `interval` frames with an ETA estimate
pub struct ProgressTracker {
    total: u64,
    processed: u64,
    interval: u64,
    start_time: Instant,
    label: String,
}

impl ProgressTracker {
    /// Creates a new progress tracker
    pub fn new(total: u64, interval: u64, label: impl Into<String>) -> Self {
        Self {
            total,
            processed: 0,
            interval: interval.max(1),
            start_time: Instant::now(),
            label: label.into(),
        }
    }

    /// Frames processed so far
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Counts one frame and logs progress on every interval boundary
    pub fn advance(&mut self) {
        self.processed += 1;
        if self.processed % self.interval == 0 && self.processed < self.total {
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let percent = self.processed as f64 / self.total as f64 * 100.0;
            let eta = estimate_remaining(self.processed, self.total, elapsed)
                .map(|d| format_duration(d.as_secs_f64()))
                .unwrap_or_else(|| "unknown".to_string());
            tracing::debug!(
                label = %self.label,
                frames = self.processed,
                total = self.total,
                "{:.1}% - elapsed: {} - ETA: {}",
                percent,
                format_duration(elapsed),
                eta,
            );
        }
    }

    /// Logs the completion line
    pub fn finish(&self) {
        tracing::info!(
            label = %self.label,
            frames = self.processed,
            "completed in {}",
            format_duration(self.start_time.elapsed().as_secs_f64()),
        );
    }
}

/// Remaining time at the average rate so far
fn estimate_remaining(processed: u64, total: u64, elapsed_secs: f64) -> Option<Duration> {
    if processed == 0 || processed >= total || elapsed_secs <= 0.0 {
        return None;
    }
    let rate = processed as f64 / elapsed_secs;
    Some(Duration::from_secs_f64((total - processed) as f64 / rate))
}

/// Formats seconds into a human-readable duration string
fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor() as u64;
        let remaining = secs - (mins as f64 * 60.0);
        format!("{}m {:.0}s", mins, remaining)
    } else {
        let hours = (secs / 3600.0).floor() as u64;
        let remaining = secs - (hours as f64 * 3600.0);
        let mins = (remaining / 60.0).floor() as u64;
        let remaining_secs = remaining - (mins as f64 * 60.0);
        format!("{}h {}m {:.0}s", hours, mins, remaining_secs)
    }
}
