//! Progress tracking for long-running years.
//!
//! A year of appellate opinions runs to a few thousand cases and, with the
//! polite delay, several hours. [`ProgressState`] computes percentages and a
//! remaining-time estimate and decides when a `[PROGRESS]` log line is due.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const MIN_RUN_DURATION: Duration = Duration::from_secs(30);

/// Progress tracking state for one year listing.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Cases processed so far.
    pub cases_processed: u64,
    /// Cases to process in this year.
    pub total_expected: u64,
    /// When processing started.
    pub start_time: Instant,
    /// Last time progress was reported.
    pub last_update: Instant,
    /// Minimum interval between time-based updates.
    pub update_interval: Duration,
    /// Cases per second.
    pub current_rate: f64,
    /// Label such as "supreme_court 2025".
    pub phase: String,
    /// Last reported completion percentage.
    pub last_reported_percentage: f64,
    /// Minimum percentage delta required to emit a new update.
    pub min_percentage_step: f64,
}

impl ProgressState {
    /// Tracker for `total_expected` cases.
    pub fn new(total_expected: u64, phase: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            cases_processed: 0,
            total_expected,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            current_rate: 0.0,
            phase: phase.into(),
            last_reported_percentage: 0.0,
            min_percentage_step: 10.0,
        }
    }

    /// Count one more processed case.
    pub fn record_case(&mut self) {
        self.cases_processed = self.cases_processed.saturating_add(1);
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.current_rate = self.cases_processed as f64 / elapsed;
        }
    }

    /// Whether a progress update should be emitted based on time or percentage.
    pub fn should_emit_update(&self) -> bool {
        if self.cases_processed == 0 {
            return false;
        }
        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }
        self.start_time.elapsed() >= MIN_RUN_DURATION
            && self.last_update.elapsed() >= self.update_interval
    }

    /// Call after emitting a progress log to reset timers and cached percentage.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Completion percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_expected == 0 {
            return 100.0;
        }
        (self.cases_processed as f64 / self.total_expected as f64) * 100.0
    }

    /// Remaining time at the current rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let remaining = self.total_expected.saturating_sub(self.cases_processed);
        if self.current_rate > 0.0 && remaining > 0 {
            Some(Duration::from_secs_f64(remaining as f64 / self.current_rate))
        } else {
            None
        }
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![
            format!(
                "[PROGRESS] Processed {}/{} cases - {:.1}% complete ({})",
                self.cases_processed,
                self.total_expected,
                self.percentage(),
                self.phase
            ),
        ];
        if self.current_rate > 0.0 {
            parts.push(format!("at {:.2} cases/sec", self.current_rate));
        }
        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }
        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
