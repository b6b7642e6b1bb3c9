//! Polite request pacing
//!
//! The court site is a public service; every request is preceded by a random
//! pause drawn uniformly from a configured range.

use super::config::{POLITE_DELAY_MAX_MS, POLITE_DELAY_MIN_MS};
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Randomized delay applied before each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoliteDelay {
    min: Duration,
    max: Duration,
}

impl Default for PoliteDelay {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(POLITE_DELAY_MIN_MS),
            Duration::from_millis(POLITE_DELAY_MAX_MS),
        )
    }
}

impl PoliteDelay {
    /// Delay drawn from `[min, max]`. Bounds given in the wrong order are swapped.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// No delay at all.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Lower bound.
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw one delay.
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let millis = rand::thread_rng().gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(millis as u64)
    }

    /// Sleep for one sampled delay and return it.
    pub async fn wait(&self) -> Duration {
        let delay = self.sample();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        delay
    }
}
