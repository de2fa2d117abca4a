//! Exponential backoff with jitter.
//!
//! Both the socket transport (reconnects) and the resilient client (retries)
//! derive their waits from [`Backoff`]. The computation is a pure function of
//! the attempt number and a jitter sample, so it can be tested without timers.

use rand::Rng;
use std::time::Duration;

/// Lower edge of the jitter band.
const JITTER_FLOOR: f64 = 0.8;
/// Width of the jitter band (`0.8..=1.2`).
const JITTER_SPAN: f64 = 0.4;

/// Exponential backoff parameters.
///
/// The delay before attempt `n` (1-based) is
/// `min(initial * factor^(n-1), max) * (0.8 + jitter * 0.4)` with
/// `jitter` in `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Cap applied before jitter.
    pub max: Duration,
    /// Growth factor between consecutive attempts.
    pub factor: f64,
}

impl Backoff {
    /// Create a backoff with the given initial delay, cap and factor.
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            initial,
            max,
            factor,
        }
    }

    /// The capped delay for `attempt` before jitter is applied.
    ///
    /// Attempt `0` is treated like attempt `1`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial.as_secs_f64() * self.factor.powi(exponent);
        let capped = raw.min(self.max.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max)
    }

    /// The delay for `attempt` with an explicit jitter sample in `[0, 1]`.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.5
        };
        let band = JITTER_FLOOR + jitter * JITTER_SPAN;
        let scaled = self.base_delay(attempt).as_secs_f64() * band;
        Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX)
    }

    /// The delay for `attempt` with a freshly sampled jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..1.0);
        self.delay_with_jitter(attempt, jitter)
    }
}

impl Default for Backoff {
    /// One second doubling up to thirty seconds.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 2.0)
    }
}
