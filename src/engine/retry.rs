//! Bounded retries and wall-clock waits.
//!
//! Every "poll until the device says so" loop in the harness goes through
//! [`retry_until`], so a device that never reaches the awaited state produces
//! [`HarnessError::DeviceUnresponsive`] instead of hanging the run.

use crate::error::{AppResult, HarnessError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Defines a policy for retrying a probe.
///
/// # Example
///
/// ```rust
/// use wolksensor_harness::engine::retry::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::for_window(Duration::from_secs(30), Duration::from_millis(250));
/// assert_eq!(policy.max_attempts, 120);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of probes, including the first. Never less than one.
    pub max_attempts: u32,

    /// Constant delay between probes.
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    /// 3 attempts with 100ms between them.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Enough attempts at `interval` spacing to cover `window`.
    pub fn for_window(window: Duration, interval: Duration) -> Self {
        let attempts = if interval.is_zero() {
            1
        } else {
            (window.as_nanos() / interval.as_nanos()).clamp(1, u128::from(u32::MAX)) as u32
        };
        Self {
            max_attempts: attempts,
            backoff_delay: interval,
        }
    }

    /// Same spacing with a fixed attempt count, at least one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Runs `probe` until it returns `Ok(true)`.
///
/// Returns the number of attempts used. Errors from the probe abort the loop
/// at once; running out of attempts yields
/// [`HarnessError::DeviceUnresponsive`] naming `waited_for`.
pub fn retry_until<F>(policy: &RetryPolicy, waited_for: &str, mut probe: F) -> AppResult<u32>
where
    F: FnMut() -> AppResult<bool>,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if probe()? {
            debug!(waited_for, attempt, "Condition reached");
            return Ok(attempt);
        }
        if attempt < max_attempts && !policy.backoff_delay.is_zero() {
            std::thread::sleep(policy.backoff_delay);
        }
    }

    let elapsed = start.elapsed();
    warn!(waited_for, attempts = max_attempts, ?elapsed, "Gave up waiting");
    Err(HarnessError::DeviceUnresponsive {
        waited_for: waited_for.to_string(),
        attempts: max_attempts,
        elapsed,
    })
}

/// Sleeps for `duration`, logging the remaining whole seconds as it goes.
///
/// The wait always runs to completion; the device's own timers are what is
/// being measured.
pub fn countdown(duration: Duration, label: &str) {
    if duration.is_zero() {
        return;
    }
    let mut remaining = duration;
    while !remaining.is_zero() {
        crate::report!("{:>3}s | {}", remaining.as_secs_f64().ceil() as u64, label);
        let step = remaining.min(Duration::from_secs(1));
        std::thread::sleep(step);
        remaining -= step;
    }
}
