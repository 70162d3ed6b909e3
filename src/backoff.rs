//! Linear, capped reconnect delays for the Workload API watch loops.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Default delay of the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound for any retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Reconnect delay state shared by one client's watch loops.
///
/// Every call to [`Backoff::duration`] increments the attempt counter and
/// returns `min(initial_delay * attempt, max_delay)`. With the defaults the
/// sequence is 1s, 2s, 3s, ..., 30s, 30s, ...
///
/// The counter is atomic, so concurrent watch tasks sharing one `Backoff`
/// never lose an increment or a reset.
///
/// # Examples
///
/// ```
/// use spiffe_workload::backoff::Backoff;
/// use std::time::Duration;
///
/// let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(250));
/// assert_eq!(backoff.duration(), Duration::from_millis(100));
/// assert_eq!(backoff.duration(), Duration::from_millis(200));
/// assert_eq!(backoff.duration(), Duration::from_millis(250));
///
/// backoff.reset();
/// assert_eq!(backoff.duration(), Duration::from_millis(100));
/// ```
#[derive(Debug)]
pub struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    attempt: AtomicU32,
}

impl Backoff {
    /// Creates a backoff with the given first delay and cap.
    ///
    /// A `max_delay` smaller than `initial_delay` caps every delay at `max_delay`.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            attempt: AtomicU32::new(0),
        }
    }

    /// Returns the next delay and advances the attempt counter.
    pub fn duration(&self) -> Duration {
        let attempt = self
            .attempt
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1);

        self.initial_delay
            .checked_mul(attempt)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Restarts the sequence; the next [`Backoff::duration`] returns the initial delay.
    pub fn reset(&self) {
        self.attempt.store(0, Ordering::Release);
    }

    /// Number of delays handed out since construction or the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Acquire)
    }

    /// First delay of the sequence.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Upper bound of the sequence.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl Clone for Backoff {
    /// Clones the configuration; the clone starts with a fresh counter.
    fn clone(&self) -> Self {
        Self::new(self.initial_delay, self.max_delay)
    }
}
