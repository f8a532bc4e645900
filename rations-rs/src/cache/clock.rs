//! Provides the time source used to decide whether a cached snapshot is still fresh.
//!
//! The cache never calls `Instant::now()` itself. Instead a [Clock] is injected so that tests
//! can step time forward deterministically using a [ManualClock].
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Yields the current point in time.
///
/// Two flavours are provided: a monotonic instant which is used for all TTL computations and a
/// wall clock timestamp which is only reported to callers (e.g. "computed at 12:03").
pub trait Clock: Send + Sync {
    /// Returns the current monotonic instant.
    fn now(&self) -> Instant;

    /// Returns the current wall clock time.
    fn wall_time(&self) -> DateTime<Utc>;
}

/// The clock used in production, backed by the system timers.
#[derive(Default, Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock which only advances when told so.
///
/// # Examples
/// ```
/// # use rations::cache::{Clock, ManualClock};
/// # use std::time::Duration;
/// let clock = ManualClock::new();
/// let start = clock.now();
///
/// clock.advance(Duration::from_secs(90));
/// assert_eq!(clock.now() - start, Duration::from_secs(90));
/// ```
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a new clock which is frozen at the current point in time.
    pub fn new() -> Self {
        ManualClock {
            origin: Instant::now(),
            wall_origin: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward by the given amount.
    pub fn advance(&self, duration: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *offset += duration;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset()
    }

    fn wall_time(&self) -> DateTime<Utc> {
        self.wall_origin
            + chrono::Duration::from_std(self.offset()).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
