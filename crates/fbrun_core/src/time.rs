//! Time types for fbrun.
//!
//! Watch samples are stamped relative to the device start, not with wall
//! clock time. The reference is monotonic so stamps never go backwards.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Milliseconds elapsed since the device clock started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The device start
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create from raw milliseconds
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Get raw milliseconds
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Device-wide monotonic clock
///
/// Created once by the manager and copied into every configuration, so
/// all watch samples of a device share one reference.
#[derive(Debug, Clone, Copy)]
pub struct DeviceClock {
    start: Instant,
}

impl DeviceClock {
    /// Start a new clock now
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Time elapsed since the clock started
    #[must_use]
    pub fn now(&self) -> Timestamp {
        let millis = self.start.elapsed().as_millis();
        Timestamp(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

impl Default for DeviceClock {
    fn default() -> Self {
        Self::start()
    }
}
