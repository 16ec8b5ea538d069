//! Physical time
//!
//! All timestamps in the core are Unix milliseconds obtained through
//! [`crate::effects::PhysicalTimeEffects`], so tests can drive time explicitly.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Milliseconds in one hour.
pub const HOUR_MS: u64 = 3_600_000;

/// Milliseconds in one day.
pub const DAY_MS: u64 = 24 * HOUR_MS;

/// Wall-clock instant in Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PhysicalTime {
    /// Milliseconds since the Unix epoch
    pub ts_ms: u64,
}

impl PhysicalTime {
    /// Build from Unix milliseconds.
    pub const fn from_millis(ts_ms: u64) -> Self {
        Self { ts_ms }
    }

    /// Instant `duration` after this one (saturating).
    pub fn saturating_add(self, duration: Duration) -> Self {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self::from_millis(self.ts_ms.saturating_add(ms))
    }

    /// Instant `ms` milliseconds before this one (saturating at the epoch).
    pub fn saturating_sub_ms(self, ms: u64) -> Self {
        Self::from_millis(self.ts_ms.saturating_sub(ms))
    }

    /// Milliseconds elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn millis_since(self, earlier: PhysicalTime) -> u64 {
        self.ts_ms.saturating_sub(earlier.ts_ms)
    }

    /// Hour of day (UTC, 0..24) for access-pattern bucketing.
    pub fn hour_of_day(self) -> u8 {
        ((self.ts_ms % DAY_MS) / HOUR_MS) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_saturates() {
        let t = PhysicalTime::from_millis(1_000);
        assert_eq!(t.saturating_sub_ms(5_000).ts_ms, 0);
        assert_eq!(t.saturating_add(Duration::from_secs(1)).ts_ms, 2_000);
        assert_eq!(t.millis_since(PhysicalTime::from_millis(4_000)), 0);
    }

    #[test]
    fn hour_bucket() {
        let t = PhysicalTime::from_millis(DAY_MS * 3 + HOUR_MS * 13 + 59_000);
        assert_eq!(t.hour_of_day(), 13);
    }
}
