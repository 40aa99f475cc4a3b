//! # Clock
//!
//! Wall-clock source for frame timestamps.

use chrono::{TimeZone, Utc};

/// Milliseconds since the Unix epoch, or 0 while the clock is not synced
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// System wall clock
///
/// A host that has never synced its clock typically boots at or near the
/// epoch; anything before 2020-01-01 is reported as unsynced.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    fn synced_after_ms() -> i64 {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
            .single()
            .map(|t| t.timestamp_millis())
            .unwrap_or(0)
    }

    fn normalize(now_ms: i64) -> u64 {
        if now_ms < Self::synced_after_ms() {
            0
        } else {
            now_ms as u64
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Self::normalize(Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_synced_on_test_hosts() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_unsynced_time_reports_zero() {
        assert_eq!(SystemClock::normalize(0), 0);
        assert_eq!(SystemClock::normalize(86_400_000), 0);
        assert_eq!(SystemClock::normalize(1_577_836_799_999), 0);
        assert_eq!(SystemClock::normalize(1_577_836_800_000), 1_577_836_800_000);
    }
}
