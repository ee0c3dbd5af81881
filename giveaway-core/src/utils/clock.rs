use std::time::Duration;
use time::OffsetDateTime;

/// Source of "now" for deadline decisions, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Time left until `deadline`, zero if it already passed.
pub fn time_until(deadline: OffsetDateTime, now: OffsetDateTime) -> Duration {
    Duration::try_from(deadline - now).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_time_until_saturates() {
        let now = datetime!(2026-01-01 12:00 UTC);
        assert_eq!(
            time_until(datetime!(2026-01-01 12:01 UTC), now),
            Duration::from_secs(60)
        );
        assert_eq!(time_until(datetime!(2026-01-01 11:00 UTC), now), Duration::ZERO);
    }
}
