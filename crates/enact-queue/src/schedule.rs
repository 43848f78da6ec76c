use chrono::{DateTime, Duration, Utc};

use crate::types::Schedule;

/// Next run of `schedule` after a run that ended at `from`.
///
/// Returns `None` when the schedule is exhausted (a `Once` job after its run).
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Once => None,
        Schedule::Interval { every_secs } => {
            let period = Duration::try_seconds(i64::try_from(*every_secs).ok()?)?;
            from.checked_add_signed(period)
        }
    }
}

/// Delay before retrying after failed attempt number `attempt` (1-based):
/// `base * 2^(attempt-1)`, capped at `max`.
pub fn retry_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let factor = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    let ms = base_ms.saturating_mul(factor).min(max_ms);
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_has_no_next_run() {
        assert_eq!(compute_next_run(&Schedule::Once, Utc::now()), None);
    }

    #[test]
    fn interval_adds_period() {
        let now = Utc::now();
        let next = compute_next_run(&Schedule::Interval { every_secs: 300 }, now).unwrap();
        assert_eq!(next - now, Duration::seconds(300));
    }

    #[test]
    fn backoff_doubles_until_cap() {
        assert_eq!(retry_delay(1, 1_000, 60_000), Duration::milliseconds(1_000));
        assert_eq!(retry_delay(2, 1_000, 60_000), Duration::milliseconds(2_000));
        assert_eq!(retry_delay(3, 1_000, 60_000), Duration::milliseconds(4_000));
        assert_eq!(retry_delay(10, 1_000, 60_000), Duration::milliseconds(60_000));
        assert_eq!(retry_delay(200, 1_000, 60_000), Duration::milliseconds(60_000));
    }

    #[test]
    fn zero_base_means_immediate_retry() {
        assert_eq!(retry_delay(3, 0, 60_000), Duration::zero());
    }
}
