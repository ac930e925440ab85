//! Timestamp utilities

use chrono::{DateTime, Duration, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Longest offset accepted by [`after_secs`] (100 years)
const MAX_OFFSET_SECS: u64 = 100 * 365 * 24 * 3600;

/// Timestamp `secs` seconds after `from`, capped at 100 years
pub fn after_secs(from: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    from + Duration::seconds(secs.min(MAX_OFFSET_SECS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // After 2000-01-01, before 2100-01-01
        assert!(timestamp.timestamp() > 946_684_800);
        assert!(timestamp.timestamp() < 4_102_444_800);
    }

    #[test]
    fn test_after_secs_adds_offset() {
        let base = now();
        let later = after_secs(base, 300);
        assert_eq!((later - base).num_seconds(), 300);
    }

    #[test]
    fn test_after_secs_zero() {
        let base = now();
        assert_eq!(after_secs(base, 0), base);
    }
}
