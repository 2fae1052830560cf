//! FILETIME conversion utilities.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// FILETIME epoch: January 1, 1601
// Unix epoch: January 1, 1970
// Difference: 11644473600 seconds
const FILETIME_UNIX_DIFF_SECS: u64 = 11_644_473_600;
const INTERVALS_PER_SEC: u64 = 10_000_000;

/// Convert SystemTime to the i64 FILETIME value used by PRJ_FILE_BASIC_INFO.
///
/// FILETIME counts 100-nanosecond intervals since January 1, 1601 UTC.
///
/// # Arguments
/// * `time` - System time to convert
///
/// # Returns
/// i64 representation of FILETIME.
pub fn systemtime_to_filetime_i64(time: SystemTime) -> i64 {
    let duration: Duration = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);

    let intervals: u64 = duration.as_secs() * INTERVALS_PER_SEC
        + duration.subsec_nanos() as u64 / 100
        + FILETIME_UNIX_DIFF_SECS * INTERVALS_PER_SEC;

    intervals as i64
}

/// FILETIME value for the current instant. Placeholder and directory-entry
/// timestamps are synthesized as "now"; no persisted times are maintained.
pub fn now_filetime_i64() -> i64 {
    systemtime_to_filetime_i64(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_epoch_value() {
        // Unix epoch in FILETIME intervals: 116444736000000000
        assert_eq!(systemtime_to_filetime_i64(UNIX_EPOCH), 116_444_736_000_000_000);
    }

    #[test]
    fn subsecond_precision() {
        let time: SystemTime = UNIX_EPOCH + Duration::new(1, 500);
        let intervals: i64 = systemtime_to_filetime_i64(time);
        assert_eq!(intervals, 116_444_736_000_000_000 + INTERVALS_PER_SEC as i64 + 5);
    }

    #[test]
    fn pre_epoch_clamps_to_epoch() {
        let before: SystemTime = UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(systemtime_to_filetime_i64(before), 116_444_736_000_000_000);
    }

    #[test]
    fn now_is_monotone_nonzero() {
        assert!(now_filetime_i64() > 116_444_736_000_000_000);
    }
}
