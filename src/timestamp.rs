//! Block height to wall-clock estimation
//!
//! Chia targets 4608 blocks per 24 hours, but netspace growth between
//! difficulty resets speeds blocks up by roughly 8% a day. Heights are
//! therefore mapped to time with an empirically fitted block interval of
//! `86400 / (4608 * 1.08)` seconds, anchored at the timestamp of block 0.

use crate::error::{LedgerError, Result};
use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Observed timestamp of block 0.
pub const GENESIS_TIMESTAMP: u64 = 1_616_162_474;

/// Blocks per difficulty epoch.
pub const EPOCH_BLOCKS: u64 = 4608;

/// Empirical daily acceleration between difficulty resets.
pub const DAILY_GROWTH_FACTOR: f64 = 1.08;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Average block interval, for display only. Estimation uses the exact
/// ratio below.
pub const SECONDS_PER_BLOCK: f64 = SECONDS_PER_DAY as f64 / (EPOCH_BLOCKS as f64 * DAILY_GROWTH_FACTOR);

// SECONDS_PER_BLOCK as an exact fraction: 86400 * 100 / (4608 * 108).
const GROWTH_PERCENT: u128 = 108;
const BLOCK_SECONDS_NUM: u128 = SECONDS_PER_DAY as u128 * 100;
const BLOCK_SECONDS_DEN: u128 = EPOCH_BLOCKS as u128 * GROWTH_PERCENT;

/// Estimates the UNIX timestamp of the block at `height`.
///
/// `round(height * SECONDS_PER_BLOCK) + GENESIS_TIMESTAMP`, rounding half
/// away from zero. Integer arithmetic keeps the result identical on every
/// platform; it saturates at `u64::MAX` for absurd heights.
pub fn estimate_timestamp(height: u64) -> u64 {
    let elapsed = (height as u128 * BLOCK_SECONDS_NUM + BLOCK_SECONDS_DEN / 2) / BLOCK_SECONDS_DEN;
    let timestamp = elapsed + GENESIS_TIMESTAMP as u128;
    u64::try_from(timestamp).unwrap_or(u64::MAX)
}

/// Formats the calendar day (`YYYY-MM-DD`) of a UNIX timestamp in `offset`.
pub fn day_for_timestamp(timestamp: u64, offset: FixedOffset) -> Result<String> {
    let secs = i64::try_from(timestamp).map_err(|_| LedgerError::InvalidTimestamp(timestamp))?;
    let utc = DateTime::<Utc>::from_timestamp(secs, 0).ok_or(LedgerError::InvalidTimestamp(timestamp))?;
    Ok(utc.with_timezone(&offset).format("%Y-%m-%d").to_string())
}

/// The default day boundary.
pub fn utc() -> FixedOffset {
    Utc.fix()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_height_is_genesis_timestamp() {
        assert_eq!(estimate_timestamp(0), GENESIS_TIMESTAMP);
    }

    #[test]
    fn test_known_heights() {
        // 36 blocks are exactly 625 seconds.
        assert_eq!(estimate_timestamp(36), GENESIS_TIMESTAMP + 625);
        // 17.36.. rounds to 17
        assert_eq!(estimate_timestamp(1), GENESIS_TIMESTAMP + 17);
        // 34.72.. rounds to 35
        assert_eq!(estimate_timestamp(2), GENESIS_TIMESTAMP + 35);
        // 312.5 rounds away from zero
        assert_eq!(estimate_timestamp(18), GENESIS_TIMESTAMP + 313);
        // One growth-adjusted day of blocks.
        assert_eq!(estimate_timestamp(4977), GENESIS_TIMESTAMP + 86_406);
    }

    #[test]
    fn test_monotonic() {
        let mut previous = estimate_timestamp(0);
        for height in 1..50_000u64 {
            let current = estimate_timestamp(height);
            assert!(current > previous, "height {height} not after {}", height - 1);
            previous = current;
        }

        let far = [1_000_000u64, 10_000_000, 1 << 40, 1 << 50];
        for pair in far.windows(2) {
            assert!(estimate_timestamp(pair[0]) < estimate_timestamp(pair[1]));
        }
    }

    #[test]
    fn test_saturates_instead_of_overflowing() {
        assert_eq!(estimate_timestamp(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_seconds_per_block_matches_exact_ratio() {
        let exact = BLOCK_SECONDS_NUM as f64 / BLOCK_SECONDS_DEN as f64;
        assert!((SECONDS_PER_BLOCK - exact).abs() < 1e-9);
    }

    #[test]
    fn test_day_for_timestamp_utc() {
        assert_eq!(day_for_timestamp(GENESIS_TIMESTAMP, utc()).unwrap(), "2021-03-19");
        assert_eq!(day_for_timestamp(0, utc()).unwrap(), "1970-01-01");
    }

    #[test]
    fn test_day_for_timestamp_with_offset() {
        // 2021-03-19T14:01:14Z is already the 20th in UTC+10.
        let plus_ten = FixedOffset::east_opt(10 * 3600).unwrap();
        assert_eq!(day_for_timestamp(GENESIS_TIMESTAMP, plus_ten).unwrap(), "2021-03-20");
    }

    #[test]
    fn test_day_for_timestamp_out_of_range() {
        let err = day_for_timestamp(u64::MAX, utc()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTimestamp(u64::MAX)));
    }
}
