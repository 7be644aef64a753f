//! Phase-aligned task scheduling
//!
//! A period picks a scheduling range: a minute for periods up to a minute,
//! an hour for periods up to an hour, a day otherwise. Runs happen at every
//! multiple of the period counted from the start of the range, and once more
//! at the range boundary. A 17 s period fires at :00, :17, :34, :51 and at
//! the next :00 of every minute.

use std::time::Duration;

use chrono::{NaiveTime, Timelike};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Time until the next execution point after `now`
pub fn calculate_wait_time(period: Duration, now: NaiveTime) -> Duration {
    let period_s = period.as_secs().max(1);
    let (range_s, elapsed_s) = if period_s <= MINUTE {
        (MINUTE, u64::from(now.second()))
    } else if period_s <= HOUR {
        (HOUR, u64::from(now.minute()) * MINUTE + u64::from(now.second()))
    } else {
        (DAY, u64::from(now.num_seconds_from_midnight()))
    };

    let until_range_end = range_s.saturating_sub(elapsed_s);
    let until_period_end = period_s - elapsed_s % period_s;
    Duration::from_secs(until_range_end.min(until_period_end))
}
