//! Rows of the data logger and relay tables

use std::fmt;

use chrono::NaiveDateTime;

use crate::core::constants::NULL_TIMESTAMP;

/// Column format of every timestamp the gateway writes
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// `None` for the zero date used as "not yet"
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if raw.starts_with(NULL_TIMESTAMP) {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub nad: u32,
    pub tag: String,
    pub value: String,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alarm {
    /// Assigned by the database
    pub id: Option<u64>,
    pub nad: u32,
    pub tag: String,
    pub priority: i32,
    pub value: String,
    pub alarm_type: i32,
    pub alarm_class: String,
    pub message: String,
    pub timestamp_raise: NaiveDateTime,
    pub timestamp_gone: Option<NaiveDateTime>,
    pub timestamp_ack: Option<NaiveDateTime>,
}

impl Alarm {
    pub fn is_cleared(&self) -> bool {
        self.timestamp_gone.is_some()
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "c{} {}={} {} {} {}",
            self.nad, self.tag, self.value, self.alarm_type, self.alarm_class, self.message
        )
    }
}

/// Counters flushed into a relay session row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayUpdate {
    pub message_count_rx: u64,
    pub message_count_tx: u64,
    pub last_message: NaiveDateTime,
    pub last_controller_nad: u32,
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_timestamps() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 0)
            .unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-09 07:05:00");
        assert_eq!(parse_timestamp("2024-03-09 07:05:00"), Some(ts));
        assert_eq!(parse_timestamp("0000-00-00 00:00:00"), None);
        assert_eq!(parse_timestamp("0000-00-00"), None);
    }
}
