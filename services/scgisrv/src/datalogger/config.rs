//! Data logger configuration model
//!
//! Produced by the XML parser, consumed once per reload by the scheduler.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Where a task variable lives: one controller, or every member of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetContext {
    Nad(u32),
    Group(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub context: TargetContext,
    /// Tag name, optionally with an `[i]` index
    pub variable: String,
}

impl Target {
    pub fn is_group(&self) -> bool {
        matches!(self.context, TargetContext::Group(_))
    }
}

/// Stored in the `type` column of the alarms table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum TaskType {
    Sample = 0,
    Alarm = 1,
    Event = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AlarmPriority {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl AlarmPriority {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "LOW" => Some(AlarmPriority::Low),
            "MEDIUM" => Some(AlarmPriority::Medium),
            "HIGH" => Some(AlarmPriority::High),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlarmPriority::Low => "LOW",
            AlarmPriority::Medium => "MEDIUM",
            AlarmPriority::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AlarmRange {
    pub low: f64,
    pub high: f64,
    pub hysteresis: f64,
}

impl AlarmRange {
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }

    /// Range a raised alarm must re-enter before it is cleared
    pub fn contains_with_hysteresis(&self, value: f64) -> bool {
        self.low + self.hysteresis <= value && value <= self.high - self.hysteresis
    }
}

impl fmt::Display for AlarmRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <= x <= {}", self.low, self.high)?;
        if self.hysteresis != 0.0 {
            write!(f, " (+/-{})", self.hysteresis)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementTaskConfig {
    pub period: Duration,
    pub targets: Vec<Target>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlarmTaskConfig {
    pub period: Duration,
    pub targets: Vec<Target>,
    pub enabled: bool,
    pub alarm_class: String,
    pub priority: AlarmPriority,
    /// `None` when neither limit was given
    pub range: Option<AlarmRange>,
    pub message: String,
    pub task_type: TaskType,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoggerConfig {
    /// Group name to member nads
    pub groups: BTreeMap<String, Vec<u32>>,
    pub measurement_tasks: Vec<MeasurementTaskConfig>,
    pub alarm_tasks: Vec<AlarmTaskConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_range() {
        let range = AlarmRange {
            low: 10.0,
            high: 20.0,
            hysteresis: 1.0,
        };
        assert!(!range.contains(9.0));
        assert!(range.contains(10.5));
        assert!(!range.contains_with_hysteresis(10.5));
        assert!(range.contains_with_hysteresis(15.0));
        assert_eq!(range.to_string(), "10 <= x <= 20 (+/-1)");
        assert_eq!(AlarmRange::default().to_string(), "0 <= x <= 0");
    }

    #[test]
    fn test_priority_names() {
        assert_eq!(AlarmPriority::parse("high"), Some(AlarmPriority::High));
        assert_eq!(AlarmPriority::parse("Medium"), Some(AlarmPriority::Medium));
        assert_eq!(AlarmPriority::parse("urgent"), None);
        assert_eq!(AlarmPriority::Low as i32, 0);
    }
}
