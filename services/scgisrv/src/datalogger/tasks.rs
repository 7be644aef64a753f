//! Scheduled tasks derived from a logger configuration

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::utils::text::humanize_duration;

use super::config::{AlarmPriority, AlarmRange, LoggerConfig, Target, TargetContext, TaskType};

/// Unique among the tasks of one configuration load
pub type TaskId = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct AlarmSpec {
    pub alarm_class: String,
    pub priority: AlarmPriority,
    pub range: AlarmRange,
    pub message: String,
    pub task_type: TaskType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    Measurement,
    Alarm(AlarmSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub period: Duration,
    /// `(nad, variable)` with groups already expanded
    pub targets: Vec<(u32, String)>,
    pub kind: TaskKind,
}

impl Task {
    pub fn is_alarm(&self) -> bool {
        matches!(self.kind, TaskKind::Alarm(_))
    }

    pub fn tag_names(&self) -> impl Iterator<Item = String> + '_ {
        self.targets.iter().map(|(nad, variable)| format!("c{nad}.{variable}"))
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets = self.tag_names().collect::<Vec<_>>().join(", ");
        match &self.kind {
            TaskKind::Measurement => write!(f, "{}: {}", humanize_duration(self.period), targets),
            TaskKind::Alarm(spec) => write!(
                f,
                "{}, {}, {}, {}, \"{}\": {}",
                humanize_duration(self.period),
                spec.alarm_class,
                spec.priority.name(),
                spec.range,
                spec.message,
                targets
            ),
        }
    }
}

fn expand_targets(targets: &[Target], groups: &BTreeMap<String, Vec<u32>>) -> Vec<(u32, String)> {
    let mut expanded = Vec::new();
    for target in targets {
        match &target.context {
            TargetContext::Nad(nad) => expanded.push((*nad, target.variable.clone())),
            TargetContext::Group(name) => {
                // unknown groups contribute nothing
                if let Some(nads) = groups.get(name) {
                    expanded.extend(nads.iter().map(|nad| (*nad, target.variable.clone())));
                }
            },
        }
    }
    expanded
}

/// Enabled measurement tasks followed by enabled alarm tasks, numbered in
/// that order
pub fn extract_tasks(config: &LoggerConfig) -> (Vec<Task>, Vec<Task>) {
    let measurements: Vec<Task> = config
        .measurement_tasks
        .iter()
        .filter(|task| task.enabled)
        .enumerate()
        .map(|(id, task)| Task {
            id,
            period: task.period,
            targets: expand_targets(&task.targets, &config.groups),
            kind: TaskKind::Measurement,
        })
        .collect();

    let first_alarm_id = measurements.len();
    let alarms = config
        .alarm_tasks
        .iter()
        .filter(|task| task.enabled)
        .enumerate()
        .map(|(i, task)| Task {
            id: first_alarm_id + i,
            period: task.period,
            targets: expand_targets(&task.targets, &config.groups),
            kind: TaskKind::Alarm(AlarmSpec {
                alarm_class: task.alarm_class.clone(),
                priority: task.priority,
                range: task.range.unwrap_or_default(),
                message: task.message.clone(),
                task_type: task.task_type,
            }),
        })
        .collect();

    (measurements, alarms)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::datalogger::parser::parse_logger_config;

    #[test]
    fn test_extract_expands_groups_and_numbers_enabled_tasks() {
        let config = parse_logger_config(
            r#"<c>
              <list><group><name>g</name><item>c1</item><item>c2</item></group></list>
              <sample>
                <task><period>1m</period><variable>c9.off</variable><enabled>false</enabled></task>
                <task><period>1m</period><variable>{g}.a</variable><variable>{nope}.b</variable></task>
              </sample>
              <alarm>
                <task><period>5s</period><variable>c3.t</variable><lolimit>1</lolimit><hilimit>5</hilimit></task>
              </alarm>
              <event><task><period>5s</period><variable>c3.e</variable></task></event>
            </c>"#,
        )
        .unwrap();

        let (measurements, alarms) = extract_tasks(&config);
        assert_eq!(measurements.len(), 1);
        assert_eq!(measurements[0].id, 0);
        assert_eq!(
            measurements[0].targets,
            vec![(1, "a".to_string()), (2, "a".to_string())]
        );

        assert_eq!(alarms.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2]);
        let TaskKind::Alarm(event) = &alarms[1].kind else {
            panic!("expected alarm task");
        };
        assert_eq!(event.range, AlarmRange::default());
        assert_eq!(event.task_type, TaskType::Event);
    }

    #[test]
    fn test_display() {
        let task = Task {
            id: 0,
            period: Duration::from_secs(90),
            targets: vec![(1000, "t".into()), (1001, "t".into())],
            kind: TaskKind::Measurement,
        };
        assert_eq!(task.to_string(), "0 days, 00:01:30: c1000.t, c1001.t");
    }
}
