//! Deadband alarm evaluation
//!
//! A value outside the range raises an alarm unless one is still open for
//! the same tag. An open alarm clears only once the value is back inside the
//! range narrowed by the hysteresis on both ends.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Local;
use tracing::debug;

use super::measurement::Sample;
use super::tasks::AlarmSpec;
use crate::db::{Alarm, Repository};
use crate::error::{Result, ScgiSrvError};

pub struct AlarmHandler {
    repository: Arc<dyn Repository>,
}

impl AlarmHandler {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    pub async fn on_new_data(&self, samples: &[Sample], spec: &AlarmSpec) -> Result<()> {
        debug!("Alarm - {} variables", samples.len());

        let targets: Vec<(u32, String)> = samples.iter().map(|s| (s.nad, s.variable.clone())).collect();
        let mut open: HashMap<(u32, String), Vec<u64>> = HashMap::new();
        for alarm in self.repository.get_not_acknowledged_alarms(&targets).await? {
            if let (Some(id), false) = (alarm.id, alarm.is_cleared()) {
                open.entry((alarm.nad, alarm.tag)).or_default().push(id);
            }
        }

        let now = Local::now().naive_local();
        let mut to_raise = Vec::new();
        let mut to_clear = Vec::new();
        for sample in samples {
            let value: f64 = sample
                .value
                .trim()
                .parse()
                .map_err(|_| ScgiSrvError::UnexpectedValue(format!("\"{}\", expected number", sample.value)))?;
            let open_ids = open.get(&(sample.nad, sample.variable.clone()));

            if spec.range.contains_with_hysteresis(value) {
                to_clear.extend(open_ids.into_iter().flatten().copied());
            } else if !spec.range.contains(value) && open_ids.is_none_or(|ids| ids.is_empty()) {
                to_raise.push(Alarm {
                    id: None,
                    nad: sample.nad,
                    tag: sample.variable.clone(),
                    priority: spec.priority as i32,
                    value: sample.value.clone(),
                    alarm_type: spec.task_type as i32,
                    alarm_class: spec.alarm_class.clone(),
                    message: spec.message.clone(),
                    timestamp_raise: now,
                    timestamp_gone: None,
                    timestamp_ack: None,
                });
            }
        }

        if !to_raise.is_empty() {
            debug!(
                "Raise: {}",
                to_raise.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            );
        }
        if !to_clear.is_empty() {
            debug!(
                "Clear: {}",
                to_clear.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            );
        }

        let (raised, cleared) = futures::join!(
            async {
                if to_raise.is_empty() {
                    Ok(())
                } else {
                    self.repository.create_alarms(&to_raise).await
                }
            },
            self.repository.clear_alarms(&to_clear, now)
        );
        raised.and(cleared)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::datalogger::config::{AlarmPriority, AlarmRange, TaskType};
    use crate::db::InMemoryRepository;

    fn spec() -> AlarmSpec {
        AlarmSpec {
            alarm_class: "boiler".into(),
            priority: AlarmPriority::High,
            range: AlarmRange {
                low: 10.0,
                high: 20.0,
                hysteresis: 1.0,
            },
            message: "temperature".into(),
            task_type: TaskType::Alarm,
        }
    }

    fn sample(value: &str) -> Vec<Sample> {
        vec![Sample {
            nad: 1000,
            variable: "temperature".into(),
            value: value.into(),
        }]
    }

    #[tokio::test]
    async fn test_hysteresis_cycle() {
        let repo = Arc::new(InMemoryRepository::new());
        let handler = AlarmHandler::new(repo.clone());
        let spec = spec();

        handler.on_new_data(&sample("9"), &spec).await.unwrap();
        let alarms = repo.alarms();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].priority, 2);
        assert_eq!(alarms[0].alarm_type, 1);
        assert!(!alarms[0].is_cleared());

        // still low, no duplicate
        handler.on_new_data(&sample("8"), &spec).await.unwrap();
        assert_eq!(repo.alarms().len(), 1);

        // back in range but inside the deadband
        handler.on_new_data(&sample("10.5"), &spec).await.unwrap();
        assert!(!repo.alarms()[0].is_cleared());

        handler.on_new_data(&sample("15"), &spec).await.unwrap();
        assert!(repo.alarms()[0].is_cleared());

        handler.on_new_data(&sample("9"), &spec).await.unwrap();
        let alarms = repo.alarms();
        assert_eq!(alarms.len(), 2);
        assert!(alarms[0].is_cleared());
        assert!(!alarms[1].is_cleared());
    }

    #[tokio::test]
    async fn test_non_numeric_value_is_rejected() {
        let repo = Arc::new(InMemoryRepository::new());
        let handler = AlarmHandler::new(repo.clone());
        let err = handler.on_new_data(&sample("?"), &spec()).await.unwrap_err();
        assert!(matches!(err, ScgiSrvError::UnexpectedValue(_)));
        assert!(repo.alarms().is_empty());
    }

    #[tokio::test]
    async fn test_clears_every_open_alarm_of_the_batch() {
        let repo = Arc::new(InMemoryRepository::new());
        let handler = AlarmHandler::new(repo.clone());
        let spec = spec();
        let mut low = sample("1");
        low.push(Sample {
            nad: 1001,
            variable: "temperature".into(),
            value: "30".into(),
        });
        handler.on_new_data(&low, &spec).await.unwrap();
        assert_eq!(repo.alarms().len(), 2);

        let mut normal = sample("15");
        normal.push(Sample {
            nad: 1001,
            variable: "temperature".into(),
            value: "15".into(),
        });
        handler.on_new_data(&normal, &spec).await.unwrap();
        assert!(repo.alarms().iter().all(Alarm::is_cleared));
    }
}
