//! Data logger run statistics, reported through `sys.datalogger_list`

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use super::tasks::{Task, TaskId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskActivity {
    pub trigger_count: u64,
    pub last_trigger_time: Option<DateTime<Local>>,
    /// Of the last run
    pub valid_results: usize,
    pub invalid_results: usize,
    pub duration: Option<Duration>,
}

#[derive(Default)]
struct State {
    measurement_tasks: Vec<Task>,
    alarm_tasks: Vec<Task>,
    activities: HashMap<TaskId, TaskActivity>,
}

/// One `sys.datalogger_list` row: tags, tasks, triggers, valid, invalid,
/// last trigger and summed duration of the last runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskGroupSummary {
    pub tag_count: usize,
    pub task_count: usize,
    pub trigger_count: u64,
    pub valid_results: usize,
    pub invalid_results: usize,
    pub last_trigger: String,
    pub duration: String,
}

#[derive(Default)]
pub struct DataLoggerActivityService {
    state: Mutex<State>,
}

impl DataLoggerActivityService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the task list and forgets the previous statistics
    pub fn report_tasks_loaded(&self, measurement_tasks: &[Task], alarm_tasks: &[Task]) {
        let mut state = self.state.lock();
        state.measurement_tasks = measurement_tasks.to_vec();
        state.alarm_tasks = alarm_tasks.to_vec();
        state.activities.clear();
    }

    pub fn report_task_triggered(&self, task_id: TaskId) {
        let mut state = self.state.lock();
        let activity = state.activities.entry(task_id).or_default();
        activity.trigger_count += 1;
        activity.last_trigger_time = Some(Local::now());
    }

    pub fn report_task_results(&self, task_id: TaskId, valid: usize, invalid: usize, duration: Duration) {
        let mut state = self.state.lock();
        let activity = state.activities.entry(task_id).or_default();
        activity.valid_results = valid;
        activity.invalid_results = invalid;
        activity.duration = Some(duration);
    }

    pub fn get(&self, task_id: TaskId) -> TaskActivity {
        self.state.lock().activities.get(&task_id).cloned().unwrap_or_default()
    }

    pub fn measurement_tasks(&self) -> Vec<Task> {
        self.state.lock().measurement_tasks.clone()
    }

    pub fn alarm_tasks(&self) -> Vec<Task> {
        self.state.lock().alarm_tasks.clone()
    }

    /// Summaries for the sample tasks and the alarm tasks, in that order
    pub fn summaries(&self) -> [TaskGroupSummary; 2] {
        let state = self.state.lock();
        [
            summarize(&state.measurement_tasks, &state.activities),
            summarize(&state.alarm_tasks, &state.activities),
        ]
    }
}

fn summarize(tasks: &[Task], activities: &HashMap<TaskId, TaskActivity>) -> TaskGroupSummary {
    let mut summary = TaskGroupSummary {
        tag_count: 0,
        task_count: tasks.len(),
        trigger_count: 0,
        valid_results: 0,
        invalid_results: 0,
        last_trigger: String::new(),
        duration: String::new(),
    };
    let mut last_trigger: Option<DateTime<Local>> = None;
    let mut duration = Duration::ZERO;

    for task in tasks {
        summary.tag_count += task.targets.len();
        let Some(activity) = activities.get(&task.id) else {
            continue;
        };
        summary.trigger_count += activity.trigger_count;
        summary.valid_results += activity.valid_results;
        summary.invalid_results += activity.invalid_results;
        if activity.last_trigger_time > last_trigger {
            last_trigger = activity.last_trigger_time;
        }
        duration += activity.duration.unwrap_or_default();
    }

    summary.last_trigger = last_trigger
        .map(|t| t.format("%d-%m-%y %H:%M:%S").to_string())
        .unwrap_or_default();
    summary.duration = format!("{:.2}ms", duration.as_secs_f64() * 1000.0);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalogger::tasks::TaskKind;

    fn task(id: TaskId, targets: usize) -> Task {
        Task {
            id,
            period: Duration::from_secs(10),
            targets: (0..targets).map(|i| (1000, format!("t{i}"))).collect(),
            kind: TaskKind::Measurement,
        }
    }

    #[test]
    fn test_summaries() {
        let service = DataLoggerActivityService::new();
        service.report_tasks_loaded(&[task(0, 2), task(1, 3)], &[]);

        service.report_task_triggered(0);
        service.report_task_results(0, 2, 0, Duration::from_micros(1500));
        service.report_task_triggered(1);
        service.report_task_results(1, 1, 2, Duration::from_millis(3));

        let [samples, alarms] = service.summaries();
        assert_eq!(samples.tag_count, 5);
        assert_eq!(samples.task_count, 2);
        assert_eq!(samples.trigger_count, 2);
        assert_eq!((samples.valid_results, samples.invalid_results), (3, 2));
        assert_eq!(samples.duration, "4.50ms");
        assert!(!samples.last_trigger.is_empty());

        assert_eq!(alarms.task_count, 0);
        assert_eq!(alarms.last_trigger, "");
        assert_eq!(alarms.duration, "0.00ms");
    }

    #[test]
    fn test_reload_resets_statistics() {
        let service = DataLoggerActivityService::new();
        service.report_tasks_loaded(&[task(0, 1)], &[]);
        service.report_task_triggered(0);
        service.report_tasks_loaded(&[task(0, 1)], &[]);
        assert_eq!(service.get(0), TaskActivity::default());
    }
}
