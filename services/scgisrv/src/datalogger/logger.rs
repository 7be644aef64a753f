//! Task scheduler
//!
//! Every enabled task runs in its own loop: wait for the next execution
//! point, read all targets, store the values. A configuration reload cancels
//! every loop of the previous load and starts fresh ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Local;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::activity::DataLoggerActivityService;
use super::alarm::AlarmHandler;
use super::cache::DataLoggerCache;
use super::config::LoggerConfig;
use super::measurement::{MeasurementHandler, Sample};
use super::tasks::{extract_tasks, Task, TaskId, TaskKind};
use super::wait_time::calculate_wait_time;
use crate::db::Repository;
use crate::rw::{RResponse, RwRequest};
use crate::utils::task_runner::{self, TaskRunner};

/// Reads tags on behalf of a scheduled task
#[async_trait]
pub trait TagReader: Send + Sync {
    /// One response per request, in request order
    async fn read_tags(&self, reads: &[RwRequest], task_id: TaskId) -> Vec<RResponse>;
}

pub struct DataLogger {
    reader: Arc<dyn TagReader>,
    measurements: MeasurementHandler,
    alarms: AlarmHandler,
    cache: Arc<DataLoggerCache>,
    activity: Arc<DataLoggerActivityService>,
    task_runner: Arc<dyn TaskRunner>,
    shutdown: CancellationToken,
    /// Cancels the loops of the current load
    generation: Mutex<Option<CancellationToken>>,
}

impl DataLogger {
    pub fn new(
        reader: Arc<dyn TagReader>,
        repository: Arc<dyn Repository>,
        cache: Arc<DataLoggerCache>,
        activity: Arc<DataLoggerActivityService>,
        task_runner: Arc<dyn TaskRunner>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            reader,
            measurements: MeasurementHandler::new(repository.clone()),
            alarms: AlarmHandler::new(repository),
            cache,
            activity,
            task_runner,
            shutdown,
            generation: Mutex::new(None),
        })
    }

    /// Replace the running schedule with the tasks of `config`
    pub fn on_config(self: &Arc<Self>, config: &LoggerConfig) {
        let (measurement_tasks, alarm_tasks) = extract_tasks(config);
        self.activity.report_tasks_loaded(&measurement_tasks, &alarm_tasks);

        let generation = self.shutdown.child_token();
        if let Some(previous) = self.generation.lock().replace(generation.clone()) {
            previous.cancel();
        }

        info!(
            "Data logger scheduling {} measurement and {} alarm tasks",
            measurement_tasks.len(),
            alarm_tasks.len()
        );
        for task in measurement_tasks.into_iter().chain(alarm_tasks) {
            debug!("Task {}: {}", task.id, task);
            tokio::spawn(self.clone().run_task(task, generation.clone()));
        }

        self.cache.clear();
    }

    /// Cancel every running task
    pub fn stop(&self) {
        if let Some(generation) = self.generation.lock().take() {
            generation.cancel();
        }
    }

    async fn run_task(self: Arc<Self>, task: Task, cancel: CancellationToken) {
        let kind = kind_name(&task);
        loop {
            let wait = calculate_wait_time(task.period, Local::now().time());
            debug!("{} {} scheduled - execution in {:?}", kind, task.id, wait);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.execute(&task) => {}
            }
        }
        debug!("{} {} cancelled", kind, task.id);
    }

    async fn execute(&self, task: &Task) {
        let kind = kind_name(task);
        self.activity.report_task_triggered(task.id);
        let start = Instant::now();
        debug!("Executing {} {}", kind, task.id);

        let (samples, invalid) = self.read(task).await;
        if invalid > 0 {
            error!("Can't execute {} {}", kind, task.id);
        } else {
            let stored = match &task.kind {
                TaskKind::Measurement => self.measurements.on_new_data(&samples).await,
                TaskKind::Alarm(spec) => self.alarms.on_new_data(&samples, spec).await,
            };
            if let Err(e) = stored {
                error!("{} {} not stored: {}", kind, task.id, e);
            }
        }

        let duration = start.elapsed();
        debug!("{} {} done in {:?}", kind, task.id, duration);
        self.activity
            .report_task_results(task.id, samples.len(), invalid, duration);
    }

    /// Valid samples and the number of targets that could not be read
    async fn read(&self, task: &Task) -> (Vec<Sample>, usize) {
        let names: Vec<String> = task.tag_names().collect();
        let prepare_start = Instant::now();
        let prepared = task_runner::run(self.task_runner.as_ref(), move || {
            names
                .iter()
                .map(|name| RwRequest::read(name))
                .collect::<Vec<_>>()
        })
        .await;
        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Preparing requests of task {} failed: {}", task.id, e);
                return (Vec::new(), task.targets.len());
            },
        };
        debug!(
            "Requests for {} targets prepared in {:?}",
            task.targets.len(),
            prepare_start.elapsed()
        );

        let mut invalid = 0;
        let mut requests = Vec::with_capacity(prepared.len());
        for request in prepared {
            match request {
                Ok(request) => requests.push(request),
                Err(e) => {
                    error!("Invalid data logger target: {}", e);
                    invalid += 1;
                },
            }
        }

        let responses = self.reader.read_tags(&requests, task.id).await;
        let by_name: HashMap<&str, &RResponse> =
            responses.iter().map(|r| (r.name.as_str(), r)).collect();
        let mut samples = Vec::with_capacity(requests.len());
        for request in &requests {
            match by_name.get(request.name.as_str()) {
                Some(response) if response.valid => samples.push(Sample {
                    nad: request.nad.unwrap_or_default(),
                    variable: request.tag_name.clone(),
                    value: response.value.to_string(),
                }),
                Some(response) => {
                    error!("Received invalid response: {}", response);
                    invalid += 1;
                },
                None => {
                    error!("No response for {}", request.name);
                    invalid += 1;
                },
            }
        }
        (samples, invalid)
    }
}

fn kind_name(task: &Task) -> &'static str {
    match task.kind {
        TaskKind::Measurement => "Measurement",
        TaskKind::Alarm(_) => "Alarm",
    }
}
