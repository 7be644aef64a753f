//! Reloads the data logger when its XML file changes

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::config::LoggerConfig;
use super::logger::DataLogger;
use super::parser::parse_logger_config;

/// What a poll of the file found
#[derive(Debug)]
pub enum Reload {
    Unchanged,
    Gone,
    Loaded(LoggerConfig),
    Rejected,
}

pub struct ConfigWatcher {
    path: PathBuf,
    period: Duration,
    logger: Arc<DataLogger>,
    last_modified: Option<SystemTime>,
}

impl ConfigWatcher {
    pub fn new(path: PathBuf, period: Duration, logger: Arc<DataLogger>) -> Self {
        Self {
            path,
            period,
            logger,
            last_modified: None,
        }
    }

    /// Look at the file once; a changed file that parses is applied
    pub async fn poll(&mut self) -> Reload {
        let modified = tokio::fs::metadata(&self.path)
            .await
            .ok()
            .filter(|m| m.is_file())
            .and_then(|m| m.modified().ok());
        if modified == self.last_modified {
            return Reload::Unchanged;
        }
        self.last_modified = modified;

        if modified.is_none() {
            warn!("Data logger config file gone");
            return Reload::Gone;
        }

        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) => {
                error!("Can't load file \"{}\": {}", self.path.display(), e);
                return Reload::Rejected;
            },
        };
        match parse_logger_config(&text) {
            Ok(config) => {
                info!("Data logger config file reloaded");
                self.logger.on_config(&config);
                Reload::Loaded(config)
            },
            Err(e) => {
                error!("Can't parse data logger config xml: {}", e);
                Reload::Rejected
            },
        }
    }

    pub fn spawn(mut self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Watching data logger config file \"{}\"", self.path.display());
            self.poll().await;

            let mut interval = interval_at(Instant::now() + self.period, self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.poll().await;
                    }
                    _ = cancel.cancelled() => {
                        info!("Data logger config watcher stopping");
                        self.logger.stop();
                        break;
                    }
                }
            }
        })
    }
}
