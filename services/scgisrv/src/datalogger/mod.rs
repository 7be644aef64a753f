//! Scheduled sampling and alarm evaluation
//!
//! Tasks come from an XML file watched on disk. Each task reads its tags
//! through a `TagReader` on a phase-aligned schedule and writes samples or
//! alarms through a `Repository`.

pub mod activity;
pub mod alarm;
pub mod cache;
pub mod config;
pub mod logger;
pub mod measurement;
pub mod parser;
pub mod tasks;
pub mod wait_time;
pub mod watcher;

pub use activity::{DataLoggerActivityService, TaskGroupSummary};
pub use cache::DataLoggerCache;
pub use config::LoggerConfig;
pub use logger::{DataLogger, TagReader};
pub use parser::parse_logger_config;
pub use tasks::{Task, TaskId};
pub use wait_time::calculate_wait_time;
pub use watcher::ConfigWatcher;
