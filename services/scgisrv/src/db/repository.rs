//! Storage used by the data logger and the relay synchronizer

use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::models::{Alarm, Measurement, RelayUpdate};
use crate::error::Result;

#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_measurements(&self, measurements: &[Measurement]) -> Result<()>;

    async fn create_alarms(&self, alarms: &[Alarm]) -> Result<()>;

    /// Set `timestamp_gone` of the given alarms
    async fn clear_alarms(&self, ids: &[u64], timestamp: NaiveDateTime) -> Result<()>;

    /// Alarms of the given `(nad, tag)` pairs that were never acknowledged
    async fn get_not_acknowledged_alarms(&self, targets: &[(u32, String)]) -> Result<Vec<Alarm>>;

    /// An enabled relay session uses `session_id`
    async fn exists_in_relays(&self, session_id: u32) -> Result<bool>;

    async fn update_relay(&self, session_id: u32, update: &RelayUpdate) -> Result<()>;

    /// Subset of `session_ids` that are still enabled
    async fn enabled_sessions_in(&self, session_ids: &[u32]) -> Result<Vec<u32>>;
}
