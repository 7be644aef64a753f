//! Repository kept in process memory
//!
//! Stands in for MySQL when the database is disabled, and backs the data
//! logger and relay tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::Mutex;

use super::models::{Alarm, Measurement, RelayUpdate};
use super::repository::Repository;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRow {
    pub enabled: bool,
    pub update: Option<RelayUpdate>,
}

#[derive(Default)]
struct Tables {
    measurements: Vec<Measurement>,
    alarms: Vec<Alarm>,
    next_alarm_id: u64,
    relays: BTreeMap<u32, RelayRow>,
}

#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_relay(&self, session_id: u32, enabled: bool) {
        self.tables
            .lock()
            .relays
            .insert(session_id, RelayRow { enabled, update: None });
    }

    pub fn set_relay_enabled(&self, session_id: u32, enabled: bool) {
        if let Some(row) = self.tables.lock().relays.get_mut(&session_id) {
            row.enabled = enabled;
        }
    }

    pub fn relay(&self, session_id: u32) -> Option<RelayRow> {
        self.tables.lock().relays.get(&session_id).cloned()
    }

    pub fn measurements(&self) -> Vec<Measurement> {
        self.tables.lock().measurements.clone()
    }

    pub fn alarms(&self) -> Vec<Alarm> {
        self.tables.lock().alarms.clone()
    }

    pub fn acknowledge(&self, id: u64, timestamp: NaiveDateTime) {
        let mut tables = self.tables.lock();
        if let Some(alarm) = tables.alarms.iter_mut().find(|a| a.id == Some(id)) {
            alarm.timestamp_ack = Some(timestamp);
        }
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_measurements(&self, measurements: &[Measurement]) -> Result<()> {
        self.tables.lock().measurements.extend_from_slice(measurements);
        Ok(())
    }

    async fn create_alarms(&self, alarms: &[Alarm]) -> Result<()> {
        let mut tables = self.tables.lock();
        for alarm in alarms {
            tables.next_alarm_id += 1;
            let mut alarm = alarm.clone();
            alarm.id = Some(tables.next_alarm_id);
            tables.alarms.push(alarm);
        }
        Ok(())
    }

    async fn clear_alarms(&self, ids: &[u64], timestamp: NaiveDateTime) -> Result<()> {
        let mut tables = self.tables.lock();
        for alarm in tables.alarms.iter_mut() {
            if alarm.id.is_some_and(|id| ids.contains(&id)) {
                alarm.timestamp_gone = Some(timestamp);
            }
        }
        Ok(())
    }

    async fn get_not_acknowledged_alarms(&self, targets: &[(u32, String)]) -> Result<Vec<Alarm>> {
        let tables = self.tables.lock();
        Ok(tables
            .alarms
            .iter()
            .filter(|a| a.timestamp_ack.is_none())
            .filter(|a| targets.iter().any(|(nad, tag)| a.nad == *nad && a.tag == *tag))
            .cloned()
            .collect())
    }

    async fn exists_in_relays(&self, session_id: u32) -> Result<bool> {
        Ok(self
            .tables
            .lock()
            .relays
            .get(&session_id)
            .is_some_and(|r| r.enabled))
    }

    async fn update_relay(&self, session_id: u32, update: &RelayUpdate) -> Result<()> {
        if let Some(row) = self.tables.lock().relays.get_mut(&session_id) {
            row.update = Some(update.clone());
        }
        Ok(())
    }

    async fn enabled_sessions_in(&self, session_ids: &[u32]) -> Result<Vec<u32>> {
        let tables = self.tables.lock();
        Ok(session_ids
            .iter()
            .copied()
            .filter(|id| tables.relays.get(id).is_some_and(|r| r.enabled))
            .collect())
    }
}
