//! Per-controller exchange statistics

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use super::head::{PlcHead, PlcStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Unknown,
    Offline,
    NoProgram,
    Ok,
}

#[derive(Debug, Clone, Default)]
pub struct PlcActivity {
    pub last_successful_exchange_time: Option<DateTime<Local>>,
    pub last_failed_exchange_time: Option<DateTime<Local>>,
    pub initiated_exchanges_count: u64,
    pub successful_exchanges_count: u64,
    pub failed_exchanges_count: u64,
    pub bytes_transferred: u64,
    pub last_used_alc_crc: Option<u16>,
    pub last_plc_head: Option<PlcHead>,
    pub last_plc_status: Option<PlcStatus>,
    /// Cleared by a failed exchange
    pub last_exchange_duration: Option<Duration>,
}

impl PlcActivity {
    pub fn finished_exchanges_count(&self) -> u64 {
        self.successful_exchanges_count + self.failed_exchanges_count
    }

    pub fn pending_exchanges_count(&self) -> u64 {
        self.initiated_exchanges_count
            .saturating_sub(self.finished_exchanges_count())
    }

    pub fn device_status(&self) -> DeviceStatus {
        if self.successful_exchanges_count == 0 {
            return if self.failed_exchanges_count == 0 {
                DeviceStatus::Unknown
            } else {
                DeviceStatus::Offline
            };
        }
        let error_is_recent = match (self.last_successful_exchange_time, self.last_failed_exchange_time) {
            (Some(success), Some(failure)) => success < failure,
            _ => false,
        };
        if error_is_recent {
            return DeviceStatus::Offline;
        }
        match &self.last_plc_head {
            None => DeviceStatus::Unknown,
            Some(head) if head.empty == 0 => DeviceStatus::Ok,
            Some(_) => DeviceStatus::NoProgram,
        }
    }
}

#[derive(Default)]
pub struct PlcActivityService {
    activities: Mutex<HashMap<u32, PlcActivity>>,
}

impl PlcActivityService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot; a default record for controllers never talked to
    pub fn get(&self, nad: u32) -> PlcActivity {
        self.activities.lock().entry(nad).or_default().clone()
    }

    fn with<F: FnOnce(&mut PlcActivity)>(&self, nad: u32, f: F) {
        f(self.activities.lock().entry(nad).or_default());
    }

    pub fn report_exchange_initiated(&self, nad: u32) {
        self.with(nad, |a| a.initiated_exchanges_count += 1);
    }

    pub fn report_exchange_succeeded(&self, nad: u32, bytes: usize, duration: Duration) {
        self.with(nad, |a| {
            a.last_successful_exchange_time = Some(Local::now());
            a.successful_exchanges_count += 1;
            a.bytes_transferred += bytes as u64;
            a.last_exchange_duration = Some(duration);
        });
    }

    pub fn report_exchange_failed(&self, nad: u32) {
        self.with(nad, |a| {
            a.last_failed_exchange_time = Some(Local::now());
            a.failed_exchanges_count += 1;
            a.last_exchange_duration = None;
        });
    }

    pub fn report_alc_crc_used(&self, nad: u32, crc: Option<u16>) {
        self.with(nad, |a| a.last_used_alc_crc = crc);
    }

    pub fn report_plc_head_used(&self, nad: u32, head: Option<PlcHead>) {
        self.with(nad, |a| a.last_plc_head = head);
    }

    pub fn report_plc_status_used(&self, nad: u32, status: Option<PlcStatus>) {
        self.with(nad, |a| a.last_plc_status = status);
    }
}
