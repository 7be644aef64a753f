//! Controller side: registry, clients and their statistics

pub mod activity;
pub mod chunking;
pub mod cleaner;
pub mod client;
pub mod detection;
pub mod head;
pub mod info;
pub mod info_service;
pub mod manager;
pub mod push;
pub mod value;

#[cfg(test)]
pub(crate) mod fake;

pub use activity::{DeviceStatus, PlcActivity, PlcActivityService};
pub use chunking::{PreparedRead, ReadParams, ReadResults, RwChunker, WriteParams};
pub use cleaner::PlcInfoCleaner;
pub use client::{ClientContext, PlcClient};
pub use detection::{Detect, PlcDetectionService};
pub use head::{PlcHead, PlcStatus, Status};
pub use info::{PlcInfo, PlcOrigin};
pub use info_service::{PlcInfoListener, PlcInfoService};
pub use manager::PlcClientManager;
pub use push::{PushActivity, PushService};
pub use value::PlcValue;
