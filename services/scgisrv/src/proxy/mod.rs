//! Relay sessions between remote clients and local controllers

pub mod activity;
pub mod service;
pub mod sync;

pub use activity::{ProxyActivity, ProxyActivityService};
pub use service::ProxyService;
pub use sync::ProxyDbSynchronizer;
