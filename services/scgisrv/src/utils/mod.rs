//! Utility modules

pub mod async_cache;
pub mod task_runner;
pub mod text;
pub mod transaction_id;
pub mod unzip;

pub use async_cache::AsyncCache;
pub use transaction_id::TransactionIdGenerator;
