//! Data logger and relay persistence

pub mod memory;
pub mod models;
pub mod mysql;
pub mod repository;

pub use memory::InMemoryRepository;
pub use models::{Alarm, Measurement, RelayUpdate};
pub use mysql::MySqlRepository;
pub use repository::Repository;
