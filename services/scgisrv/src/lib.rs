//! SCGI gateway for ABUS controllers
//!
//! Callers read and write controller variables through SCGI requests such as
//! `GET /?c1000.counter&c1000.lc00_qx00=1`. The gateway resolves tag names
//! through each controller's allocation list, talks ABUS over UDP or CAN,
//! and answers with an XML document.
//!
//! Around that core it keeps a registry of known controllers (static,
//! autodetected, push), caches reads, relays foreign traffic, and runs the
//! data logger that samples tags into MySQL.

pub mod abus;
pub mod alc;
pub mod app;
pub mod cache;
pub mod comm;
pub mod core;
pub mod datalogger;
pub mod db;
pub mod error;
pub mod plc;
pub mod proxy;
pub mod rw;
pub mod scgi;
pub mod status;
pub mod transport;
pub mod utils;

pub use app::Gateway;
pub use error::{Result, ScgiSrvError};
