//! Read-only status tags built from the gateway's own counters

pub mod plc;
pub mod system;

pub use plc::PlcStatusService;
pub use system::SystemStatusService;
