//! Tag reads and writes
//!
//! `RwService` answers symbolic requests from SCGI clients and the data
//! logger. Controller tags go through `PlcCommService`, which resolves the
//! controller's allocation list and talks ABUS through its client.

pub mod comm_service;
pub mod communicator;
pub mod plc_request;
pub mod processor;
pub mod request;
pub mod response;
pub mod service;

pub use comm_service::PlcCommService;
pub use request::{RwRequest, Target};
pub use response::{responses_with_code, Code, RResponse, ResponseValue};
pub use service::RwService;
