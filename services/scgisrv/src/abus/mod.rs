//! ABUS wire protocol
//!
//! - `frame`: transport frame with the controller checksum
//! - `command`: direction/type head and command bodies
//! - `message`: addressed message as handled by the rest of the gateway
//! - `iex`: chunking for the CAN bus

pub mod command;
pub mod frame;
pub mod iex;
pub mod message;

pub use command::{Command, CommandFrame, Direction};
pub use message::{AbusMessage, ExchangeTag, CAN_LOCAL_ADDR};
