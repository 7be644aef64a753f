//! Byte transports under the ABUS stack
//!
//! Pure I/O adapters: UDP datagrams and IEX-over-CAN frames in, decoded
//! `AbusMessage`s out.

pub mod abus;
pub mod can;
pub mod udp;

pub use abus::AbusTransceiver;
pub use udp::UdpActivity;
