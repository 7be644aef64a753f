//! Shared plumbing for the gateway services
//!
//! - logging setup (console + size-rotated file)
//! - graceful shutdown signal handling
//! - hex helpers for frame dumps

pub mod hex;
pub mod logging;
pub mod shutdown;
