//! Core service plumbing: constants, configuration and bootstrap

pub mod bootstrap;
pub mod config;
pub mod constants;
