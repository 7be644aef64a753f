//! Controller allocation lists (tag name to memory address map)

pub mod parser;
pub mod service;
pub mod var_info;

pub use service::AlcService;
pub use var_info::{Alc, DataType, VarInfo};
