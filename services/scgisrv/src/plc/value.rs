//! Values as they travel between tag text and controller memory

use std::fmt;

use crate::alc::DataType;
use crate::error::{Result, ScgiSrvError};
use crate::utils::text::format_float;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlcValue {
    Int(i64),
    Real(f64),
}

impl PlcValue {
    /// Parse a written value; anything but REAL is truncated towards zero
    pub fn parse(raw: &str, data_type: DataType) -> Result<Self> {
        let number: f64 = raw
            .trim()
            .parse()
            .map_err(|_| ScgiSrvError::UnexpectedValue(format!("\"{raw}\" is not a number")))?;
        if !number.is_finite() {
            return Err(ScgiSrvError::UnexpectedValue(format!("\"{raw}\" is not finite")));
        }
        Ok(match data_type {
            DataType::Real => PlcValue::Real(number),
            _ => PlcValue::Int(number.trunc() as i64),
        })
    }

    pub fn as_f64(self) -> f64 {
        match self {
            PlcValue::Int(v) => v as f64,
            PlcValue::Real(v) => v,
        }
    }

    fn as_int(self) -> i64 {
        match self {
            PlcValue::Int(v) => v,
            PlcValue::Real(v) => v.trunc() as i64,
        }
    }

    fn out_of_range(self, what: &str) -> ScgiSrvError {
        ScgiSrvError::UnexpectedValue(format!("{self} does not fit {what}"))
    }

    pub fn to_one_byte(self) -> Result<u8> {
        u8::try_from(self.as_int()).map_err(|_| self.out_of_range("one byte"))
    }

    pub fn to_two_bytes(self) -> Result<[u8; 2]> {
        i16::try_from(self.as_int())
            .map(i16::to_le_bytes)
            .map_err(|_| self.out_of_range("two bytes"))
    }

    pub fn to_four_bytes(self, data_type: DataType) -> Result<[u8; 4]> {
        if data_type == DataType::Real {
            return Ok((self.as_f64() as f32).to_le_bytes());
        }
        i32::try_from(self.as_int())
            .map(i32::to_le_bytes)
            .map_err(|_| self.out_of_range("four bytes"))
    }

    pub fn from_one_byte(raw: u8) -> Self {
        PlcValue::Int(i64::from(raw))
    }

    pub fn from_two_bytes(raw: [u8; 2]) -> Self {
        PlcValue::Int(i64::from(i16::from_le_bytes(raw)))
    }

    pub fn from_four_bytes(raw: [u8; 4], data_type: DataType) -> Self {
        if data_type == DataType::Real {
            PlcValue::Real(f64::from(f32::from_le_bytes(raw)))
        } else {
            PlcValue::Int(i64::from(i32::from_le_bytes(raw)))
        }
    }
}

impl fmt::Display for PlcValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlcValue::Int(v) => write!(f, "{v}"),
            PlcValue::Real(v) => f.write_str(&format_float(*v)),
        }
    }
}
