//! One entry of a controller allocation list

use std::collections::HashMap;
use std::fmt;

/// Variable type as declared in the allocation list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    None,
    Bit,
    Int,
    Long,
    Real,
}

impl DataType {
    /// Case-insensitive lookup of the type column
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "BIT" => DataType::Bit,
            "INT" => DataType::Int,
            "LONG" => DataType::Long,
            "REAL" => DataType::Real,
            _ => DataType::None,
        }
    }

    /// Wire size of typed variables; `None` keeps the size from the list
    pub fn size(self) -> Option<usize> {
        match self {
            DataType::Bit => Some(1),
            DataType::Int => Some(2),
            DataType::Long | DataType::Real => Some(4),
            DataType::None => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::None => "NONE",
            DataType::Bit => "BIT",
            DataType::Int => "INT",
            DataType::Long => "LONG",
            DataType::Real => "REAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarInfo {
    pub id: u32,
    pub name: String,
    pub is_array: bool,
    pub array_size: u32,
    /// Memory address, offset already applied
    pub address: u32,
    pub offset: u32,
    pub size: usize,
    pub scope: String,
    pub data_type: DataType,
    pub description: String,
}

impl fmt::Display for VarInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: id={}, is_array={}, address={}, offset={}, size={}, scope={}, data_type={}, description={}",
            self.name,
            self.id,
            self.is_array,
            self.address,
            self.offset,
            self.size,
            self.scope,
            self.data_type.name(),
            self.description
        )
    }
}

/// Parsed allocation list keyed by variable name
#[derive(Debug, Clone, Default)]
pub struct Alc {
    vars: HashMap<String, VarInfo>,
}

impl Alc {
    pub fn get(&self, name: &str) -> Option<&VarInfo> {
        self.vars.get(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl FromIterator<VarInfo> for Alc {
    fn from_iter<I: IntoIterator<Item = VarInfo>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|v| (v.name.clone(), v)).collect(),
        }
    }
}
