//! Symbolic tag requests as they arrive from SCGI or the data logger

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, ScgiSrvError};

/// Which service answers a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// `sys.<name>`
    System,
    /// `c<nad>.sys.<name>`
    PlcSystem,
    /// `c<nad>.<tag>`
    Plc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RwRequest {
    /// Full name as requested, e.g. `c1000.lc00_qx00`
    pub name: String,
    /// Name inside the target namespace, e.g. `lc00_qx00`
    pub tag_name: String,
    /// Set for writes
    pub value: Option<String>,
    pub target: Target,
    /// `None` for system tags
    pub nad: Option<u32>,
}

impl RwRequest {
    pub fn read(name: &str) -> Result<Self> {
        Self::parse(name, None)
    }

    pub fn write(name: &str, value: &str) -> Result<Self> {
        Self::parse(name, Some(value.to_string()))
    }

    pub fn parse(name: &str, value: Option<String>) -> Result<Self> {
        let invalid = || ScgiSrvError::InvalidTagName(name.to_string());
        if name.is_empty() {
            return Err(invalid());
        }

        let (prefix, rest) = name.split_once('.').unwrap_or((name, ""));
        let (target, tag_name, nad) = if prefix == "sys" {
            (Target::System, rest.to_string(), None)
        } else {
            let nad = plc_name_pattern()
                .and_then(|re| re.captures(prefix))
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .ok_or_else(invalid)?;
            if rest.starts_with("sys") {
                let tag = rest.split_once('.').map_or("", |(_, tag)| tag);
                (Target::PlcSystem, tag.to_string(), Some(nad))
            } else {
                (Target::Plc, rest.to_string(), Some(nad))
            }
        };

        Ok(Self {
            name: name.to_string(),
            tag_name,
            value,
            target,
            nad,
        })
    }

    pub fn is_write(&self) -> bool {
        self.value.is_some()
    }
}

impl fmt::Display for RwRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.name, value),
            None => f.write_str(&self.name),
        }
    }
}

fn plc_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^c(\d+)$").ok()).as_ref()
}
