//! Read responses returned for every requested tag

use std::fmt;

use super::request::RwRequest;

/// Error code sent as `<error_code>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    NoError = 0,
    Timeout = 1,
    Unknown = 2,
    DeviceNotFound = 3,
    PlcHeadError = 4,
    NoAlcError = 5,
}

impl Code {
    pub fn name(self) -> &'static str {
        match self {
            Code::NoError => "NO_ERROR",
            Code::Timeout => "TIMEOUT",
            Code::Unknown => "UNKNOWN",
            Code::DeviceNotFound => "DEVICE_NOT_FOUND",
            Code::PlcHeadError => "PLC_HEAD_ERROR",
            Code::NoAlcError => "NO_ALC_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseValue {
    Text(String),
    /// Rendered as `<item>` children
    List(Vec<String>),
}

impl Default for ResponseValue {
    fn default() -> Self {
        ResponseValue::Text("?".to_string())
    }
}

impl From<String> for ResponseValue {
    fn from(value: String) -> Self {
        ResponseValue::Text(value)
    }
}

impl From<&str> for ResponseValue {
    fn from(value: &str) -> Self {
        ResponseValue::Text(value.to_string())
    }
}

impl From<Vec<String>> for ResponseValue {
    fn from(value: Vec<String>) -> Self {
        ResponseValue::List(value)
    }
}

impl fmt::Display for ResponseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseValue::Text(text) => f.write_str(text),
            ResponseValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RResponse {
    pub name: String,
    pub tag_name: String,
    pub value: ResponseValue,
    pub description: String,
    pub valid: bool,
    pub code: Code,
    /// Served from the per-controller cache
    pub cached: bool,
}

impl RResponse {
    pub fn ok(
        request: &RwRequest,
        value: impl Into<ResponseValue>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: request.name.clone(),
            tag_name: request.tag_name.clone(),
            value: value.into(),
            description: description.into(),
            valid: true,
            code: Code::NoError,
            cached: false,
        }
    }

    pub fn error(request: &RwRequest, code: Code) -> Self {
        Self {
            name: request.name.clone(),
            tag_name: request.tag_name.clone(),
            value: request.value.clone().map(ResponseValue::Text).unwrap_or_default(),
            description: String::new(),
            valid: false,
            code,
            cached: false,
        }
    }

    /// Unknown status tags are still "valid" replies with an error code
    pub fn unknown(request: &RwRequest) -> Self {
        Self {
            code: Code::Unknown,
            ..Self::ok(request, "?", "")
        }
    }

    /// Stand-in sent when a request produced no responses at all
    pub fn placeholder() -> Self {
        Self {
            name: String::new(),
            tag_name: "?".to_string(),
            value: ResponseValue::Text(String::new()),
            description: String::new(),
            valid: false,
            code: Code::DeviceNotFound,
            cached: false,
        }
    }
}

pub fn responses_with_code(requests: &[RwRequest], code: Code) -> Vec<RResponse> {
    requests.iter().map(|r| RResponse::error(r, code)).collect()
}

impl fmt::Display for RResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if self.code != Code::NoError {
            write!(f, " {}", self.code.name())?;
        }
        if !self.description.is_empty() {
            write!(f, " \"{}\"", self.description)?;
        }
        Ok(())
    }
}
