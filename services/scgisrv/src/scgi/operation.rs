//! Query string extraction
//!
//! A request is an HTTP request line plus headers. Only the query string
//! of the URI matters: `&`-separated `key` reads and `key=value` writes.
//! Every write key is also read back.

use std::fmt;

use crate::error::{Result, ScgiSrvError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub key: String,
    pub value: Option<String>,
}

impl Operation {
    pub fn read(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: None,
        }
    }

    pub fn write(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: Some(value.to_string()),
        }
    }

    pub fn is_write(&self) -> bool {
        self.value.is_some()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.key, value),
            None => f.write_str(&self.key),
        }
    }
}

/// Reads (deduplicated, first-seen order) and writes (as sent)
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Operations {
    pub reads: Vec<Operation>,
    pub writes: Vec<Operation>,
}

pub fn parse_request(data: &[u8]) -> Result<Operations> {
    let text = std::str::from_utf8(data)
        .map_err(|_| ScgiSrvError::scgi("request is not valid UTF-8"))?;
    let query = query_string(text)
        .ok_or_else(|| ScgiSrvError::scgi(format!("Http request error: {:?}", text)))?;
    Ok(extract_operations(query))
}

fn query_string(text: &str) -> Option<&str> {
    let (request_line, _headers) = text.split_once("\r\n")?;

    let mut parts = request_line.split_whitespace();
    let (_method, uri, _protocol) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let mut uri_parts = uri.split('?');
    let (_path, query) = (uri_parts.next()?, uri_parts.next()?);
    if uri_parts.next().is_some() {
        return None;
    }
    Some(query)
}

pub fn extract_operations(query: &str) -> Operations {
    let mut operations = Operations::default();
    for entry in query.split('&') {
        let mut members = entry.split('=');
        let key = members.next().unwrap_or_default();
        if let Some(value) = members.next() {
            operations.writes.push(Operation::write(key, value));
        }
        if !operations.reads.iter().any(|op| op.key == key) {
            operations.reads.push(Operation::read(key));
        }
    }
    operations
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_reads_and_writes() {
        let ops = parse_request(b"GET /scgi/?c1000.a&c1000.b=5&sys.server_version HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();
        let reads: Vec<_> = ops.reads.iter().map(|op| op.key.as_str()).collect();
        assert_eq!(reads, ["c1000.a", "c1000.b", "sys.server_version"]);
        assert_eq!(ops.writes, vec![Operation::write("c1000.b", "5")]);
    }

    #[test]
    fn test_duplicate_reads_keep_first_position() {
        let ops = extract_operations("c1.x&c1.y&c1.x=3");
        let reads: Vec<_> = ops.reads.iter().map(ToString::to_string).collect();
        assert_eq!(reads, ["c1.x", "c1.y"]);
        assert_eq!(ops.writes.len(), 1);
    }

    #[test]
    fn test_extra_equals_keeps_second_member() {
        let ops = extract_operations("c1.x=1=2");
        assert_eq!(ops.writes[0].value.as_deref(), Some("1"));
    }

    #[test]
    fn test_malformed_requests() {
        let cases: [&[u8]; 4] = [
            b"GET /?c1.x HTTP/1.1",
            b"GET /c1.x HTTP/1.1\r\n\r\n",
            b"GET /?a?b HTTP/1.1\r\n\r\n",
            b"GET ?c1.x\r\n\r\n",
        ];
        for data in cases {
            assert!(
                matches!(parse_request(data), Err(ScgiSrvError::ScgiError(_))),
                "{:?}",
                String::from_utf8_lossy(data)
            );
        }
    }
}
