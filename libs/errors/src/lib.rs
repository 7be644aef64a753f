//! Unified error handling for the gateway services
//!
//! Service crates keep their own fine-grained error enums and convert into
//! [`GatewayError`] at process boundaries (`main`, CLI tools).

use thiserror::Error;

/// Top-level error type for gateway binaries
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result alias used by gateway binaries
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Process exit status for a fatal error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Database(_) => 3,
            Self::Io(_) | Self::Internal(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(GatewayError::Configuration("bad password".into()).exit_code(), 2);
        assert_eq!(GatewayError::Database("unreachable".into()).exit_code(), 3);
        assert_eq!(GatewayError::Internal("boom".into()).exit_code(), 1);
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy");
        let err: GatewayError = io.into();
        assert_eq!(err.to_string(), "IO error: busy");
        assert_eq!(err.exit_code(), 1);
    }
}
