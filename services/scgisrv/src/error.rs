//! Error types for the SCGI gateway

use errors::GatewayError;
use thiserror::Error;

/// Gateway service errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScgiSrvError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Truncated, oversized or corrupted ABUS/IEX frame
    #[error("Frame error: {0}")]
    FrameError(String),

    /// No matching response after all retries
    #[error("Exchange timeout: {0}")]
    ExchangerTimeout(String),

    /// Tag name does not follow `sys.x`, `cN.sys.x` or `cN.x`
    #[error("Invalid tag name: {0}")]
    InvalidTagName(String),

    /// Malformed SCGI request
    #[error("SCGI error: {0}")]
    ScgiError(String),

    /// Controller program missing, not running or reloaded mid-read
    #[error("PLC head not ok: {0}")]
    PlcHeadError(String),

    /// No registry entry for the requested nad
    #[error("PLC info not found: c{0}")]
    PlcInfoNotFound(u32),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Data logger XML configuration rejected
    #[error("Data logger config error: {0}")]
    DataLoggerConfig(#[from] DataLoggerConfigError),

    /// Sampled value is not numeric where a number is required
    #[error("Unexpected value: {0}")]
    UnexpectedValue(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Data logger XML configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataLoggerConfigError {
    #[error("unexpected tag <{0}>")]
    UnexpectedTag(String),

    #[error("missing tag <{0}>")]
    MissingTag(String),

    #[error("invalid value for <{0}>: {1}")]
    InvalidValue(String, String),

    #[error("xml: {0}")]
    Xml(String),
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, ScgiSrvError>;

impl ScgiSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        ScgiSrvError::ConfigError(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        ScgiSrvError::IoError(msg.into())
    }

    pub fn frame(msg: impl Into<String>) -> Self {
        ScgiSrvError::FrameError(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        ScgiSrvError::ExchangerTimeout(msg.into())
    }

    pub fn scgi(msg: impl Into<String>) -> Self {
        ScgiSrvError::ScgiError(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        ScgiSrvError::DatabaseError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ScgiSrvError::InternalError(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ScgiSrvError::ExchangerTimeout(_))
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<std::io::Error> for ScgiSrvError {
    fn from(err: std::io::Error) -> Self {
        ScgiSrvError::IoError(err.to_string())
    }
}

impl From<sqlx::Error> for ScgiSrvError {
    fn from(err: sqlx::Error) -> Self {
        ScgiSrvError::DatabaseError(err.to_string())
    }
}

impl From<figment::Error> for ScgiSrvError {
    fn from(err: figment::Error) -> Self {
        ScgiSrvError::ConfigError(err.to_string())
    }
}

impl From<quick_xml::Error> for ScgiSrvError {
    fn from(err: quick_xml::Error) -> Self {
        ScgiSrvError::DataLoggerConfig(DataLoggerConfigError::Xml(err.to_string()))
    }
}

impl From<zip::result::ZipError> for ScgiSrvError {
    fn from(err: zip::result::ZipError) -> Self {
        ScgiSrvError::FrameError(format!("alc.zip: {err}"))
    }
}

// ============================================================================
// Extension trait for adding context to errors
// ============================================================================

/// Extension trait for adding context to errors
pub trait ErrorExt<T> {
    fn config_error(self, msg: &str) -> Result<T>;
    fn io_error(self, msg: &str) -> Result<T>;
    fn context(self, msg: &str) -> Result<T>;
}

impl<T, E> ErrorExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn config_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| ScgiSrvError::ConfigError(format!("{msg}: {e}")))
    }

    fn io_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| ScgiSrvError::IoError(format!("{msg}: {e}")))
    }

    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| ScgiSrvError::InternalError(format!("{msg}: {e}")))
    }
}

// ============================================================================
// Conversion to GatewayError for process boundaries
// ============================================================================

impl From<ScgiSrvError> for GatewayError {
    fn from(err: ScgiSrvError) -> Self {
        match err {
            ScgiSrvError::ConfigError(msg) => GatewayError::Configuration(msg),
            ScgiSrvError::DataLoggerConfig(e) => GatewayError::Configuration(e.to_string()),
            ScgiSrvError::IoError(msg) => GatewayError::Io(std::io::Error::other(msg)),
            ScgiSrvError::DatabaseError(msg) => GatewayError::Database(msg),
            other => GatewayError::Internal(other.to_string()),
        }
    }
}
