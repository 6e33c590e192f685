//! Error types for the invocation bridge.

use http::StatusCode;
use thiserror::Error;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// A categorized failure reported by the function-invocation service.
///
/// The `Display` form is the code immediately followed by the message.
/// That exact text becomes the body of the 400 response, so it must not
/// gain a separator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}{message}")]
pub struct InvokeError {
    pub code: String,
    pub message: String,
}

impl InvokeError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new("RequestTimeout", message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new("ConnectionError", message)
    }

    pub fn service(message: impl Into<String>) -> Self {
        Self::new("ServiceException", message)
    }
}

/// Failures while building the context blob.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to encode client context: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to decode client context: {0}")]
    Decode(String),

    #[error("client context is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Why a result payload did not yield an HTTP status.
#[derive(Debug, Error)]
pub enum PayloadStatusError {
    #[error("payload is not a JSON object: {0}")]
    NotAnObject(serde_json::Error),

    #[error("payload has no statusCode field")]
    Missing,

    #[error("statusCode is not an integer: {0}")]
    NotAnInteger(String),

    #[error("statusCode {0} is not a valid HTTP status")]
    OutOfRange(i64),
}

/// Failures that end a request before the invocation result is written.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("request does not name a function")]
    MissingFunctionName,
}

impl BridgeError {
    /// HTTP status used when this error is rendered as a response.
    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::Context(_) | BridgeError::BodyRead(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            BridgeError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            BridgeError::MissingFunctionName => StatusCode::BAD_REQUEST,
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
