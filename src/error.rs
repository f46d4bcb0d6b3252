//! Gateway error taxonomy.
//!
//! Every middleware stage returns a [`GatewayError`]. Rendering to a client
//! response happens in exactly one place, [`crate::http::error_handler`].

use std::fmt;

use thiserror::Error;

/// Numeric or opaque code attached to a failure.
///
/// Collaborator stores may surface driver codes (e.g. `"11000"` for a
/// duplicate key) that are not HTTP statuses. The error handler decides how
/// to map them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    Numeric(u32),
    Opaque(String),
}

impl ErrorCode {
    /// Parse a code, keeping non-numeric values as opaque text.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<u32>() {
            Ok(n) => ErrorCode::Numeric(n),
            Err(_) => ErrorCode::Opaque(raw.to_string()),
        }
    }
}

impl From<u16> for ErrorCode {
    fn from(code: u16) -> Self {
        ErrorCode::Numeric(code as u32)
    }
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        ErrorCode::Numeric(code)
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        ErrorCode::parse(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Numeric(n) => write!(f, "{}", n),
            ErrorCode::Opaque(s) => f.write_str(s),
        }
    }
}

/// Failure reported by a collaborator store.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
    pub code: Option<ErrorCode>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Attach a code (HTTP status or driver code).
    pub fn with_code(mut self, code: impl Into<ErrorCode>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Errors produced by the gateway middleware.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Authentication or authorization failure.
    #[error("{0}")]
    NotAuthorized(String),

    /// Malformed input.
    #[error("{0}")]
    BadRequest(String),

    /// Referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Middleware misconfiguration.
    #[error("{0}")]
    NotImplemented(String),

    /// Collaborator store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Anything else; rendered as a 500.
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn not_authorized(message: impl Into<String>) -> Self {
        GatewayError::NotAuthorized(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        GatewayError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        GatewayError::NotFound(message.into())
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        GatewayError::NotImplemented(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal(message.into())
    }

    /// Code attached to this failure, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            GatewayError::NotAuthorized(_) => Some(ErrorCode::Numeric(401)),
            GatewayError::BadRequest(_) => Some(ErrorCode::Numeric(400)),
            GatewayError::NotFound(_) => Some(ErrorCode::Numeric(404)),
            GatewayError::NotImplemented(_) => Some(ErrorCode::Numeric(501)),
            GatewayError::Store(e) => e.code.clone(),
            GatewayError::Internal(_) => None,
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
