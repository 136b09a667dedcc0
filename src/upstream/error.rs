use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single upstream call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connection-level failure (DNS, reset, refused)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("Upstream returned HTTP {status}: {message}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The per-call timer fired
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller's token fired
    #[error("Request cancelled")]
    Cancelled,
}

/// Coarse error kind, for logging and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// See [`FetchError::Network`]
    Network,
    /// See [`FetchError::HttpStatus`]
    HttpStatus,
    /// See [`FetchError::InvalidResponse`]
    InvalidResponse,
    /// See [`FetchError::Timeout`]
    Timeout,
    /// See [`FetchError::Cancelled`]
    Cancelled,
}

impl FetchError {
    /// Error kind
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Network(_) => FetchErrorKind::Network,
            Self::HttpStatus { .. } => FetchErrorKind::HttpStatus,
            Self::InvalidResponse(_) => FetchErrorKind::InvalidResponse,
            Self::Timeout(_) => FetchErrorKind::Timeout,
            Self::Cancelled => FetchErrorKind::Cancelled,
        }
    }

    /// HTTP 429 from the provider
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 429, .. })
    }

    /// HTTP 5xx from the provider
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::HttpStatus { status, .. } if (500..600).contains(status))
    }

    /// Connection-level failure
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Per-call timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Caller cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Map a status code to `Ok(())` for 2xx, otherwise [`FetchError::HttpStatus`]
pub fn check_status(status: u16, body: &str) -> Result<(), FetchError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(FetchError::HttpStatus {
            status,
            message: body.trim().to_string(),
        })
    }
}

/// Decode a JSON body, reporting failures as [`FetchError::InvalidResponse`]
pub fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, FetchError> {
    Ok(serde_json::from_str(body)?)
}
