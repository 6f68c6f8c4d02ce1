//! Error types for the registry store.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for registry operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors returned by registry mutations and lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("gateway {key} not found in region {region}")]
    GatewayNotFound { key: String, region: String },

    #[error("agent {domain} not found in region {region}")]
    AgentNotFound { domain: String, region: String },
}

impl StateError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Stable numeric code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::GatewayNotFound { .. } | Self::AgentNotFound { .. } => ErrorCode::NotFound,
        }
    }
}

/// Numeric error codes embedded in `{code, message}` responses.
///
/// Values are part of the external contract and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum ErrorCode {
    Validation = 1,
    NotFound = 2,
    Internal = 3,
    Unavailable = 4,
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        code as u32
    }
}

impl TryFrom<u32> for ErrorCode {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Validation),
            2 => Ok(Self::NotFound),
            3 => Ok(Self::Internal),
            4 => Ok(Self::Unavailable),
            other => Err(format!("unknown error code {other}")),
        }
    }
}
