//! Error taxonomy for every gateway operation and its mapping to public messages.

use std::time::Duration;

use thiserror::Error;
use tracing::{error, warn};

use crate::backend::BackendError;
use crate::validation::ValidationError;

/// Result alias used by every operation family.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failure taxonomy shared by graph operations, path finding, raw queries and stats.
///
/// Validation always happens before any backend call. Backend-reported failures carry
/// the backend's message; everything else unexpected is [`GatewayError::Internal`],
/// whose detail is logged but never shown to callers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed request, invalid identifier or out-of-range bound.
    #[error("{0}")]
    Validation(String),
    /// No matching entity, or no path within the bound.
    #[error("{0}")]
    NotFound(String),
    /// The backend rejected or failed a statement.
    #[error("Database error: {0}")]
    Backend(String),
    /// Any other unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
    /// A statement did not finish within the per-call deadline.
    #[error("statement exceeded deadline of {} ms", .0.as_millis())]
    Timeout(Duration),
}

impl GatewayError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        GatewayError::Validation(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        GatewayError::NotFound(message.into())
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal(message.into())
    }

    /// Message safe to return to callers.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Logs backend, internal and timeout failures for `operation`; caller errors stay quiet.
    pub fn log(&self, operation: &'static str) {
        match self {
            GatewayError::Backend(message) => {
                error!(operation, %message, "backend rejected statement")
            }
            GatewayError::Internal(message) => {
                error!(operation, %message, "unexpected failure")
            }
            GatewayError::Timeout(deadline) => {
                warn!(operation, deadline_ms = deadline.as_millis() as u64, "statement timed out")
            }
            GatewayError::Validation(_) | GatewayError::NotFound(_) => {}
        }
    }
}

impl From<ValidationError> for GatewayError {
    fn from(err: ValidationError) -> Self {
        GatewayError::Validation(err.to_string())
    }
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Rejected(message) => GatewayError::Backend(message),
            other => GatewayError::Internal(other.to_string()),
        }
    }
}
