//! Gateway error taxonomy.
//!
//! Every failure the gateway can produce is normalized into a single
//! `{ message, status }` shape so the workflow can surface it verbatim.

use thiserror::Error;

/// Message used when the remote service fails without a readable error body.
pub const GENERIC_REMOTE_MESSAGE: &str = "Backend analysis failed";

/// Message used when a transport failure carries no usable description.
pub const GENERIC_TRANSPORT_MESSAGE: &str = "Internal server error";

/// Message used when the patient identifier is missing or blank.
pub const MISSING_PATIENT_MESSAGE: &str = "Patient ID is required";

/// Errors produced while talking to the remote analysis service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Missing or empty patient identifier. Raised before any network call.
    #[error("{message}")]
    Validation { message: String },

    /// The service answered with a non-success status.
    #[error("{message}")]
    Remote { status: u16, message: String },

    /// The service could not be reached or its answer could not be read.
    #[error("{message}")]
    Transport { message: String },

    /// The request exceeded the configured timeout.
    #[error("{message}")]
    Timeout { message: String },
}

/// Result type alias for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Transport failure; an empty description falls back to the generic message.
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            GENERIC_TRANSPORT_MESSAGE.to_string()
        } else {
            message
        };
        Self::Transport { message }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// HTTP-style status code of the normalized error.
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::Validation { .. } => 400,
            GatewayError::Remote { status, .. } => *status,
            GatewayError::Transport { .. } => 500,
            GatewayError::Timeout { .. } => 504,
        }
    }

    /// Human-readable message of the normalized error.
    pub fn message(&self) -> &str {
        match self {
            GatewayError::Validation { message }
            | GatewayError::Remote { message, .. }
            | GatewayError::Transport { message }
            | GatewayError::Timeout { message } => message,
        }
    }
}
