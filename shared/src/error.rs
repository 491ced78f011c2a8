//! Error taxonomy for delivery and command dispatch

use thiserror::Error;

use crate::StatusClass;

/// Why a send did not deliver its payload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("No network connectivity")]
    Connectivity,

    #[error("Schema validation failed: {body}")]
    Validation { body: String },

    #[error("Authentication failed (check project id and API key)")]
    Auth,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Server error (HTTP {status})")]
    Server { status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Unexpected response (HTTP {status})")]
    Unexpected { status: u16 },

    #[error("Gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        last: Box<DeliveryError>,
    },
}

impl DeliveryError {
    /// Map a non-success status code and its body to an error
    pub fn from_status(status: u16, body: &str) -> Self {
        match StatusClass::of(status) {
            StatusClass::SchemaValidation => DeliveryError::Validation { body: body.into() },
            StatusClass::Unauthorized => DeliveryError::Auth,
            StatusClass::RateLimited => DeliveryError::RateLimited,
            StatusClass::ServerError => DeliveryError::Server { status },
            StatusClass::ClientError => DeliveryError::Rejected {
                status,
                body: body.into(),
            },
            StatusClass::Success | StatusClass::Unexpected => DeliveryError::Unexpected { status },
        }
    }

    /// Whether the retry loop absorbs this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::RateLimited
                | DeliveryError::Server { .. }
                | DeliveryError::Transport(_)
                | DeliveryError::Unexpected { .. }
        )
    }

    /// HTTP status behind this error, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Validation { .. } => Some(400),
            DeliveryError::Auth => Some(401),
            DeliveryError::RateLimited => Some(429),
            DeliveryError::Server { status }
            | DeliveryError::Rejected { status, .. }
            | DeliveryError::Unexpected { status } => Some(*status),
            DeliveryError::Exhausted { last, .. } => last.status(),
            DeliveryError::Connectivity | DeliveryError::Transport(_) => None,
        }
    }
}

/// A dispatched command that no handler could act on
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No handler registered for command: {0}")]
    CommandNotFound(String),

    #[error("No duration for pulse command {0} (register one or send `duration`)")]
    DurationUnresolved(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(matches!(
            DeliveryError::from_status(400, "bad field"),
            DeliveryError::Validation { ref body } if body == "bad field"
        ));
        assert_eq!(DeliveryError::from_status(401, ""), DeliveryError::Auth);
        assert!(!DeliveryError::from_status(403, "").is_retryable());
        assert!(!DeliveryError::Connectivity.is_retryable());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(DeliveryError::from_status(429, "").is_retryable());
        assert!(DeliveryError::from_status(502, "").is_retryable());
        assert!(DeliveryError::Transport("reset".into()).is_retryable());
    }

    #[test]
    fn test_exhausted_reports_last_status() {
        let err = DeliveryError::Exhausted {
            attempts: 3,
            last: Box::new(DeliveryError::RateLimited),
        };
        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().contains("3 attempt"));
    }
}
