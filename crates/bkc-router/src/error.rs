use bkc_common::Category;
use thiserror::Error;

/// Message surfaced when the server rejects a call without explaining why
pub const DEFAULT_API_ERROR: &str = "API error";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouterError {
    /// Node unreachable, connection reset, timeout
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed body or a non-success status that another node may not repeat
    #[error("{message}")]
    Protocol { status: Option<u16>, message: String },

    /// The server deterministically rejected a well-formed request
    #[error("{message}")]
    Domain { status: u16, message: String },

    #[error("Network error: no backend nodes available for {0}")]
    NoNodes(Category),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl RouterError {
    /// Transport and protocol failures are worth trying on another node
    pub fn is_retryable(&self) -> bool {
        matches!(self, RouterError::Transport(_) | RouterError::Protocol { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RouterError::Protocol { status, .. } => *status,
            RouterError::Domain { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn outcome_label(&self) -> &'static str {
        match self {
            RouterError::Transport(_) => "transport_error",
            RouterError::Protocol { .. } => "protocol_error",
            RouterError::Domain { .. } => "domain_error",
            RouterError::NoNodes(_) => "no_nodes",
            RouterError::InvalidPayload(_) => "invalid_payload",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RouterError::Transport("reset".into()).is_retryable());
        assert!(RouterError::Protocol { status: Some(503), message: "busy".into() }.is_retryable());
        assert!(!RouterError::Domain { status: 400, message: "invalid amount".into() }.is_retryable());
        assert!(!RouterError::NoNodes(Category::Ledger).is_retryable());
        assert!(!RouterError::InvalidPayload("array".into()).is_retryable());
    }

    #[test]
    fn test_domain_error_displays_server_message() {
        let err = RouterError::Domain { status: 400, message: "insufficient balance".into() };
        assert_eq!(err.to_string(), "insufficient balance");
        assert_eq!(err.status(), Some(400));
    }
}
