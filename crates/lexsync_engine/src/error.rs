//! Error types for connectors and the orchestrator.

use lexsync_queue::QueueError;
use std::time::Duration;
use thiserror::Error;

/// Result type for connector calls.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Result type for orchestrator operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by a [`crate::Connector`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// The remote system could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The call did not complete in time.
    #[error("connector call timed out after {0:?}")]
    Timeout(Duration),

    /// Credentials were missing or rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The remote system rejected the payload.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The remote system answered with an error status.
    #[error("server returned {status}: {message}")]
    Server {
        /// HTTP-style status code.
        status: u16,
        /// Error body or reason.
        message: String,
    },

    /// The connector does not implement the operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

impl ConnectorError {
    /// Creates a server error.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Returns true if the same call may succeed later.
    ///
    /// Network failures, timeouts and 5xx responses are transient. Everything
    /// else needs a change to the payload or the credentials first.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConnectorError::Network(_) | ConnectorError::Timeout(_) => true,
            ConnectorError::Server { status, .. } => *status >= 500,
            ConnectorError::Auth(_)
            | ConnectorError::Validation(_)
            | ConnectorError::Unsupported(_) => false,
        }
    }
}

/// Errors returned by [`crate::SyncOrchestrator`].
#[derive(Error, Debug)]
pub enum EngineError {
    /// The durable queue failed.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// A connector call failed and there was nothing to fall back to.
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// No connector is registered for the entity class.
    #[error("no connector registered for entity class '{0}'")]
    NoConnector(String),

    /// The orchestrator was closed.
    #[error("sync orchestrator is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ConnectorError::Network("connection reset".into()).is_retryable());
        assert!(ConnectorError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(ConnectorError::server(503, "unavailable").is_retryable());
        assert!(!ConnectorError::server(409, "duplicate").is_retryable());
        assert!(!ConnectorError::Validation("missing client name".into()).is_retryable());
        assert!(!ConnectorError::Auth("token expired".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ConnectorError::server(502, "bad gateway");
        assert_eq!(err.to_string(), "server returned 502: bad gateway");

        let err = EngineError::NoConnector("documents".into());
        assert!(err.to_string().contains("documents"));
    }
}
