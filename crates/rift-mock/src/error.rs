//! Error types for the mock server.

use crate::expectation::Mismatch;

/// Errors produced by the mock server and its expectation handles.
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    /// A matcher rejected an incoming request and the expectation's policy is `Fail`.
    #[error("{0}")]
    MatchFailed(Mismatch),
    #[error("{method} {path} was not made yet.")]
    NotYetInvoked { method: String, path: String },
    #[error("{method} {path} was not called within {timeout_ms}ms.")]
    WaitTimeout {
        method: String,
        path: String,
        timeout_ms: u64,
    },
    /// No expectation is registered for the route. Rendered as a 404, never raised.
    #[error("No expectation registered for {method} {path}")]
    NoRoute { method: String, path: String },
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Connection error: {0}")]
    Connection(#[from] hyper::Error),
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MockError {
    /// True for the timeout delivered to `wait` callers.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MockError::WaitTimeout { .. })
    }
}
