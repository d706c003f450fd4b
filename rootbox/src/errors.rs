//! Error types for the rootbox instance manager.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type RootboxResult<T> = Result<T, RootboxError>;

/// Every failure the instance manager can report.
///
/// The first five variants form the lifecycle taxonomy: allocation and
/// provisioning errors abort a single `create`, a missing runtime is
/// recovered by the degraded execution path, `NotFound` leaves the registry
/// untouched and `ExecutionTimeout` leaves the instance at its last known
/// good state.
#[derive(Debug, Error)]
pub enum RootboxError {
    /// Identifier or port could not be allocated within the attempt budget.
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// Artifact rendering failed for a descriptor that should have been valid.
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// The container runtime is missing or returned an error.
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// No instance with this identifier is registered.
    #[error("instance not found: {0}")]
    NotFound(String),

    /// An external process exceeded its time bound.
    #[error("{operation} timed out after {seconds}s")]
    ExecutionTimeout { operation: String, seconds: u64 },

    /// The requested status transition is not allowed.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Filesystem or serialization failure in the descriptor store.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RootboxError {
    /// True for errors the execution driver recovers from by degrading.
    pub fn is_runtime_unavailable(&self) -> bool {
        matches!(self, RootboxError::RuntimeUnavailable(_))
    }
}

impl From<std::io::Error> for RootboxError {
    fn from(err: std::io::Error) -> Self {
        RootboxError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RootboxError {
    fn from(err: serde_json::Error) -> Self {
        RootboxError::Storage(format!("malformed descriptor: {err}"))
    }
}
