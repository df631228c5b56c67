//! Error types for the topology synchronizer

use provider_client::ClientError;
use thiserror::Error;

/// Result type for topology operations
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Reasons a synchronization pass left the model untouched
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The snapshot could not be fetched and recovery was not attempted
    #[error("Snapshot fetch failed: {0}")]
    Fetch(#[source] ClientError),

    /// The provider was unreachable and could not be brought back
    #[error("Provider recovery failed: {recovery} (snapshot fetch failed with: {cause})")]
    RecoveryFailed {
        cause: ClientError,
        #[source]
        recovery: ClientError,
    },

    /// Recovery succeeded but the retried fetch still failed
    #[error("Snapshot fetch failed after provider recovery: {0}")]
    RetryFailed(#[source] ClientError),
}

impl TopologyError {
    /// The provider error that ended the pass
    pub fn client_error(&self) -> &ClientError {
        match self {
            TopologyError::Fetch(e) | TopologyError::RetryFailed(e) => e,
            TopologyError::RecoveryFailed { recovery, .. } => recovery,
        }
    }
}
