//! Seams between the provider client and its consumers
//!
//! The synchronizer, the command executor, and the companion manager depend
//! on these traits rather than on [`JishiClient`](crate::JishiClient), so each
//! can be exercised against an in-memory fake.

use crate::{Action, ClientError, CommandResponse, StateBlock, ZoneDescriptor};

/// Produces flat topology snapshots
pub trait SnapshotSource: Send + Sync {
    /// Fetch every zone currently reported by the provider
    fn zones(&self) -> Result<Vec<ZoneDescriptor>, ClientError>;
}

/// Applies control commands to named players
pub trait CommandSink: Send + Sync {
    /// Issue `action` against the player (or coordinator) named `target`
    fn send(&self, target: &str, action: &Action) -> Result<CommandResponse, ClientError>;

    /// Read the live state of a single player
    fn device_state(&self, target: &str) -> Result<StateBlock, ClientError>;
}

/// Cheap liveness check against the provider endpoint
pub trait HealthProbe: Send + Sync {
    fn probe(&self) -> bool;
}

/// Brings an unreachable provider back
///
/// Implemented by whatever owns the companion process. Called at most once
/// per failed request before a single retry.
pub trait ProviderRecovery: Send + Sync {
    fn recover(&self) -> Result<(), ClientError>;
}

/// Recovery that never does anything, for setups with an externally managed provider
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecovery;

impl ProviderRecovery for NoRecovery {
    fn recover(&self) -> Result<(), ClientError> {
        Err(ClientError::Recovery(
            "automatic provider recovery is disabled".to_string(),
        ))
    }
}
