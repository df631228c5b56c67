use companion::CompanionError;
use provider_client::ClientError;
use sonos_topology::TopologyError;
use thiserror::Error;

use crate::choreography::GroupFormation;

/// A control command that did not go through
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{action} on {target} failed: {source}")]
    Failed {
        action: &'static str,
        target: String,
        #[source]
        source: ClientError,
    },

    #[error("{action} on {target} failed and the provider could not be recovered: {recovery} (command failed with: {cause})")]
    RecoveryFailed {
        action: &'static str,
        target: String,
        cause: ClientError,
        #[source]
        recovery: ClientError,
    },

    #[error("{action} on {target} failed after provider recovery: {source}")]
    RetryFailed {
        action: &'static str,
        target: String,
        #[source]
        source: ClientError,
    },
}

impl CommandError {
    /// The provider error that ended the command
    pub fn client_error(&self) -> &ClientError {
        match self {
            CommandError::Failed { source, .. } | CommandError::RetryFailed { source, .. } => source,
            CommandError::RecoveryFailed { recovery, .. } => recovery,
        }
    }

    /// HTTP-style status reported by the provider, if it answered at all
    pub fn status_code(&self) -> Option<u16> {
        self.client_error().status_code()
    }

    pub fn target(&self) -> &str {
        match self {
            CommandError::Failed { target, .. }
            | CommandError::RecoveryFailed { target, .. }
            | CommandError::RetryFailed { target, .. } => target,
        }
    }
}

/// Group creation stopped before every member joined
#[derive(Error, Debug)]
pub enum GroupFormationError {
    #[error("no member rooms provided")]
    NoMembers,

    #[error("failed to join {member} to group led by {}: {source}", .formation.coordinator)]
    JoinFailed {
        member: String,
        #[source]
        source: CommandError,
        /// Steps applied before the failure, including the failed join
        formation: Box<GroupFormation>,
    },
}

impl GroupFormationError {
    /// What was applied before the choreography stopped
    pub fn partial(&self) -> Option<&GroupFormation> {
        match self {
            GroupFormationError::NoMembers => None,
            GroupFormationError::JoinFailed { formation, .. } => Some(formation),
        }
    }
}

/// Errors surfaced by [`SonosService`](crate::SonosService)
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider client error: {0}")]
    Client(#[from] ClientError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Companion error: {0}")]
    Companion(#[from] CompanionError),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Device {device} is not a member of group {group}")]
    NotInGroup { device: String, group: String },

    #[error("Invalid volume {0}: must be between 0 and 100")]
    InvalidVolume(i64),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Group creation failed: {0}")]
    GroupFormation(#[from] GroupFormationError),

    #[error("Service is already running")]
    AlreadyRunning,

    #[error("Failed to start topology poller: {0}")]
    Poller(#[from] std::io::Error),

    #[error("Companion management is not available for this service")]
    CompanionUnavailable,
}

impl ServiceError {
    /// A device or group id that does not resolve
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::DeviceNotFound(_) | ServiceError::GroupNotFound(_)
        )
    }

    /// The caller passed something that can never succeed
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidVolume(_)
                | ServiceError::NotInGroup { .. }
                | ServiceError::GroupFormation(GroupFormationError::NoMembers)
        )
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
