//! Command execution with one-shot provider recovery

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use provider_client::{Action, ClientError, CommandResponse, CommandSink, ProviderRecovery, StateBlock};

use crate::choreography::GroupTiming;
use crate::error::CommandError;

/// Applies control commands to named players
///
/// When the provider cannot be reached at all (connection refused, unknown
/// host) the executor asks [`ProviderRecovery`] to bring it back, waits the
/// settle delay, and retries exactly once. Every other failure is returned
/// as is.
pub struct CommandExecutor {
    sink: Arc<dyn CommandSink>,
    recovery: Arc<dyn ProviderRecovery>,
    settle_delay: Duration,
    pub(crate) timing: GroupTiming,
}

impl CommandExecutor {
    pub fn new(
        sink: Arc<dyn CommandSink>,
        recovery: Arc<dyn ProviderRecovery>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            sink,
            recovery,
            settle_delay,
            timing: GroupTiming::default(),
        }
    }

    /// Delays used by [`create_group`](Self::create_group)
    pub fn with_group_timing(mut self, timing: GroupTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn group_timing(&self) -> GroupTiming {
        self.timing
    }

    /// Issue `action` against the player or coordinator named `target`
    pub fn execute(&self, action: &Action, target: &str) -> Result<CommandResponse, CommandError> {
        tracing::debug!("Executing {} on {}", action, target);

        match self.sink.send(target, action) {
            Ok(response) => Ok(response),
            Err(cause) if cause.is_unreachable() => {
                tracing::warn!(
                    "Provider unreachable while sending {} to {} ({}), attempting recovery",
                    action.name(),
                    target,
                    cause
                );

                if let Err(recovery) = self.recovery.recover() {
                    tracing::error!("Provider recovery failed: {}", recovery);
                    return Err(CommandError::RecoveryFailed {
                        action: action.name(),
                        target: target.to_string(),
                        cause,
                        recovery,
                    });
                }

                if !self.settle_delay.is_zero() {
                    thread::sleep(self.settle_delay);
                }

                self.sink.send(target, action).map_err(|source| {
                    tracing::error!("{} on {} failed after recovery: {}", action.name(), target, source);
                    CommandError::RetryFailed {
                        action: action.name(),
                        target: target.to_string(),
                        source,
                    }
                })
            }
            Err(source) => {
                tracing::error!("{} on {} failed: {}", action.name(), target, source);
                Err(CommandError::Failed {
                    action: action.name(),
                    target: target.to_string(),
                    source,
                })
            }
        }
    }

    /// Read the live state of a single player, without recovery
    pub fn device_state(&self, target: &str) -> Result<StateBlock, CommandError> {
        self.sink
            .device_state(target)
            .map_err(|source: ClientError| CommandError::Failed {
                action: "state",
                target: target.to_string(),
                source,
            })
    }
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("settle_delay", &self.settle_delay)
            .field("timing", &self.timing)
            .finish()
    }
}
