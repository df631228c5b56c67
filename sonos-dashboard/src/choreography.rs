//! Multi-step group formation
//!
//! The provider applies grouping changes asynchronously, so a group is
//! formed as a sequence of single-player commands with settle delays in
//! between:
//!
//! ```text
//! ReadState(coordinator)  tolerated   detects TV / line-in audio
//! Leave(coordinator)      tolerated   coordinator may already be standalone
//! Join(member → coord)    per member  stops at the first failure
//! RestoreVolume(coord)    tolerated   only after TV audio was detected
//! ```
//!
//! Nothing here is atomic. The outcome of every step is recorded so a
//! partially formed group can be reported as such; the next topology poll
//! is the only confirmation that the group exists.

use std::thread;
use std::time::Duration;

use provider_client::Action;
use serde::Serialize;

use crate::error::GroupFormationError;
use crate::executor::CommandExecutor;

/// Delays inserted by the group choreography
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupTiming {
    /// Wait between consecutive joins
    pub join_settle_delay: Duration,
    /// Wait before re-applying the coordinator's volume after TV audio was detected
    pub line_in_restore_delay: Duration,
}

impl Default for GroupTiming {
    fn default() -> Self {
        Self {
            join_settle_delay: Duration::from_secs(2),
            line_in_restore_delay: Duration::from_secs(3),
        }
    }
}

impl GroupTiming {
    pub fn immediate() -> Self {
        Self {
            join_settle_delay: Duration::ZERO,
            line_in_restore_delay: Duration::ZERO,
        }
    }
}

/// One command issued while forming a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum GroupStep {
    ReadState { target: String },
    Leave { target: String },
    Join { member: String, coordinator: String },
    RestoreVolume { target: String, volume: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Skipped,
    /// Failed, but the choreography carried on
    Tolerated(String),
    /// Failed and ended the choreography
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    #[serde(flatten)]
    pub step: GroupStep,
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Structured result of a group formation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupFormation {
    pub coordinator: String,
    /// Members whose join succeeded, in order
    pub joined: Vec<String>,
    pub steps: Vec<StepOutcome>,
    /// The coordinator was playing TV / line-in audio before the change
    pub line_in_detected: bool,
    pub line_in_restored: bool,
}

impl GroupFormation {
    pub fn new(coordinator: impl Into<String>) -> Self {
        Self {
            coordinator: coordinator.into(),
            joined: Vec::new(),
            steps: Vec::new(),
            line_in_detected: false,
            line_in_restored: false,
        }
    }

    /// The step that ended the choreography, if any
    pub fn failed_step(&self) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|outcome| matches!(outcome.status, StepStatus::Failed(_)))
    }

    fn record(&mut self, step: GroupStep, status: StepStatus) {
        self.steps.push(StepOutcome { step, status });
    }
}

impl CommandExecutor {
    /// Form a group led by `coordinator` from `members`, by room name
    ///
    /// Members equal to the coordinator, and repeated members, are skipped.
    /// A failed join stops the sequence and the error carries everything
    /// applied up to that point.
    pub fn create_group(
        &self,
        coordinator: &str,
        members: &[String],
    ) -> Result<GroupFormation, GroupFormationError> {
        if members.is_empty() {
            return Err(GroupFormationError::NoMembers);
        }

        tracing::info!("Creating group led by {} with members {:?}", coordinator, members);
        let mut formation = GroupFormation::new(coordinator);

        let read_step = GroupStep::ReadState { target: coordinator.to_string() };
        let restore_volume = match self.device_state(coordinator) {
            Ok(state) => {
                formation.line_in_detected = state
                    .current_track
                    .as_ref()
                    .is_some_and(|track| track.is_line_in());
                formation.record(read_step, StepStatus::Succeeded);
                state.volume.unwrap_or(0)
            }
            Err(e) => {
                tracing::debug!("Could not read state of {}: {}", coordinator, e);
                formation.record(read_step, StepStatus::Tolerated(e.to_string()));
                0
            }
        };

        let leave_step = GroupStep::Leave { target: coordinator.to_string() };
        match self.execute(&Action::Leave, coordinator) {
            Ok(_) => formation.record(leave_step, StepStatus::Succeeded),
            Err(e) => {
                tracing::debug!("{} was not in a group or could not leave it: {}", coordinator, e);
                formation.record(leave_step, StepStatus::Tolerated(e.to_string()));
            }
        }

        let mut first_join = true;
        for member in members {
            let join_step = GroupStep::Join {
                member: member.clone(),
                coordinator: coordinator.to_string(),
            };

            if member == coordinator || formation.joined.contains(member) {
                formation.record(join_step, StepStatus::Skipped);
                continue;
            }

            if !first_join && !self.timing.join_settle_delay.is_zero() {
                thread::sleep(self.timing.join_settle_delay);
            }
            first_join = false;

            match self.execute(&Action::Join(coordinator.to_string()), member) {
                Ok(_) => {
                    formation.record(join_step, StepStatus::Succeeded);
                    formation.joined.push(member.clone());
                }
                Err(source) => {
                    tracing::error!("Failed to join {} to group led by {}: {}", member, coordinator, source);
                    formation.record(join_step, StepStatus::Failed(source.to_string()));
                    return Err(GroupFormationError::JoinFailed {
                        member: member.clone(),
                        source,
                        formation: Box::new(formation),
                    });
                }
            }
        }

        if formation.line_in_detected {
            let restore_step = GroupStep::RestoreVolume {
                target: coordinator.to_string(),
                volume: restore_volume,
            };

            if restore_volume == 0 {
                formation.record(restore_step, StepStatus::Skipped);
            } else {
                tracing::debug!("{} was playing TV audio, restoring volume {}", coordinator, restore_volume);
                if !self.timing.line_in_restore_delay.is_zero() {
                    thread::sleep(self.timing.line_in_restore_delay);
                }

                match self.execute(&Action::Volume(restore_volume), coordinator) {
                    Ok(_) => {
                        formation.record(restore_step, StepStatus::Succeeded);
                        formation.line_in_restored = true;
                    }
                    Err(e) => {
                        tracing::debug!("Could not restore volume on {}: {}", coordinator, e);
                        formation.record(restore_step, StepStatus::Tolerated(e.to_string()));
                    }
                }
            }
        }

        tracing::info!("Group led by {} formed with {} joined members", coordinator, formation.joined.len());
        Ok(formation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider_client::{ClientError, CommandResponse, CommandSink, NoRecovery, StateBlock, TrackDescriptor};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<String>>,
        fail_target: Option<&'static str>,
        state: Option<StateBlock>,
    }

    impl CommandSink for RecordingSink {
        fn send(&self, target: &str, action: &Action) -> Result<CommandResponse, ClientError> {
            self.sent.lock().push(format!("{}/{}", target, action));
            if self.fail_target == Some(target) {
                return Err(ClientError::Status { code: 500, body: "join rejected".to_string() });
            }
            Ok(CommandResponse { status: 200, body: String::new() })
        }

        fn device_state(&self, _target: &str) -> Result<StateBlock, ClientError> {
            self.state
                .clone()
                .ok_or_else(|| ClientError::Status { code: 404, body: "unknown room".to_string() })
        }
    }

    fn executor(sink: Arc<RecordingSink>) -> CommandExecutor {
        CommandExecutor::new(sink, Arc::new(NoRecovery), Duration::ZERO).with_group_timing(GroupTiming::immediate())
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_members_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let err = executor(sink.clone()).create_group("Living Room", &[]).unwrap_err();
        assert!(matches!(err, GroupFormationError::NoMembers));
        assert!(sink.sent.lock().is_empty());
    }

    #[test]
    fn test_leave_then_join_each_member() {
        let sink = Arc::new(RecordingSink::default());
        let formation = executor(sink.clone())
            .create_group("Living Room", &names(&["Kitchen", "Living Room", "Office"]))
            .unwrap();

        assert_eq!(
            *sink.sent.lock(),
            vec![
                "Living Room/leave",
                "Kitchen/join/Living Room",
                "Office/join/Living Room",
            ]
        );
        assert_eq!(formation.joined, names(&["Kitchen", "Office"]));
        assert!(formation.failed_step().is_none());

        // state read failed (404) but was tolerated
        assert!(matches!(formation.steps[0].status, StepStatus::Tolerated(_)));
        assert_eq!(formation.steps[3].status, StepStatus::Skipped);
    }

    #[test]
    fn test_failed_join_stops_and_reports_partial_formation() {
        let sink = Arc::new(RecordingSink { fail_target: Some("Office"), ..Default::default() });
        let err = executor(sink.clone())
            .create_group("Living Room", &names(&["Kitchen", "Office", "Bedroom"]))
            .unwrap_err();

        let GroupFormationError::JoinFailed { member, formation, .. } = err else {
            panic!("expected a join failure");
        };
        assert_eq!(member, "Office");
        assert_eq!(formation.joined, names(&["Kitchen"]));
        assert!(matches!(
            formation.failed_step().map(|o| &o.step),
            Some(GroupStep::Join { member, .. }) if member == "Office"
        ));
        assert!(!sink.sent.lock().iter().any(|s| s.starts_with("Bedroom")));
    }

    #[test]
    fn test_line_in_volume_restored() {
        let state = StateBlock {
            volume: Some(35),
            current_track: Some(TrackDescriptor {
                uri: Some("x-sonos-htastream:RINCON_000E58A0123401400:spdif".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink { state: Some(state), ..Default::default() });
        let formation = executor(sink.clone())
            .create_group("Living Room", &names(&["Kitchen"]))
            .unwrap();

        assert!(formation.line_in_detected);
        assert!(formation.line_in_restored);
        assert_eq!(sink.sent.lock().last().map(String::as_str), Some("Living Room/volume/35"));
    }

    #[test]
    fn test_line_in_with_zero_volume_skips_restore() {
        let state = StateBlock {
            volume: Some(0),
            current_track: Some(TrackDescriptor {
                uri: Some("x-sonos-htastream:RINCON_000E58A0123401400:spdif".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink { state: Some(state), ..Default::default() });
        let formation = executor(sink.clone())
            .create_group("Living Room", &names(&["Kitchen"]))
            .unwrap();

        assert!(formation.line_in_detected);
        assert!(!formation.line_in_restored);
        assert_eq!(formation.steps.last().map(|o| &o.status), Some(&StepStatus::Skipped));
        assert_eq!(sink.sent.lock().len(), 2);
    }

    #[test]
    fn test_step_serialization() {
        let outcome = StepOutcome {
            step: GroupStep::Join { member: "Kitchen".to_string(), coordinator: "Living Room".to_string() },
            status: StepStatus::Failed("boom".to_string()),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["step"], "join");
        assert_eq!(json["member"], "Kitchen");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
    }
}
