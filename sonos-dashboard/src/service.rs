//! The dashboard service facade
//!
//! [`SonosService`] owns one synchronizer, one command executor and
//! (optionally) one companion manager, and exposes the read and command
//! API the HTTP layer calls into.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use companion::{CompanionManager, CompanionStatus};
use parking_lot::Mutex;
use provider_client::{
    Action, ClientError, CommandSink, JishiClient, NoRecovery, ProviderRecovery, SnapshotSource,
};
use serde::Serialize;
use sonos_topology::{Device, DeviceId, Group, GroupId, SyncReport, TopologySnapshot, TopologySynchronizer};

use crate::choreography::{GroupFormation, GroupTiming};
use crate::config::DashboardConfig;
use crate::error::{GroupFormationError, Result, ServiceError};
use crate::executor::CommandExecutor;
use crate::poller::Poller;

/// What a successful command was applied to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub action: &'static str,
    /// Room name the command was sent to
    pub target_name: String,
}

/// Operational summary for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub polling: bool,
    pub provider_url: Option<String>,
    pub last_successful_sync: Option<DateTime<Utc>>,
    pub devices: usize,
    pub groups: usize,
}

/// Recovers an unreachable provider by starting the companion and
/// repointing the client at it
struct CompanionRecovery {
    manager: Arc<CompanionManager>,
    client: JishiClient,
}

impl ProviderRecovery for CompanionRecovery {
    fn recover(&self) -> std::result::Result<(), ClientError> {
        self.manager
            .ensure_running()
            .map_err(|e| ClientError::Recovery(e.to_string()))?;
        self.client.set_base_url(&self.manager.url())
    }
}

/// Topology polling, device/group commands and companion management
///
/// ```rust,ignore
/// use sonos_dashboard::{DashboardConfig, SonosService};
///
/// let service = SonosService::new(DashboardConfig::from_env()?)?;
/// service.start()?;
/// for group in service.groups() {
///     service.pause_group(group.id().as_str())?;
/// }
/// service.stop()?;
/// ```
pub struct SonosService {
    config: DashboardConfig,
    /// Present when the service talks to a real provider
    client: Option<JishiClient>,
    synchronizer: Arc<TopologySynchronizer>,
    executor: CommandExecutor,
    companion: Option<Arc<CompanionManager>>,
    poller: Mutex<Option<Poller>>,
    /// Set while `start` brings the provider up, outside the poller lock
    starting: AtomicBool,
}

impl SonosService {
    /// Create a service backed by the HTTP provider in `config`
    pub fn new(config: DashboardConfig) -> Result<Self> {
        config.validate()?;

        let client = JishiClient::new(&config.provider_url, config.request_timeout)?;
        let companion = Arc::new(CompanionManager::new(config.companion.clone())?);

        let recovery: Arc<dyn ProviderRecovery> = if config.auto_start_companion {
            Arc::new(CompanionRecovery {
                manager: companion.clone(),
                client: client.clone(),
            })
        } else {
            Arc::new(NoRecovery)
        };

        let mut service = Self::with_parts(
            config,
            Arc::new(client.clone()),
            Arc::new(client.clone()),
            recovery,
        )?;
        service.client = Some(client);
        service.companion = Some(companion);
        Ok(service)
    }

    /// Create a service from explicit collaborators
    ///
    /// There is no companion manager; the companion API returns
    /// [`ServiceError::CompanionUnavailable`].
    pub fn with_parts(
        config: DashboardConfig,
        source: Arc<dyn SnapshotSource>,
        sink: Arc<dyn CommandSink>,
        recovery: Arc<dyn ProviderRecovery>,
    ) -> Result<Self> {
        config.validate()?;

        let synchronizer = Arc::new(TopologySynchronizer::new(
            source,
            recovery.clone(),
            config.recovery_settle_delay,
        ));
        let executor = CommandExecutor::new(sink, recovery, config.recovery_settle_delay)
            .with_group_timing(GroupTiming {
                join_settle_delay: config.join_settle_delay,
                line_in_restore_delay: config.line_in_restore_delay,
            });

        Ok(Self {
            config,
            client: None,
            synchronizer,
            executor,
            companion: None,
            poller: Mutex::new(None),
            starting: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bring the provider up if needed, synchronize once, and start polling
    ///
    /// A failed initial synchronization is logged, not returned; the poller
    /// keeps trying.
    pub fn start(&self) -> Result<()> {
        if self.is_running() {
            return Err(ServiceError::AlreadyRunning);
        }
        let _starting = StartGuard::acquire(&self.starting)?;

        tracing::info!("Starting Sonos service against {}", self.config.provider_url);

        if self.config.auto_start_companion {
            if let (Some(client), Some(companion)) = (&self.client, &self.companion) {
                if client.probe() {
                    tracing::info!("Provider already responding at {}", client.base_url());
                } else {
                    match companion.ensure_running() {
                        Ok(()) => self.repoint(&companion.url()),
                        Err(e) => tracing::warn!("Could not start companion provider: {}", e),
                    }
                }
            }
        }

        match self.synchronizer.synchronize() {
            Ok(report) => tracing::info!(
                "Initial sync found {} devices in {} groups",
                report.devices,
                report.groups
            ),
            Err(e) => tracing::warn!("Initial sync failed: {}", e),
        }

        let mut poller = self.poller.lock();
        if poller.is_some() {
            return Err(ServiceError::AlreadyRunning);
        }
        *poller = Some(Poller::spawn(self.synchronizer.clone(), self.config.poll_interval)?);
        Ok(())
    }

    /// Stop polling, stop a companion this service started, and clear the model
    pub fn stop(&self) -> Result<()> {
        if let Some(poller) = self.poller.lock().take() {
            poller.stop();
        }

        if let Some(companion) = &self.companion {
            companion.stop()?;
        }

        self.synchronizer.clear();
        tracing::info!("Sonos service stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.poller.lock().is_some()
    }

    /// Synchronize now, outside the poll schedule
    pub fn refresh(&self) -> Result<SyncReport> {
        Ok(self.synchronizer.synchronize()?)
    }

    pub fn status(&self) -> ServiceStatus {
        let snapshot = self.synchronizer.snapshot();
        ServiceStatus {
            polling: self.is_running(),
            provider_url: self.client.as_ref().map(JishiClient::base_url),
            last_successful_sync: snapshot.synced_at,
            devices: snapshot.devices.len(),
            groups: snapshot.groups.len(),
        }
    }

    // ========================================================================
    // Read API
    // ========================================================================

    pub fn devices(&self) -> Vec<Device> {
        self.synchronizer.devices()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.synchronizer.groups()
    }

    pub fn device(&self, id: &str) -> Option<Device> {
        self.synchronizer.device(&DeviceId::new(id))
    }

    pub fn group(&self, id: &str) -> Option<Group> {
        self.synchronizer.group(&GroupId::new(id))
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        self.synchronizer.snapshot()
    }

    pub fn last_successful_sync(&self) -> Option<DateTime<Utc>> {
        self.synchronizer.last_successful_sync()
    }

    // ========================================================================
    // Device commands
    // ========================================================================

    pub fn play_device(&self, id: &str) -> Result<CommandOutcome> {
        self.device_command(id, Action::Play)
    }

    pub fn pause_device(&self, id: &str) -> Result<CommandOutcome> {
        self.device_command(id, Action::Pause)
    }

    pub fn stop_device(&self, id: &str) -> Result<CommandOutcome> {
        self.device_command(id, Action::Stop)
    }

    pub fn next_track(&self, id: &str) -> Result<CommandOutcome> {
        self.device_command(id, Action::Next)
    }

    pub fn previous_track(&self, id: &str) -> Result<CommandOutcome> {
        self.device_command(id, Action::Previous)
    }

    /// Set a player's volume (0-100)
    pub fn set_volume(&self, id: &str, volume: i64) -> Result<CommandOutcome> {
        let device = self.resolve_device(id)?;
        let volume = validate_volume(volume)?;
        self.send(Action::Volume(volume), device.name)
    }

    pub fn set_mute(&self, id: &str, mute: bool) -> Result<CommandOutcome> {
        self.device_command(id, Action::Mute(mute))
    }

    // ========================================================================
    // Group commands (sent to the coordinator)
    // ========================================================================

    pub fn play_group(&self, id: &str) -> Result<CommandOutcome> {
        self.group_command(id, Action::Play)
    }

    pub fn pause_group(&self, id: &str) -> Result<CommandOutcome> {
        self.group_command(id, Action::Pause)
    }

    pub fn stop_group(&self, id: &str) -> Result<CommandOutcome> {
        self.group_command(id, Action::Stop)
    }

    pub fn set_group_volume(&self, id: &str, volume: i64) -> Result<CommandOutcome> {
        let group = self.resolve_group(id)?;
        let volume = validate_volume(volume)?;
        self.send(Action::Volume(volume), group.coordinator().name.clone())
    }

    pub fn set_group_mute(&self, id: &str, mute: bool) -> Result<CommandOutcome> {
        self.group_command(id, Action::Mute(mute))
    }

    // ========================================================================
    // Group management
    // ========================================================================

    /// Form a group; `coordinator` and `members` are device ids or room names
    ///
    /// Not atomic. The returned formation lists every step; the next poll
    /// shows the group that actually resulted.
    pub fn create_group(&self, coordinator: &str, members: &[String]) -> Result<GroupFormation> {
        if members.is_empty() {
            return Err(GroupFormationError::NoMembers.into());
        }

        let coordinator = self.resolve_room(coordinator)?;
        let members = members
            .iter()
            .map(|member| self.resolve_room(member).map(|device| device.name))
            .collect::<Result<Vec<_>>>()?;

        Ok(self.executor.create_group(&coordinator.name, &members)?)
    }

    /// Add a device to the group led by `group_id`'s coordinator
    pub fn join_group(&self, group_id: &str, device_id: &str) -> Result<CommandOutcome> {
        let group = self.resolve_group(group_id)?;
        let device = self.resolve_device(device_id)?;
        self.send(Action::Join(group.coordinator().name.clone()), device.name)
    }

    /// Make a member of `group_id` standalone
    pub fn leave_group(&self, group_id: &str, device_id: &str) -> Result<CommandOutcome> {
        let group = self.resolve_group(group_id)?;
        let device = self.resolve_device(device_id)?;
        if !group.contains(&device.id) {
            return Err(ServiceError::NotInGroup {
                device: device_id.to_string(),
                group: group_id.to_string(),
            });
        }
        self.send(Action::Leave, device.name)
    }

    /// Send every non-coordinator member of the group a leave
    ///
    /// Stops at the first failure.
    pub fn dissolve_group(&self, group_id: &str) -> Result<Vec<CommandOutcome>> {
        let group = self.resolve_group(group_id)?;
        tracing::info!("Dissolving group {} led by {}", group.id(), group.coordinator().name);

        group
            .members()
            .iter()
            .filter(|member| member.id != group.coordinator().id)
            .map(|member| self.send(Action::Leave, member.name.clone()))
            .collect()
    }

    // ========================================================================
    // Companion management
    // ========================================================================

    pub fn companion_status(&self) -> Result<CompanionStatus> {
        Ok(self.companion()?.status())
    }

    /// Start the companion and point the client at it
    pub fn start_companion(&self) -> Result<CompanionStatus> {
        let companion = self.companion()?;
        companion.ensure_running()?;
        self.repoint(&companion.url());
        Ok(companion.status())
    }

    /// Stop the companion if this service started it, and point the client
    /// back at the configured provider
    pub fn stop_companion(&self) -> Result<CompanionStatus> {
        let companion = self.companion()?;
        companion.stop()?;
        self.repoint(&self.config.provider_url);
        Ok(companion.status())
    }

    pub fn restart_companion(&self) -> Result<CompanionStatus> {
        let companion = self.companion()?;
        companion.restart()?;
        self.repoint(&companion.url());
        Ok(companion.status())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn companion(&self) -> Result<&Arc<CompanionManager>> {
        self.companion.as_ref().ok_or(ServiceError::CompanionUnavailable)
    }

    fn repoint(&self, url: &str) {
        if let Some(client) = &self.client {
            if client.base_url() != url.trim_end_matches('/') {
                tracing::info!("Provider client now using {}", url);
            }
            if let Err(e) = client.set_base_url(url) {
                tracing::error!("Cannot use provider URL {}: {}", url, e);
            }
        }
    }

    fn resolve_device(&self, id: &str) -> Result<Device> {
        self.device(id)
            .ok_or_else(|| ServiceError::DeviceNotFound(id.to_string()))
    }

    fn resolve_group(&self, id: &str) -> Result<Group> {
        self.group(id)
            .ok_or_else(|| ServiceError::GroupNotFound(id.to_string()))
    }

    /// Device by id, falling back to room name
    fn resolve_room(&self, id_or_name: &str) -> Result<Device> {
        if let Some(device) = self.device(id_or_name) {
            return Ok(device);
        }
        self.devices()
            .into_iter()
            .find(|device| device.name == id_or_name)
            .ok_or_else(|| ServiceError::DeviceNotFound(id_or_name.to_string()))
    }

    fn device_command(&self, id: &str, action: Action) -> Result<CommandOutcome> {
        let device = self.resolve_device(id)?;
        self.send(action, device.name)
    }

    fn group_command(&self, id: &str, action: Action) -> Result<CommandOutcome> {
        let group = self.resolve_group(id)?;
        self.send(action, group.coordinator().name.clone())
    }

    fn send(&self, action: Action, target_name: String) -> Result<CommandOutcome> {
        self.executor.execute(&action, &target_name)?;
        tracing::info!("{} applied to {}", action, target_name);
        Ok(CommandOutcome {
            action: action.name(),
            target_name,
        })
    }
}

fn validate_volume(volume: i64) -> Result<u8> {
    match u8::try_from(volume) {
        Ok(v) if v <= 100 => Ok(v),
        _ => Err(ServiceError::InvalidVolume(volume)),
    }
}

/// Marks a `start` in progress until dropped
struct StartGuard<'a>(&'a AtomicBool);

impl<'a> StartGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| ServiceError::AlreadyRunning)
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for SonosService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonosService")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("companion", &self.companion)
            .finish()
    }
}
