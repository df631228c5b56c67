//! Full-replace reconciliation of provider snapshots
//!
//! Every pass builds a fresh device map and group map from the zone list and
//! swaps both in under a single write lock. A zone missing from the snapshot
//! disappears from the model; there is no incremental patching.
//!
//! ```text
//! SnapshotSource::zones() → reconcile() → validity predicate → RwLock swap
//!                                                              ↓
//!                                          devices() / groups() / device(id) / group(id)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use provider_client::{ProviderRecovery, SnapshotSource, ZoneDescriptor};
use serde::Serialize;

use crate::error::{Result, TopologyError};
use crate::model::{Device, DeviceId, Group, GroupId};

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Devices in the new model
    pub devices: usize,
    /// Valid groups in the new model
    pub groups: usize,
    /// Zones skipped for lacking an identifier or a usable coordinator
    pub dropped_zones: usize,
    /// Multi-device zones that failed the validity predicate
    pub zombie_groups: usize,
}

/// Point-in-time copy of the whole model, taken under one read lock
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopologySnapshot {
    pub devices: Vec<Device>,
    pub groups: Vec<Group>,
    pub synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Topology {
    devices: HashMap<DeviceId, Device>,
    groups: HashMap<GroupId, Group>,
    synced_at: Option<DateTime<Utc>>,
}

/// Owner of the live device/group model
pub struct TopologySynchronizer {
    source: Arc<dyn SnapshotSource>,
    recovery: Arc<dyn ProviderRecovery>,
    settle_delay: Duration,
    topology: RwLock<Topology>,
    /// Held for a whole pass, fetch through swap
    writer: Mutex<()>,
}

impl TopologySynchronizer {
    /// Create a synchronizer with an empty model
    ///
    /// `settle_delay` is waited between a successful provider recovery and
    /// the retried fetch.
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        recovery: Arc<dyn ProviderRecovery>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            source,
            recovery,
            settle_delay,
            topology: RwLock::new(Topology::default()),
            writer: Mutex::new(()),
        }
    }

    /// Fetch a snapshot and replace the model with it
    ///
    /// On a transport failure the provider is recovered once and the fetch
    /// retried once. Any error leaves the previous model in place. Passes
    /// never overlap, so a slow fetch cannot land after a newer one.
    pub fn synchronize(&self) -> Result<SyncReport> {
        let _writer = self.writer.lock();
        let zones = self.fetch_zones()?;
        Ok(self.apply_locked(&zones))
    }

    /// Reconcile an already fetched zone list into the model
    pub fn apply_snapshot(&self, zones: &[ZoneDescriptor]) -> SyncReport {
        let _writer = self.writer.lock();
        self.apply_locked(zones)
    }

    fn apply_locked(&self, zones: &[ZoneDescriptor]) -> SyncReport {
        let now = Utc::now();

        let (devices, groups, report) = {
            let current = self.topology.read();
            reconcile(zones, &current.groups, now)
        };

        {
            let mut topology = self.topology.write();
            topology.devices = devices;
            topology.groups = groups;
            topology.synced_at = Some(now);
        }

        tracing::info!(
            "Topology synchronized: {} devices, {} groups ({} zones dropped, {} zombie groups)",
            report.devices,
            report.groups,
            report.dropped_zones,
            report.zombie_groups
        );

        report
    }

    fn fetch_zones(&self) -> Result<Vec<ZoneDescriptor>> {
        match self.source.zones() {
            Ok(zones) => Ok(zones),
            Err(cause) if cause.is_transport() => {
                tracing::warn!("Snapshot fetch failed ({}), attempting provider recovery", cause);

                if let Err(recovery) = self.recovery.recover() {
                    tracing::error!("Provider recovery failed: {}", recovery);
                    return Err(TopologyError::RecoveryFailed { cause, recovery });
                }

                if !self.settle_delay.is_zero() {
                    thread::sleep(self.settle_delay);
                }

                self.source.zones().map_err(|e| {
                    tracing::error!("Snapshot fetch failed after recovery: {}", e);
                    TopologyError::RetryFailed(e)
                })
            }
            Err(e) => Err(TopologyError::Fetch(e)),
        }
    }

    /// All devices, ordered by name
    pub fn devices(&self) -> Vec<Device> {
        sorted_devices(&self.topology.read().devices)
    }

    /// All valid groups, ordered by identifier
    pub fn groups(&self) -> Vec<Group> {
        sorted_groups(&self.topology.read().groups)
    }

    pub fn device(&self, id: &DeviceId) -> Option<Device> {
        self.topology.read().devices.get(id).cloned()
    }

    pub fn group(&self, id: &GroupId) -> Option<Group> {
        self.topology.read().groups.get(id).cloned()
    }

    /// Devices, groups and sync time from the same model generation
    pub fn snapshot(&self) -> TopologySnapshot {
        let topology = self.topology.read();
        TopologySnapshot {
            devices: sorted_devices(&topology.devices),
            groups: sorted_groups(&topology.groups),
            synced_at: topology.synced_at,
        }
    }

    /// When the model was last replaced, `None` before the first success
    pub fn last_successful_sync(&self) -> Option<DateTime<Utc>> {
        self.topology.read().synced_at
    }

    /// Drop the whole model
    pub fn clear(&self) {
        let _writer = self.writer.lock();
        *self.topology.write() = Topology::default();
    }
}

impl std::fmt::Debug for TopologySynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topology = self.topology.read();
        f.debug_struct("TopologySynchronizer")
            .field("devices", &topology.devices.len())
            .field("groups", &topology.groups.len())
            .field("synced_at", &topology.synced_at)
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}

/// Build a fresh model from `zones`, reusing group identities from `previous`
fn reconcile(
    zones: &[ZoneDescriptor],
    previous: &HashMap<GroupId, Group>,
    now: DateTime<Utc>,
) -> (HashMap<DeviceId, Device>, HashMap<GroupId, Group>, SyncReport) {
    let mut devices = HashMap::new();
    let mut groups = HashMap::new();
    let mut report = SyncReport::default();

    for zone in zones {
        let zone_id = zone.uuid.as_deref().filter(|id| !id.is_empty());
        let coordinator = zone
            .coordinator
            .as_ref()
            .and_then(|c| Device::from_descriptor(c, now));

        let (Some(zone_id), Some(mut coordinator)) = (zone_id, coordinator) else {
            tracing::debug!("Dropping malformed zone {:?}", zone.uuid);
            report.dropped_zones += 1;
            continue;
        };
        coordinator.set_online(true, now);

        let has_other_members = zone.members.iter().any(|member| {
            member
                .uuid
                .as_deref()
                .is_some_and(|id| !id.is_empty() && id != coordinator.id.as_str())
        });

        if !has_other_members {
            devices.insert(coordinator.id.clone(), coordinator);
            continue;
        }

        let zone_id = GroupId::new(zone_id);
        let mut group = match previous.get(&zone_id) {
            Some(existing) => {
                let mut group = existing.clone();
                group.reset(coordinator);
                group
            }
            None => Group::new(zone_id.clone(), coordinator, now),
        };

        for member in &zone.members {
            let Some(device) = Device::from_descriptor(member, now) else {
                tracing::debug!("Skipping incomplete member {:?} of zone {}", member.uuid, zone_id);
                continue;
            };
            group.add_member(device);
        }

        if group.is_valid() {
            for member in group.members() {
                devices.insert(member.id.clone(), member.clone());
            }
            groups.insert(zone_id, group);
        } else {
            tracing::debug!(
                "Excluding zombie group {} (members: {:?})",
                zone_id,
                group.member_ids()
            );
            report.zombie_groups += 1;
            insert_standalone(&mut devices, &group);
        }
    }

    // Re-check the predicate over everything that made it in
    let invalid: Vec<GroupId> = groups
        .iter()
        .filter(|(_, group)| !group.is_valid())
        .map(|(id, _)| id.clone())
        .collect();
    for id in invalid {
        if let Some(group) = groups.remove(&id) {
            tracing::debug!("Dropping invalid group {} in final sweep", id);
            report.zombie_groups += 1;
            insert_standalone(&mut devices, &group);
        }
    }

    report.devices = devices.len();
    report.groups = groups.len();
    (devices, groups, report)
}

fn insert_standalone(devices: &mut HashMap<DeviceId, Device>, group: &Group) {
    for member in group.members() {
        let mut device = member.clone();
        device.detach();
        devices.insert(device.id.clone(), device);
    }
}

fn sorted_devices(devices: &HashMap<DeviceId, Device>) -> Vec<Device> {
    let mut devices: Vec<Device> = devices.values().cloned().collect();
    devices.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    devices
}

fn sorted_groups(groups: &HashMap<GroupId, Group>) -> Vec<Group> {
    let mut groups: Vec<Group> = groups.values().cloned().collect();
    groups.sort_by(|a, b| a.id().cmp(b.id()));
    groups
}
