//! Group and GroupInstance types

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::{Device, DeviceId, GroupId, TrackInfo};

/// Identity of a group across polls
///
/// Allocated once when a zone is first seen as a real group and handed on to
/// every later rebuild of the same zone. Two `Group` values describe the same
/// group instance exactly when they share this allocation.
#[derive(Debug)]
pub struct GroupInstance {
    formed_at: DateTime<Utc>,
}

impl GroupInstance {
    fn new(formed_at: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self { formed_at })
    }

    pub fn formed_at(&self) -> DateTime<Utc> {
        self.formed_at
    }
}

/// A coordinated playback session spanning several devices
///
/// Aggregate playback fields mirror the coordinator. The member list always
/// starts with the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    id: GroupId,
    coordinator: Device,
    members: Vec<Device>,
    volume: u8,
    mute: bool,
    playback_state: String,
    current_track: Option<TrackInfo>,
    #[serde(rename = "formed_at", serialize_with = "serialize_instance")]
    instance: Arc<GroupInstance>,
}

impl Group {
    /// Form a brand-new group with the coordinator as its only member
    pub fn new(id: GroupId, coordinator: Device, now: DateTime<Utc>) -> Self {
        let mut group = Self {
            id,
            coordinator: coordinator.clone(),
            members: Vec::new(),
            volume: 0,
            mute: false,
            playback_state: String::new(),
            current_track: None,
            instance: GroupInstance::new(now),
        };
        group.reset(coordinator);
        group
    }

    /// Replace the coordinator and aggregates and shrink the member list back
    /// to the coordinator alone, keeping the group's identity
    pub fn reset(&mut self, mut coordinator: Device) {
        coordinator.group_id = Some(self.id.clone());
        coordinator.coordinator_id = Some(coordinator.id.clone());

        self.volume = coordinator.volume;
        self.mute = coordinator.mute;
        self.playback_state = coordinator.playback_state.clone();
        self.current_track = coordinator.current_track.clone();
        self.members = vec![coordinator.clone()];
        self.coordinator = coordinator;
    }

    /// Attach a member, tagging it with this group
    ///
    /// Returns false (and leaves the group untouched) when a device with the
    /// same identifier is already a member.
    pub fn add_member(&mut self, mut device: Device) -> bool {
        if self.contains(&device.id) {
            return false;
        }
        device.group_id = Some(self.id.clone());
        device.coordinator_id = Some(self.coordinator.id.clone());
        self.members.push(device);
        true
    }

    /// Validity predicate for externally visible groups
    ///
    /// A group is valid when it has at least two distinct members, a
    /// coordinator with a non-empty identifier, every member online, and at
    /// least one member other than the coordinator.
    pub fn is_valid(&self) -> bool {
        let distinct: HashSet<&DeviceId> = self.members.iter().map(|m| &m.id).collect();
        let coordinator_id = &self.coordinator.id;

        distinct.len() >= 2
            && !coordinator_id.as_str().is_empty()
            && self.members.iter().all(|m| m.online)
            && self.members.iter().any(|m| &m.id != coordinator_id)
    }

    /// True when both values describe the same group instance
    pub fn same_instance(&self, other: &Group) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    pub fn coordinator(&self) -> &Device {
        &self.coordinator
    }

    pub fn members(&self) -> &[Device] {
        &self.members
    }

    pub fn member_ids(&self) -> Vec<DeviceId> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, device_id: &DeviceId) -> bool {
        self.members.iter().any(|m| &m.id == device_id)
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn mute(&self) -> bool {
        self.mute
    }

    pub fn playback_state(&self) -> &str {
        &self.playback_state
    }

    pub fn current_track(&self) -> Option<&TrackInfo> {
        self.current_track.as_ref()
    }

    /// When this group instance was first observed
    pub fn formed_at(&self) -> DateTime<Utc> {
        self.instance.formed_at()
    }
}

fn serialize_instance<S>(instance: &Arc<GroupInstance>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    instance.formed_at().serialize(serializer)
}
