//! Device type

use chrono::{DateTime, Utc};
use provider_client::MemberDescriptor;
use serde::{Deserialize, Serialize};

use super::{DeviceId, GroupId, TrackInfo};

/// Playback state reported before the provider tells us otherwise
pub const DEFAULT_PLAYBACK_STATE: &str = "STOPPED";

/// One player as seen in the latest snapshot
///
/// Devices are rebuilt from scratch on every poll. Nothing set on a
/// `Device` survives into the next snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// Room label, which the provider also uses as the command target
    pub name: String,
    pub online: bool,
    pub volume: u8,
    pub mute: bool,
    /// Free-form provider state such as "PLAYING" or "PAUSED_PLAYBACK"
    pub playback_state: String,
    pub current_track: Option<TrackInfo>,
    /// Group this device belongs to, `None` when standalone
    pub group_id: Option<GroupId>,
    /// Coordinator of that group
    pub coordinator_id: Option<DeviceId>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    /// Create an offline, stopped device
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            online: false,
            volume: 0,
            mute: false,
            playback_state: DEFAULT_PLAYBACK_STATE.to_string(),
            current_track: None,
            group_id: None,
            coordinator_id: None,
            last_seen: None,
        }
    }

    /// Materialize a device from a zone entry
    ///
    /// Returns `None` when the entry lacks an identifier or a room name. The
    /// device is online unless the entry explicitly says otherwise.
    pub fn from_descriptor(descriptor: &MemberDescriptor, now: DateTime<Utc>) -> Option<Self> {
        let id = descriptor.uuid.as_deref().filter(|s| !s.is_empty())?;
        let name = descriptor.room_name.as_deref().filter(|s| !s.is_empty())?;

        let mut device = Device::new(id, name);
        if let Some(state) = &descriptor.state {
            if let Some(volume) = state.volume {
                device.volume = volume;
            }
            if let Some(mute) = state.mute {
                device.mute = mute;
            }
            if let Some(playback_state) = &state.playback_state {
                device.playback_state = playback_state.clone();
            }
            device.current_track = state
                .current_track
                .as_ref()
                .map(TrackInfo::from)
                .filter(|track| !track.is_empty());
        }
        device.set_online(descriptor.online.unwrap_or(true), now);

        Some(device)
    }

    /// Update the online flag, stamping `last_seen` when the device is up
    pub fn set_online(&mut self, online: bool, now: DateTime<Utc>) {
        self.online = online;
        if online {
            self.last_seen = Some(now);
        }
    }

    /// Clear group membership
    pub fn detach(&mut self) {
        self.group_id = None;
        self.coordinator_id = None;
    }

    pub fn is_grouped(&self) -> bool {
        self.group_id.is_some()
    }

    pub fn is_coordinator(&self) -> bool {
        self.is_grouped() && self.coordinator_id.as_ref() == Some(&self.id)
    }
}
