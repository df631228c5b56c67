//! Device/group model
//!
//! Plain data rebuilt on every poll. Only a group's [`GroupInstance`] token
//! outlives a single snapshot.

mod device;
mod group;
mod id_types;
mod track_info;

pub use device::{Device, DEFAULT_PLAYBACK_STATE};
pub use group::{Group, GroupInstance};
pub use id_types::{DeviceId, GroupId};
pub use track_info::TrackInfo;
