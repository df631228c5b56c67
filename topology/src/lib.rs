//! Zone topology model and synchronizer
//!
//! Turns the flat zone list reported by the provider into a validated model
//! of devices and groups, and serves copies of it to concurrent readers.
//!
//! # Architecture
//!
//! ```text
//! SnapshotSource → TopologySynchronizer → RwLock<Topology> → readers
//!                   (rebuild + validate)   (one swap/pass)
//! ```
//!
//! A group is only visible when it passes the validity predicate (see
//! [`Group::is_valid`]). Groups that fail it ("zombie" groups, typically
//! seen while the provider is mid-regrouping) are dropped and their devices
//! reported as standalone.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use provider_client::{JishiClient, NoRecovery};
//! use sonos_topology::TopologySynchronizer;
//!
//! let client = JishiClient::new("http://localhost:5005", Duration::from_secs(10))?;
//! let sync = TopologySynchronizer::new(Arc::new(client), Arc::new(NoRecovery), Duration::from_secs(2));
//!
//! let report = sync.synchronize()?;
//! for group in sync.groups() {
//!     println!("{} led by {}", group.id(), group.coordinator().name);
//! }
//! ```

pub mod error;
pub mod logging;
pub mod model;
mod synchronizer;

pub use error::{Result, TopologyError};
pub use model::{Device, DeviceId, Group, GroupId, GroupInstance, TrackInfo};
pub use synchronizer::{SyncReport, TopologySnapshot, TopologySynchronizer};
