//! # Sonos Dashboard - household view and control over a zone provider
//!
//! Keeps an always-valid model of players and groups by polling the
//! provider, and applies commands through it:
//!
//! ```rust,no_run
//! use sonos_dashboard::{DashboardConfig, SonosService};
//!
//! fn main() -> Result<(), sonos_dashboard::ServiceError> {
//!     let service = SonosService::new(DashboardConfig::from_env()?)?;
//!     service.start()?;
//!
//!     for group in service.groups() {
//!         println!("{} ({} players)", group.coordinator().name, group.member_count());
//!     }
//!
//!     let kitchen = service.devices().into_iter().find(|d| d.name == "Kitchen");
//!     if let Some(kitchen) = kitchen {
//!         service.set_volume(kitchen.id.as_str(), 25)?;
//!     }
//!
//!     let formation = service.create_group("Living Room", &["Kitchen".to_string()])?;
//!     println!("joined: {:?}", formation.joined);
//!
//!     service.stop()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SonosService
//!     ├── Poller ──────────► TopologySynchronizer ──► SnapshotSource (GET /zones)
//!     ├── CommandExecutor ─► CommandSink (GET /<room>/<action>)
//!     └── CompanionManager   (ProviderRecovery when the provider is unreachable)
//! ```
//!
//! Reads never touch the network. Commands are blocking and bounded by the
//! provider client's timeouts.

pub mod choreography;
pub mod config;
pub mod error;
mod executor;
mod poller;
mod service;

pub use choreography::{GroupFormation, GroupStep, GroupTiming, StepOutcome, StepStatus};
pub use config::DashboardConfig;
pub use error::{CommandError, GroupFormationError, Result, ServiceError};
pub use executor::CommandExecutor;
pub use service::{CommandOutcome, ServiceStatus, SonosService};

pub use companion::{CompanionConfig, CompanionState, CompanionStatus};
pub use provider_client::Action;
pub use sonos_topology::{Device, DeviceId, Group, GroupId, SyncReport, TopologySnapshot, TrackInfo};
