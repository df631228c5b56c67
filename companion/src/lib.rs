//! Provider lifecycle management
//!
//! The dashboard can run its own copy of the zone provider (a Node.js
//! process) when no external instance is reachable. [`CompanionManager`]
//! starts it, watches it, and stops it again without ever touching an
//! instance it did not spawn.
//!
//! ```rust,ignore
//! use companion::{CompanionConfig, CompanionManager};
//!
//! let manager = CompanionManager::new(CompanionConfig::default().with_port(5005))?;
//! manager.ensure_running()?;
//! println!("{:?}", manager.status());
//! manager.stop()?;
//! ```

mod config;
mod error;
mod manager;
mod supervisor;

pub use config::CompanionConfig;
pub use error::{CompanionError, Result};
pub use manager::{CompanionManager, CompanionState, CompanionStatus};
pub use supervisor::ExitReport;
