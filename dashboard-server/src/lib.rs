//! HTTP surface for the sonos dashboard
//!
//! Exposes a [`SonosService`](sonos_dashboard::SonosService) as a JSON API
//! under `/api/sonos` using warp. See [`routes`] for the full route table.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sonos_dashboard::{DashboardConfig, SonosService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = Arc::new(SonosService::new(DashboardConfig::default())?);
//!     let (addr, server) = dashboard_server::bind(
//!         service,
//!         "127.0.0.1:8080".parse()?,
//!         dashboard_server::shutdown_signal(),
//!     )?;
//!     println!("listening on http://{}", addr);
//!     server.await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod routes;
mod server;

pub use error::ApiError;
pub use server::{bind, shutdown_signal};
