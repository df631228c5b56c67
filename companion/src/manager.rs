//! Companion lifecycle state machine

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use provider_client::{ClientError, HealthProbe, JishiClient, ProviderRecovery};
use serde::Serialize;

use crate::config::CompanionConfig;
use crate::error::{CompanionError, Result};
use crate::supervisor::Supervisor;

/// Probe timeout when the manager builds its own health client
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of the companion process
///
/// `NotStarted → Starting → Running → (Stopped | Crashed)`. A failed start
/// also ends in `Crashed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanionState {
    NotStarted,
    Starting,
    Running,
    Stopped,
    Crashed,
}

/// Operational view of the companion
#[derive(Debug, Clone, Serialize)]
pub struct CompanionStatus {
    pub state: CompanionState,
    /// Starting or running
    pub running: bool,
    /// Health probe answered just now
    pub responding: bool,
    /// The process was spawned by this manager
    pub owned: bool,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub port: u16,
    pub url: String,
}

struct Inner {
    state: CompanionState,
    supervisor: Option<Supervisor>,
}

/// Starts, stops and health-checks the companion provider process
pub struct CompanionManager {
    config: CompanionConfig,
    probe: Arc<dyn HealthProbe>,
    inner: Mutex<Inner>,
    /// Serializes start, stop and restart
    lifecycle: Mutex<()>,
}

impl CompanionManager {
    /// Create a manager that probes the companion's own `/zones` endpoint
    pub fn new(config: CompanionConfig) -> Result<Self> {
        let probe = JishiClient::new(&config.url(), PROBE_TIMEOUT)
            .map_err(|e| CompanionError::InvalidConfig(e.to_string()))?;
        Self::with_probe(config, Arc::new(probe))
    }

    /// Create a manager with a custom health probe
    pub fn with_probe(config: CompanionConfig, probe: Arc<dyn HealthProbe>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            probe,
            inner: Mutex::new(Inner {
                state: CompanionState::NotStarted,
                supervisor: None,
            }),
            lifecycle: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &CompanionConfig {
        &self.config
    }

    /// Base URL clients should use to reach the companion
    pub fn url(&self) -> String {
        self.config.url()
    }

    pub fn state(&self) -> CompanionState {
        self.reap();
        self.inner.lock().state
    }

    /// Make sure something healthy answers on the companion port
    ///
    /// Does nothing when the health probe already succeeds, whether or not
    /// this manager started that instance. Otherwise spawns the process and
    /// probes it until it answers, it exits, or the attempts run out.
    pub fn ensure_running(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        self.reap();

        if self.probe.probe() {
            let mut inner = self.inner.lock();
            if inner.state != CompanionState::Running {
                tracing::info!("Companion already responding on port {}", self.config.port);
                inner.state = CompanionState::Running;
            }
            return Ok(());
        }

        // An owned instance that stopped answering is replaced
        let stale = self.inner.lock().supervisor.take();
        if let Some(stale) = stale {
            tracing::warn!("Companion process {} is not responding, replacing it", stale.pid());
            if let Err(e) = stale.terminate() {
                tracing::warn!("Could not stop unresponsive companion: {}", e);
            }
        }

        self.inner.lock().state = CompanionState::Starting;
        tracing::info!(
            "Starting companion '{} {}' in {} on port {}",
            self.config.program,
            self.config.args.join(" "),
            self.config.working_dir.display(),
            self.config.port
        );

        let mut supervisor = match Supervisor::spawn(&self.config) {
            Ok(supervisor) => supervisor,
            Err(e) => {
                tracing::error!("Failed to start companion: {}", e);
                self.inner.lock().state = CompanionState::Crashed;
                return Err(e);
            }
        };

        for attempt in 1..=self.config.probe_attempts {
            if self.probe.probe() {
                tracing::info!(
                    "Companion started on port {} (pid {}, {} probes)",
                    self.config.port,
                    supervisor.pid(),
                    attempt
                );
                let mut inner = self.inner.lock();
                inner.state = CompanionState::Running;
                inner.supervisor = Some(supervisor);
                return Ok(());
            }

            if let Some(report) = supervisor.wait_exit(self.config.probe_interval) {
                tracing::error!("Companion exited during startup: {}", report);
                self.inner.lock().state = CompanionState::Crashed;
                return Err(CompanionError::Exited(report.to_string()));
            }
        }

        tracing::error!(
            "Companion did not respond within {:?}, stopping it",
            self.config.startup_budget()
        );
        if let Err(e) = supervisor.terminate() {
            tracing::warn!("Could not stop companion after failed start: {}", e);
        }
        self.inner.lock().state = CompanionState::Crashed;
        Err(CompanionError::Timeout {
            attempts: self.config.probe_attempts,
        })
    }

    /// Stop the companion if this manager started it
    ///
    /// An instance started by someone else is left running.
    pub fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        self.reap();

        let supervisor = self.inner.lock().supervisor.take();
        let Some(supervisor) = supervisor else {
            tracing::info!("No companion process owned by this manager, nothing to stop");
            return Ok(());
        };

        let pid = supervisor.pid();
        tracing::info!("Stopping companion process {}", pid);
        match supervisor.terminate() {
            Ok(report) => {
                tracing::info!("Companion process {} stopped ({})", pid, report);
                self.inner.lock().state = CompanionState::Stopped;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to stop companion process {}: {}", pid, e);
                self.inner.lock().state = CompanionState::Crashed;
                Err(e)
            }
        }
    }

    /// Stop, wait for the restart delay, then start again
    pub fn restart(&self) -> Result<()> {
        tracing::info!("Restarting companion");
        if let Err(e) = self.stop() {
            tracing::warn!("Error stopping companion: {}", e);
        }

        if !self.config.restart_delay.is_zero() {
            thread::sleep(self.config.restart_delay);
        }

        self.ensure_running()
    }

    /// Current state plus a live health probe
    pub fn status(&self) -> CompanionStatus {
        self.reap();
        let responding = self.probe.probe();

        let mut inner = self.inner.lock();
        if inner.state == CompanionState::Running && !responding {
            tracing::warn!("Companion stopped responding on port {}", self.config.port);
            inner.state = CompanionState::Crashed;
        }

        CompanionStatus {
            state: inner.state,
            running: matches!(inner.state, CompanionState::Starting | CompanionState::Running),
            responding,
            owned: inner.supervisor.is_some(),
            pid: inner.supervisor.as_ref().map(Supervisor::pid),
            started_at: inner.supervisor.as_ref().map(Supervisor::started_at),
            port: self.config.port,
            url: self.config.url(),
        }
    }

    /// Pick up an exit reported by the supervisor of a running instance
    fn reap(&self) {
        let mut inner = self.inner.lock();
        let exit = inner.supervisor.as_mut().and_then(Supervisor::try_exit);
        if let Some(report) = exit {
            tracing::error!("Companion process exited unexpectedly: {}", report);
            inner.supervisor = None;
            inner.state = CompanionState::Crashed;
        }
    }
}

impl ProviderRecovery for CompanionManager {
    fn recover(&self) -> std::result::Result<(), ClientError> {
        self.ensure_running()
            .map_err(|e| ClientError::Recovery(e.to_string()))
    }
}

impl std::fmt::Debug for CompanionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CompanionManager")
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("pid", &inner.supervisor.as_ref().map(Supervisor::pid))
            .finish()
    }
}
