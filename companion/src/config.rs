//! Companion process configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CompanionError, Result};

/// How to launch and health-check the companion process
#[derive(Debug, Clone, PartialEq)]
pub struct CompanionConfig {
    /// Executable to run
    pub program: String,

    /// Arguments passed to the executable
    pub args: Vec<String>,

    /// Directory the process is started in
    pub working_dir: PathBuf,

    /// Port the companion listens on, passed as `PORT`
    pub port: u16,

    /// Wait between start-up health probes
    pub probe_interval: Duration,

    /// Number of start-up health probes before giving up
    pub probe_attempts: u32,

    /// Pause between stop and start on restart
    pub restart_delay: Duration,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            args: vec!["server.js".to_string()],
            working_dir: PathBuf::from("node-sonos-http-api"),
            port: 5005,
            probe_interval: Duration::from_secs(1),
            probe_attempts: 30,
            restart_delay: Duration::from_secs(2),
        }
    }
}

impl CompanionConfig {
    /// Base URL the companion serves on
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn with_program(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn with_probe_attempts(mut self, attempts: u32) -> Self {
        self.probe_attempts = attempts;
        self
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Longest time `ensure_running` waits for the first healthy probe
    pub fn startup_budget(&self) -> Duration {
        self.probe_interval * self.probe_attempts
    }

    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(CompanionError::InvalidConfig("program must not be empty".to_string()));
        }

        if self.port == 0 {
            return Err(CompanionError::InvalidConfig("port must be non-zero".to_string()));
        }

        if self.probe_attempts == 0 {
            return Err(CompanionError::InvalidConfig(
                "probe_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
