//! Configuration for the dashboard service
//!
//! Defaults match a single-host setup where the provider runs on the same
//! machine on port 5005. Every field can be overridden from the environment
//! with [`DashboardConfig::from_env`].

use std::path::PathBuf;
use std::time::Duration;

use companion::CompanionConfig;

use crate::error::ServiceError;

/// Configuration for [`SonosService`](crate::SonosService)
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// Base URL of the zone provider
    /// Default: http://localhost:5005
    pub provider_url: String,

    /// Read timeout for provider requests
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// Interval between topology polls
    /// Default: 5 seconds
    pub poll_interval: Duration,

    /// Wait after recovering the provider before retrying a request
    /// Default: 2 seconds
    pub recovery_settle_delay: Duration,

    /// Wait between consecutive joins while forming a group
    /// Default: 2 seconds
    pub join_settle_delay: Duration,

    /// Wait before restoring volume on a coordinator that was playing TV audio
    /// Default: 3 seconds
    pub line_in_restore_delay: Duration,

    /// Start the companion provider on service start and on connection failures
    /// Default: true
    pub auto_start_companion: bool,

    /// How to run the companion provider
    pub companion: CompanionConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            provider_url: "http://localhost:5005".to_string(),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            recovery_settle_delay: Duration::from_secs(2),
            join_settle_delay: Duration::from_secs(2),
            line_in_restore_delay: Duration::from_secs(3),
            auto_start_companion: true,
            companion: CompanionConfig::default(),
        }
    }
}

impl DashboardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero delays and no companion, for tests against in-memory fakes
    pub fn immediate() -> Self {
        Self {
            recovery_settle_delay: Duration::ZERO,
            join_settle_delay: Duration::ZERO,
            line_in_restore_delay: Duration::ZERO,
            auto_start_companion: false,
            ..Default::default()
        }
    }

    /// Read overrides from the process environment
    ///
    /// - `SONOS_API_URL` (or `SONOS_JISHI_URL`): provider base URL
    /// - `SONOS_TIMEOUT`: request timeout in seconds
    /// - `SONOS_POLL_INTERVAL`: poll interval in seconds
    /// - `SONOS_COMPANION_PORT`: companion port
    /// - `SONOS_COMPANION_DIR`: companion working directory
    /// - `SONOS_AUTO_START`: `true`/`false`
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("SONOS_API_URL").or_else(|| lookup("SONOS_JISHI_URL")) {
            config.provider_url = url;
        }
        if let Some(secs) = lookup("SONOS_TIMEOUT") {
            config.request_timeout = Duration::from_secs(parse_var("SONOS_TIMEOUT", &secs)?);
        }
        if let Some(secs) = lookup("SONOS_POLL_INTERVAL") {
            config.poll_interval = Duration::from_secs(parse_var("SONOS_POLL_INTERVAL", &secs)?);
        }
        if let Some(port) = lookup("SONOS_COMPANION_PORT") {
            config.companion.port = parse_var("SONOS_COMPANION_PORT", &port)?;
        }
        if let Some(dir) = lookup("SONOS_COMPANION_DIR") {
            config.companion.working_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup("SONOS_AUTO_START") {
            config.auto_start_companion = parse_var("SONOS_AUTO_START", &flag.to_ascii_lowercase())?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_provider_url(mut self, url: impl Into<String>) -> Self {
        self.provider_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_recovery_settle_delay(mut self, delay: Duration) -> Self {
        self.recovery_settle_delay = delay;
        self
    }

    pub fn with_join_settle_delay(mut self, delay: Duration) -> Self {
        self.join_settle_delay = delay;
        self
    }

    pub fn with_line_in_restore_delay(mut self, delay: Duration) -> Self {
        self.line_in_restore_delay = delay;
        self
    }

    pub fn with_auto_start_companion(mut self, enabled: bool) -> Self {
        self.auto_start_companion = enabled;
        self
    }

    pub fn with_companion(mut self, companion: CompanionConfig) -> Self {
        self.companion = companion;
        self
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), ServiceError> {
        if !(self.provider_url.starts_with("http://") || self.provider_url.starts_with("https://")) {
            return Err(ServiceError::Config(format!(
                "provider URL must be http(s): {}",
                self.provider_url
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(ServiceError::Config(
                "request timeout must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(ServiceError::Config(
                "poll interval must be greater than 0".to_string(),
            ));
        }

        self.companion
            .validate()
            .map_err(|e| ServiceError::Config(e.to_string()))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ServiceError> {
    value
        .trim()
        .parse()
        .map_err(|_| ServiceError::Config(format!("invalid value for {}: '{}'", name, value)))
}
