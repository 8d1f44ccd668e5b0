use crate::metrics::Thresholds;
use crate::ramp::RampSchedule;
use crate::session::client::{RequestSettings, ThinkTime};
use crate::session::server::ExchangeSettings;
use http::Uri;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one user is required")]
    NoUsers,
    #[error("invalid target url {url:?}: {source}")]
    InvalidTarget {
        url: String,
        #[source]
        source: http::uri::InvalidUri,
    },
    #[error("target url {0:?} must be an absolute http:// url")]
    UnsupportedTarget(String),
    #[error("think time range {min}ms..{max}ms is inverted")]
    ThinkTimeRange { min: u64, max: u64 },
}

fn from_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Defaults to the number of CPUs.
    pub worker_threads: Option<usize>,
    pub backlog: u32,
    pub dependency_delay_ms: u64,
    pub read_timeout_ms: u64,
    pub drain_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            worker_threads: None,
            backlog: 4096,
            dependency_delay_ms: 100,
            read_timeout_ms: 5000,
            drain_grace_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        from_file(path)
    }

    pub fn exchange_settings(&self) -> ExchangeSettings {
        ExchangeSettings {
            dependency_delay: Duration::from_millis(self.dependency_delay_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoadTestConfig {
    pub target_url: String,
    pub users: u32,
    pub ramp_up_secs: u64,
    pub hold_secs: u64,
    pub poll_interval_ms: u64,
    pub think_time_min_ms: u64,
    pub think_time_max_ms: u64,
    pub request_timeout_ms: u64,
    pub expected_status: u16,
    pub drain_grace_secs: u64,
    pub worker_threads: Option<usize>,
    pub thresholds: Thresholds,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            target_url: "http://localhost:8080/".to_string(),
            users: 100,
            ramp_up_secs: 60,
            hold_secs: 240,
            poll_interval_ms: 100,
            think_time_min_ms: 50,
            think_time_max_ms: 50,
            request_timeout_ms: 5000,
            expected_status: 200,
            drain_grace_secs: 10,
            worker_threads: None,
            thresholds: Thresholds::default(),
        }
    }
}

impl LoadTestConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        from_file(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.users == 0 {
            return Err(ConfigError::NoUsers);
        }
        if self.think_time_min_ms > self.think_time_max_ms {
            return Err(ConfigError::ThinkTimeRange {
                min: self.think_time_min_ms,
                max: self.think_time_max_ms,
            });
        }
        self.target()?;
        Ok(())
    }

    pub fn target(&self) -> Result<Uri, ConfigError> {
        let uri: Uri = self
            .target_url
            .parse()
            .map_err(|source| ConfigError::InvalidTarget {
                url: self.target_url.clone(),
                source,
            })?;
        if uri.scheme_str() != Some("http") || uri.host().is_none() {
            return Err(ConfigError::UnsupportedTarget(self.target_url.clone()));
        }
        Ok(uri)
    }

    pub fn schedule(&self) -> RampSchedule {
        RampSchedule::new(
            self.users,
            Duration::from_secs(self.ramp_up_secs),
            Duration::from_secs(self.hold_secs),
        )
    }

    pub fn request_settings(&self) -> Result<RequestSettings, ConfigError> {
        Ok(RequestSettings {
            target: self.target()?,
            expected_status: self.expected_status,
            timeout: Duration::from_millis(self.request_timeout_ms),
            think_time: ThinkTime::between(
                Duration::from_millis(self.think_time_min_ms),
                Duration::from_millis(self.think_time_max_ms),
            ),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_secs)
    }
}
