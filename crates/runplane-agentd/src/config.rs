use std::{fs, net::SocketAddr, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use runplane_core::{EventBus, LatencyProfile, SubscriptionConfig};
use runplane_observe::LoggerConfig;

/// Path of a JSON config file.
pub const CONFIG_ENV: &str = "RUNPLANE_CONFIG";
/// Overrides `listen`.
pub const LISTEN_ENV: &str = "RUNPLANE_LISTEN";
/// Overrides `logger.level`.
pub const LOG_ENV: &str = "RUNPLANE_LOG";

/// Daemon configuration. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfig {
    pub listen: SocketAddr,
    pub logger: LoggerConfig,
    pub latency: LatencyProfile,
    /// Events buffered per bus receiver before the oldest are dropped.
    pub bus_capacity: usize,
    pub subscription: SubscriptionConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            logger: LoggerConfig::default(),
            latency: LatencyProfile::default(),
            bus_capacity: EventBus::DEFAULT_CAPACITY,
            subscription: SubscriptionConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::load(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    fn load(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut cfg = match var(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(listen) = var(LISTEN_ENV) {
            cfg.listen = listen
                .parse()
                .with_context(|| format!("{LISTEN_ENV}={listen}"))?;
        }
        if let Some(level) = var(LOG_ENV) {
            cfg.logger.level = level.parse().with_context(|| format!("{LOG_ENV}={level}"))?;
        }
        Ok(cfg)
    }
}
