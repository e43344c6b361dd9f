pub mod accounts;

use std::time::Duration;

use drover_core::fleet::FleetConfig;
use serde::{Deserialize, Serialize};

pub use accounts::AccountsConfig;

/// Daemon configuration as read from `drover.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub fleet: FleetConfig,
    pub accounts: AccountsConfig,
    pub logging: LoggingConfig,
    /// How often the accounts file is re-read; `0` disables reloading.
    pub reload_interval_ms: u64,
}

impl Config {
    pub fn reload_interval(&self) -> Option<Duration> {
        (self.reload_interval_ms > 0)
            .then(|| Duration::from_millis(self.reload_interval_ms))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,drover=info".to_string(),
        }
    }
}
