//! Configuration loading for the Drover daemon.
//!
//! Resolves the TOML config file (explicit path, `DROVER_CONFIG`, then the
//! default locations), applies `.env` and environment overrides, and loads
//! the account definitions the daemon feeds into the credential repository.
#![allow(missing_docs)]

pub mod loader;
pub mod models;

pub use loader::{
    ConfigLoad, ConfigLoader, ConfigLoaderOptions, EnvConfig,
    error::ConfigLoadError,
};
pub use models::{AccountsConfig, Config, LoggingConfig, accounts::AccountsFile};
