pub mod error;

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;

use crate::models::Config;
use error::ConfigLoadError;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![PathBuf::from("drover.toml"), PathBuf::from("config/drover.toml")]
});

/// Environment values the loader consults.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub accounts_path: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: non_empty("DROVER_CONFIG").map(PathBuf::from),
            accounts_path: non_empty("DROVER_ACCOUNTS_PATH").map(PathBuf::from),
            log_filter: non_empty("DROVER_LOG"),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Use these values instead of reading the process environment.
    pub env: Option<EnvConfig>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

/// A loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub path: Option<PathBuf>,
    pub env_file_loaded: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
enum Provenance {
    Explicit,
    Env,
    Default,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.options.env = Some(env);
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        }
        .or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            _ => Err(err),
        })?;

        let env = self.options.env.clone().unwrap_or_else(EnvConfig::gather);
        let mut warnings = Vec::new();

        let (mut config, path) = match self.resolve_path(&env) {
            Some((path, provenance)) => {
                if !path.exists() {
                    if matches!(provenance, Provenance::Explicit) {
                        return Err(ConfigLoadError::MissingConfig { path });
                    }
                    warnings.push(format!(
                        "Configuration {} ({provenance:?}) not found; using defaults",
                        path.display()
                    ));
                    (Config::default(), None)
                } else {
                    (Self::read_file(&path)?, Some(path))
                }
            }
            None => {
                warnings.push(
                    "No drover.toml detected; using defaults and environment"
                        .to_string(),
                );
                (Config::default(), None)
            }
        };

        if let Some(base) = path.as_deref().and_then(Path::parent) {
            config.accounts.resolve_relative_to(base);
        }
        if let Some(accounts) = env.accounts_path {
            config.accounts.path = Some(accounts);
        }
        if let Some(filter) = env.log_filter {
            config.logging.filter = filter;
        }
        if config.accounts.path.is_none() && config.accounts.inline.is_empty() {
            warnings.push("No accounts configured".to_string());
        }

        Ok(ConfigLoad {
            config,
            path,
            env_file_loaded,
            warnings,
        })
    }

    fn resolve_path(&self, env: &EnvConfig) -> Option<(PathBuf, Provenance)> {
        if let Some(explicit) = &self.options.config_path {
            return Some((explicit.clone(), Provenance::Explicit));
        }
        if let Some(from_env) = &env.config_path {
            return Some((from_env.clone(), Provenance::Env));
        }
        DEFAULT_CONFIG_LOCATIONS
            .iter()
            .find(|candidate| candidate.exists())
            .map(|path| (path.clone(), Provenance::Default))
    }

    fn read_file(path: &Path) -> Result<Config, ConfigLoadError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
