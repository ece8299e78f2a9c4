//! `config.toml` handling.
//!
//! A missing file is created with the defaults. A file that no longer parses
//! is moved to `config.toml.backup` and replaced by the defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fancaps::DEFAULT_USER_AGENT;

#[derive(Error, Debug)]
pub(crate) enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub(crate) type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct Paths {
    pub(crate) output_directory: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct Pools {
    pub(crate) max_download_concurrency: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct Rate {
    pub(crate) min_delay_ms: u64,
    pub(crate) random_delay_ms: u64,
    pub(crate) request_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct Scraper {
    pub(crate) user_agent: String,
    pub(crate) parallel_discovery: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct Logging {
    pub(crate) log_level: String,
    pub(crate) log_to_file: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct AppConfig {
    pub(crate) paths: Paths,
    pub(crate) pools: Pools,
    pub(crate) rate: Rate,
    pub(crate) scraper: Scraper,
    pub(crate) logging: Logging,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: Paths {
                output_directory: "./output".to_string(),
            },
            pools: Pools {
                max_download_concurrency: 10,
            },
            rate: Rate {
                min_delay_ms: 1000,
                random_delay_ms: 5000,
                request_timeout_secs: 30,
            },
            scraper: Scraper {
                user_agent: DEFAULT_USER_AGENT.to_string(),
                parallel_discovery: true,
            },
            logging: Logging {
                log_level: "warn".to_string(),
                log_to_file: true,
            },
        }
    }
}

impl AppConfig {
    pub(crate) fn min_delay(&self) -> Duration {
        Duration::from_millis(self.rate.min_delay_ms)
    }

    pub(crate) fn random_delay(&self) -> Duration {
        Duration::from_millis(self.rate.random_delay_ms)
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.rate.request_timeout_secs)
    }
}

/// What loading the configuration had to do. Reported once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoadOutcome {
    Loaded,
    Created,
    Replaced { backup: PathBuf, reason: String },
}

/// Owns the location of the configuration file.
pub(crate) struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        self.path.with_extension("toml.backup")
    }

    /// Reads the configuration, creating or repairing the file when needed.
    pub(crate) fn load_or_create(&self) -> ConfigResult<(AppConfig, LoadOutcome)> {
        if !self.path.exists() {
            let config = AppConfig::default();
            self.save(&config)?;
            return Ok((config, LoadOutcome::Created));
        }

        let content = fs::read_to_string(&self.path)?;
        match toml::from_str(&content) {
            Ok(config) => Ok((config, LoadOutcome::Loaded)),
            Err(err) => {
                let backup = self.backup_path();
                fs::rename(&self.path, &backup)?;
                let config = AppConfig::default();
                self.save(&config)?;
                Ok((
                    config,
                    LoadOutcome::Replaced {
                        backup,
                        reason: err.to_string(),
                    },
                ))
            }
        }
    }

    pub(crate) fn save(&self, config: &AppConfig) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, toml::to_string_pretty(config)?)?;
        Ok(())
    }
}
