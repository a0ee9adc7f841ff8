// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router configuration: TOML file, then `UST_ROUTER_*` environment overrides

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ust_core::Address;

use crate::controller::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::sink::SinkLayout;

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "UST_ROUTER_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("invalid value for {var}: {message}")]
    InvalidEnv { var: String, message: String },

    #[error("a password is required (set `password` or UST_ROUTER_PASSWORD)")]
    MissingPassword,

    #[error("max_payload_size must be greater than zero")]
    InvalidMaxPayloadSize,
}

/// Resolved router settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Where clients connect (`unix:/path` or `tcp://host:port`)
    pub address: Address,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Directory receiving the sink files
    pub dump_dir: PathBuf,
    pub sink_layout: SinkLayout,
    /// Log file; stderr when unset
    pub log_path: Option<PathBuf>,
    pub max_payload_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            address: Address::Unix(PathBuf::from("/tmp/ust-router/router.sock")),
            username: "ust".to_string(),
            password: String::new(),
            dump_dir: default_dump_dir(),
            sink_layout: SinkLayout::default(),
            log_path: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

fn default_dump_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ust-router")
        .join("dump")
}

impl RouterConfig {
    /// Load from `path` (defaults when `None`), apply the process
    /// environment, and validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::resolve(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`RouterConfig::load`] without validation
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Apply `UST_ROUTER_*` overrides looked up through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = var("ADDRESS") {
            self.address = value.parse().map_err(|e: ust_core::AddressError| {
                ConfigError::InvalidEnv {
                    var: key,
                    message: e.to_string(),
                }
            })?;
        }
        if let Some((_, value)) = var("USERNAME") {
            self.username = value;
        }
        if let Some((_, value)) = var("PASSWORD") {
            self.password = value;
        }
        if let Some((_, value)) = var("DUMP_DIR") {
            self.dump_dir = PathBuf::from(value);
        }
        if let Some((key, value)) = var("SINK_LAYOUT") {
            self.sink_layout = match value.as_str() {
                "category" => SinkLayout::Category,
                "grouped" => SinkLayout::Grouped,
                other => {
                    return Err(ConfigError::InvalidEnv {
                        var: key,
                        message: format!("unknown layout {other:?}"),
                    })
                }
            };
        }
        if let Some((_, value)) = var("LOG_PATH") {
            self.log_path = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        if let Some((key, value)) = var("MAX_PAYLOAD_SIZE") {
            self.max_payload_size = value.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidEnv {
                    var: key,
                    message: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.password.is_empty() {
            return Err(ConfigError::MissingPassword);
        }
        if self.max_payload_size == 0 {
            return Err(ConfigError::InvalidMaxPayloadSize);
        }
        Ok(())
    }

    /// Lock file held while a router serves this address
    ///
    /// Sits next to a unix socket; TCP routers lock their dump directory.
    pub fn pid_path(&self) -> PathBuf {
        match &self.address {
            Address::Unix(socket) => {
                let mut path = socket.clone().into_os_string();
                path.push(".pid");
                PathBuf::from(path)
            }
            Address::Tcp { .. } => self.dump_dir.join("ust-router.pid"),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
