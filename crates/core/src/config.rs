// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool configuration and decoding of the `preallocate` section

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid walltime '{0}': expected HH:MM:SS, MM:SS, or seconds")]
    InvalidWalltime(String),
    #[error("pool section '{0}' is not an object")]
    SectionNotObject(String),
    #[error("pool section '{section}': {source}")]
    SectionDecode {
        section: String,
        source: serde_json::Error,
    },
}

/// Immutable descriptor of one named pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool identity; also the directory name under the pools state dir
    pub name: String,
    /// Backend config names this pool may serve
    pub configs: Vec<String>,
    /// Number of wrappers to pre-allocate
    pub jobs: u32,
    /// Whether wrapper jobs outlive the controller and are re-attached
    #[serde(default)]
    pub persist: bool,
    /// Wall-time budget for each wrapper
    #[serde(default, with = "humantime_serde")]
    pub walltime: Option<Duration>,
    /// Verbose wrapper logging
    #[serde(default)]
    pub debug: bool,
    /// Backend-specific fields passed through untouched
    #[serde(default)]
    pub extra: serde_json::Map<String, Value>,
}

impl PoolConfig {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            configs: vec![name.clone()],
            name,
            jobs: 1,
            persist: false,
            walltime: None,
            debug: false,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_jobs(mut self, jobs: u32) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_configs(mut self, configs: Vec<String>) -> Self {
        self.configs = configs;
        self
    }

    pub fn with_walltime(mut self, walltime: Duration) -> Self {
        self.walltime = Some(walltime);
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persist = true;
        self
    }

    pub fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Whether this pool serves commands resolved to the given backend config
    pub fn serves(&self, config_name: &str) -> bool {
        self.configs.iter().any(|c| c == config_name)
    }

    /// Decode one subsection of the `preallocate` configuration.
    ///
    /// The section key is the default for both `name` and `configs`.
    pub fn from_section(key: &str, value: &Value) -> Result<Self, ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::SectionNotObject(key.to_string()));
        }

        let raw: RawPoolSection =
            serde_json::from_value(value.clone()).map_err(|source| ConfigError::SectionDecode {
                section: key.to_string(),
                source,
            })?;

        let name = raw.name.unwrap_or_else(|| key.to_string());
        let configs = match raw.configs {
            Some(OneOrMany::One(config)) => vec![config],
            Some(OneOrMany::Many(configs)) => configs,
            None => vec![name.clone()],
        };
        let walltime = raw.walltime.as_deref().map(parse_walltime).transpose()?;

        Ok(Self {
            name,
            configs,
            jobs: raw.jobs.unwrap_or(1),
            persist: raw.persist.unwrap_or(false),
            walltime,
            debug: raw.debug_pooled_executor.is_some(),
            extra: raw.extra,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawPoolSection {
    name: Option<String>,
    configs: Option<OneOrMany>,
    jobs: Option<u32>,
    persist: Option<bool>,
    walltime: Option<String>,
    #[serde(rename = "debugPooledExecutor")]
    debug_pooled_executor: Option<Value>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Parse a batch-system wall-time expression into a duration.
///
/// Accepts `HH:MM:SS`, `MM:SS`, or a bare number of seconds.
pub fn parse_walltime(text: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidWalltime(text.to_string());

    let parts: Vec<u64> = text
        .trim()
        .split(':')
        .map(|part| part.parse::<u64>().map_err(|_| invalid()))
        .collect::<Result<_, _>>()?;

    let seconds = match parts[..] {
        [seconds] => seconds,
        [minutes, seconds] => minutes * 60 + seconds,
        [hours, minutes, seconds] => hours * 3600 + minutes * 60 + seconds,
        _ => return Err(invalid()),
    };

    Ok(Duration::from_secs(seconds))
}

/// Root directory for pool state, relative to the controller's working
/// directory unless overridden for test isolation.
pub fn default_state_root() -> PathBuf {
    std::env::var("WEIR_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".weir"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
