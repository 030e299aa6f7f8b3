// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline command data model

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resolved per-command configuration, as seen by the pool matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Backend configuration name this command wants to run under
    pub name: String,
    /// Elapsed-time allowance the command needs, if bounded
    #[serde(default, with = "humantime_serde")]
    pub walltime: Option<Duration>,
}

impl CommandConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            walltime: None,
        }
    }

    pub fn with_walltime(mut self, walltime: Duration) -> Self {
        self.walltime = Some(walltime);
        self
    }
}

/// One shell-command unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub name: String,
    /// Shell text to execute
    pub command: String,
    /// Creation timestamp in epoch millis; wall-time budgets count from here
    pub create_time_ms: i64,
    pub processed_config: CommandConfig,
    /// Id of the wrapper that adopted this command, when pooled.
    /// A lookup key rather than an ownership edge; never persisted.
    #[serde(skip)]
    pub host: Option<String>,
}

impl Command {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
        processed_config: CommandConfig,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            command: command.into(),
            create_time_ms: clock.epoch_millis(),
            processed_config,
            host: None,
        }
    }

    /// Whether a wrapper currently owns this command
    pub fn is_adopted(&self) -> bool {
        self.host.is_some()
    }
}
