// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-based protocol between the controller and a remote wrapper
//!
//! All coordination with a wrapper happens through files in the wrapper's
//! command directory: dispatch scripts appear atomically via write-then-rename
//! in the same directory, exit codes come back as one-line files, and liveness
//! flows through a heartbeat file the controller re-creates and the wrapper
//! deletes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Directory under the state root holding per-wrapper protocol directories
pub const COMMAND_TMP_DIR: &str = "commandtmp";

/// Controller heartbeat refresh cadence, in seconds
pub const HEARTBEAT_INTERVAL_SECONDS: u64 = 10;

const DISPATCH_TMP: &str = "pool_cmd.tmp";
const DISPATCH_PREFIX: &str = "pool_cmd.";
const DISPATCH_SUFFIX: &str = ".sh";
const EXIT_SUFFIX: &str = ".pool.exit";
const HEARTBEAT_FILE: &str = "heartbeat";
const STOP_FILE: &str = "stop";
const OUT_FILE: &str = "cmd.out";
const ERR_FILE: &str = "cmd.err";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("exit file for command {command_id} is not an integer: '{content}'")]
    MalformedExit { command_id: String, content: String },
}

/// Polling cadences of the wrapper protocol.
///
/// The defaults are the protocol's contract; they are kept together here so a
/// deployment (or a test) can tighten them without touching call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolTimings {
    /// How often the controller polls for an exit file
    #[serde(with = "humantime_serde")]
    pub exit_poll: Duration,
    /// Settle delay between observing an exit file and reading it
    #[serde(with = "humantime_serde")]
    pub exit_settle: Duration,
    /// Controller heartbeat refresh cadence
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Wrapper-side loop cadence for stop and dispatch polling
    #[serde(with = "humantime_serde")]
    pub wrapper_poll: Duration,
    /// Consecutive absent-heartbeat checks the wrapper tolerates before exiting
    pub heartbeat_tolerance: u32,
}

impl Default for ProtocolTimings {
    fn default() -> Self {
        Self {
            exit_poll: Duration::from_secs(1),
            exit_settle: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECONDS),
            wrapper_poll: Duration::from_secs(1),
            heartbeat_tolerance: 5,
        }
    }
}

impl ProtocolTimings {
    /// How many wrapper loop iterations make up one heartbeat check interval
    pub fn heartbeat_check_ticks(&self) -> u32 {
        let ticks =
            (self.heartbeat_interval.as_secs_f64() / self.wrapper_poll.as_secs_f64()).round();
        (ticks as u32).max(1)
    }
}

/// One wrapper's protocol directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapperDir {
    dir: PathBuf,
    host_command_id: String,
}

impl WrapperDir {
    pub fn new(state_root: &Path, host_command_id: impl Into<String>) -> Self {
        let host_command_id = host_command_id.into();
        Self {
            dir: state_root.join(COMMAND_TMP_DIR).join(&host_command_id),
            host_command_id,
        }
    }

    /// Rebuild from a persisted descriptor's recorded directory
    pub fn at(dir: PathBuf, host_command_id: impl Into<String>) -> Self {
        Self {
            dir,
            host_command_id: host_command_id.into(),
        }
    }

    pub fn create(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn host_command_id(&self) -> &str {
        &self.host_command_id
    }

    pub fn script_path(&self, command_id: &str) -> PathBuf {
        self.dir
            .join(format!("{DISPATCH_PREFIX}{command_id}{DISPATCH_SUFFIX}"))
    }

    /// Publish a command script so the wrapper sees it complete or not at all.
    ///
    /// The temp file and the final name live in the same directory, so the
    /// rename is atomic and the wrapper's scan never observes a partial write.
    pub fn dispatch(&self, command_id: &str, script: &str) -> Result<(), ProtocolError> {
        let tmp = self.dir.join(DISPATCH_TMP);
        fs::write(&tmp, script)?;
        fs::rename(&tmp, self.script_path(command_id))?;
        Ok(())
    }

    pub fn exit_path(&self, command_id: &str) -> PathBuf {
        self.dir.join(format!("{command_id}{EXIT_SUFFIX}"))
    }

    /// Read a wrapper-written exit file
    pub fn read_exit(&self, command_id: &str) -> Result<i32, ProtocolError> {
        let content = fs::read_to_string(self.exit_path(command_id))?;
        content
            .trim()
            .parse()
            .map_err(|_| ProtocolError::MalformedExit {
                command_id: command_id.to_string(),
                content: content.trim().to_string(),
            })
    }

    /// Poll until the wrapper reports the command's exit code
    pub async fn await_exit(
        &self,
        command_id: &str,
        timings: &ProtocolTimings,
    ) -> Result<i32, ProtocolError> {
        let path = self.exit_path(command_id);
        while !path.exists() {
            tokio::time::sleep(timings.exit_poll).await;
        }
        // Give the wrapper a moment to finish writing before reading
        tokio::time::sleep(timings.exit_settle).await;
        self.read_exit(command_id)
    }

    pub fn heartbeat_path(&self) -> PathBuf {
        self.dir.join(HEARTBEAT_FILE)
    }

    pub fn touch_heartbeat(&self, now_ms: i64) -> std::io::Result<()> {
        fs::write(self.heartbeat_path(), format!("{now_ms}\n"))
    }

    pub fn heartbeat_exists(&self) -> bool {
        self.heartbeat_path().exists()
    }

    pub fn remove_heartbeat(&self) -> std::io::Result<()> {
        let path = self.heartbeat_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn stop_path(&self) -> PathBuf {
        self.dir.join(STOP_FILE)
    }

    pub fn write_stop(&self, now_ms: i64) -> std::io::Result<()> {
        fs::write(self.stop_path(), format!("{now_ms}\n"))
    }

    pub fn stop_exists(&self) -> bool {
        self.stop_path().exists()
    }

    pub fn out_path(&self) -> PathBuf {
        self.dir.join(OUT_FILE)
    }

    pub fn err_path(&self) -> PathBuf {
        self.dir.join(ERR_FILE)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
