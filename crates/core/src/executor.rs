// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uniform backend contract for command execution

use crate::command::Command;
use crate::config::PoolConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Backend-reported job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorStatus {
    Queued,
    Running,
    Complete,
    Unknown,
}

/// Errors from executor operations
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] crate::protocol::ProtocolError),
    #[error("backend submission failed: {0}")]
    Submit(String),
    #[error("backend stop failed: {0}")]
    Stop(String),
    #[error("cannot re-attach executor: {0}")]
    Reattach(String),
    #[error("executor has not been started")]
    NotStarted,
    #[error("wrapper {host} is already running a command")]
    Occupied { host: String },
    #[error("wrapper {host} has no adopted command")]
    NoAdoptedCommand { host: String },
}

/// Serializable reconnection state for one backend job.
///
/// Every executor variant must be able to round-trip through its handle so
/// persistent pools can re-attach after a controller restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorHandle {
    /// Which factory variant produced this handle
    pub kind: String,
    /// Variant-specific reconnection data
    pub data: serde_json::Value,
}

impl ExecutorHandle {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

/// Polymorphic capability over execution backends
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Begin the backend job, capturing its streams to the given files
    async fn start(
        &self,
        config: &PoolConfig,
        command: &Command,
        out: &Path,
        err: &Path,
    ) -> Result<(), ExecutorError>;

    /// Block until the job exits and return its exit code
    async fn wait_for(&self) -> Result<i32, ExecutorError>;

    /// Request termination
    async fn stop(&self) -> Result<(), ExecutorError>;

    async fn status(&self) -> ExecutorStatus;

    /// Rename the backend job for operator visibility, where supported
    async fn set_job_name(&self, name: &str) -> Result<(), ExecutorError>;

    /// Reconnection handle for persistence
    fn handle(&self) -> ExecutorHandle;
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for Box<T> {
    async fn start(
        &self,
        config: &PoolConfig,
        command: &Command,
        out: &Path,
        err: &Path,
    ) -> Result<(), ExecutorError> {
        (**self).start(config, command, out, err).await
    }

    async fn wait_for(&self) -> Result<i32, ExecutorError> {
        (**self).wait_for().await
    }

    async fn stop(&self) -> Result<(), ExecutorError> {
        (**self).stop().await
    }

    async fn status(&self) -> ExecutorStatus {
        (**self).status().await
    }

    async fn set_job_name(&self, name: &str) -> Result<(), ExecutorError> {
        (**self).set_job_name(name).await
    }

    fn handle(&self) -> ExecutorHandle {
        (**self).handle()
    }
}

/// Creates and re-attaches backend executors
#[async_trait]
pub trait ExecutorFactory: Send + Sync {
    /// Create a fresh executor for a new backend job
    async fn create(&self, config: &PoolConfig) -> Result<Box<dyn CommandExecutor>, ExecutorError>;

    /// Reconstruct an executor for a job submitted by a previous controller
    async fn reattach(
        &self,
        handle: &ExecutorHandle,
    ) -> Result<Box<dyn CommandExecutor>, ExecutorError>;
}
