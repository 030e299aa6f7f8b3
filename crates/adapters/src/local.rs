// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local process backend
//!
//! Runs wrapper jobs as plain `bash -c` child processes. Persistence handles
//! carry the pid; a re-attached executor is not the process's parent, so its
//! exit code is unobservable and liveness comes from `/proc`.

use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command as ProcessCommand};
use weir_core::command::Command;
use weir_core::config::PoolConfig;
use weir_core::executor::{
    CommandExecutor, ExecutorError, ExecutorFactory, ExecutorHandle, ExecutorStatus,
};

/// Handle kind for local process executors
pub const LOCAL_KIND: &str = "local";

const LIVENESS_POLL: Duration = Duration::from_secs(1);

enum ProcessState {
    Unstarted,
    /// Our own child; exit status is observable
    Child(Child),
    /// Someone else's process, adopted by pid
    Attached { pid: u32 },
    Exited { code: i32 },
}

/// Executor that runs commands as local processes
pub struct LocalExecutor {
    state: tokio::sync::Mutex<ProcessState>,
    pid: std::sync::Mutex<Option<u32>>,
    job_name: std::sync::Mutex<Option<String>>,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self {
            state: tokio::sync::Mutex::new(ProcessState::Unstarted),
            pid: std::sync::Mutex::new(None),
            job_name: std::sync::Mutex::new(None),
        }
    }

    /// Re-attach to a process started by a previous controller
    pub fn attached(pid: u32) -> Self {
        Self {
            state: tokio::sync::Mutex::new(ProcessState::Attached { pid }),
            pid: std::sync::Mutex::new(Some(pid)),
            job_name: std::sync::Mutex::new(None),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Name recorded by `set_job_name`; local processes have no
    /// scheduler-visible name, so this is observability only
    pub fn job_name(&self) -> Option<String> {
        self.job_name
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    async fn start(
        &self,
        _config: &PoolConfig,
        command: &Command,
        out: &Path,
        err: &Path,
    ) -> Result<(), ExecutorError> {
        let mut state = self.state.lock().await;
        if !matches!(*state, ProcessState::Unstarted) {
            return Err(ExecutorError::Submit(
                "process already started".to_string(),
            ));
        }

        let stdout = std::fs::File::create(out)?;
        let stderr = std::fs::File::create(err)?;
        let child = ProcessCommand::new("bash")
            .arg("-c")
            .arg(&command.command)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| ExecutorError::Submit(e.to_string()))?;

        let pid = child
            .id()
            .ok_or_else(|| ExecutorError::Submit("spawned process has no pid".to_string()))?;
        *self.pid.lock().unwrap_or_else(|e| e.into_inner()) = Some(pid);
        tracing::debug!(pid, command = %command.id, "local process started");

        *state = ProcessState::Child(child);
        Ok(())
    }

    async fn wait_for(&self) -> Result<i32, ExecutorError> {
        let mut state = self.state.lock().await;
        match &mut *state {
            ProcessState::Child(child) => {
                let status = child.wait().await?;
                let code = status.code().unwrap_or(-1);
                *state = ProcessState::Exited { code };
                Ok(code)
            }
            ProcessState::Attached { pid } => {
                // Not our child: poll for disappearance; the code is unknowable
                let pid = *pid;
                drop(state);
                while process_alive(pid) {
                    tokio::time::sleep(LIVENESS_POLL).await;
                }
                tracing::debug!(pid, "re-attached process is gone");
                let mut state = self.state.lock().await;
                *state = ProcessState::Exited { code: 0 };
                Ok(0)
            }
            ProcessState::Exited { code } => Ok(*code),
            ProcessState::Unstarted => Err(ExecutorError::NotStarted),
        }
    }

    async fn stop(&self) -> Result<(), ExecutorError> {
        let mut state = self.state.lock().await;
        match &mut *state {
            ProcessState::Child(child) => {
                if let Err(e) = child.start_kill() {
                    // An already-exited child is fine; anything else is not
                    if e.kind() != std::io::ErrorKind::InvalidInput {
                        return Err(ExecutorError::Stop(e.to_string()));
                    }
                }
                let code = child
                    .wait()
                    .await
                    .ok()
                    .and_then(|status| status.code())
                    .unwrap_or(-1);
                *state = ProcessState::Exited { code };
                Ok(())
            }
            ProcessState::Attached { pid } => {
                let pid = *pid;
                let output = ProcessCommand::new("kill")
                    .arg(pid.to_string())
                    .output()
                    .await
                    .map_err(|e| ExecutorError::Stop(e.to_string()))?;
                if !output.status.success() && process_alive(pid) {
                    return Err(ExecutorError::Stop(
                        String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    ));
                }
                *state = ProcessState::Exited { code: -1 };
                Ok(())
            }
            // Nothing running; stop is idempotent
            _ => Ok(()),
        }
    }

    async fn status(&self) -> ExecutorStatus {
        let mut state = self.state.lock().await;
        match &mut *state {
            ProcessState::Unstarted => ExecutorStatus::Unknown,
            ProcessState::Child(child) => match child.try_wait() {
                Ok(Some(status)) => {
                    *state = ProcessState::Exited {
                        code: status.code().unwrap_or(-1),
                    };
                    ExecutorStatus::Complete
                }
                Ok(None) => ExecutorStatus::Running,
                Err(_) => ExecutorStatus::Unknown,
            },
            ProcessState::Attached { pid } => {
                if process_alive(*pid) {
                    ExecutorStatus::Running
                } else {
                    ExecutorStatus::Complete
                }
            }
            ProcessState::Exited { .. } => ExecutorStatus::Complete,
        }
    }

    async fn set_job_name(&self, name: &str) -> Result<(), ExecutorError> {
        *self.job_name.lock().unwrap_or_else(|e| e.into_inner()) = Some(name.to_string());
        Ok(())
    }

    fn handle(&self) -> ExecutorHandle {
        ExecutorHandle::new(LOCAL_KIND, json!({ "pid": self.pid() }))
    }
}

/// Factory for local process executors
#[derive(Clone, Default)]
pub struct LocalExecutorFactory;

impl LocalExecutorFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutorFactory for LocalExecutorFactory {
    async fn create(&self, _config: &PoolConfig) -> Result<Box<dyn CommandExecutor>, ExecutorError> {
        Ok(Box::new(LocalExecutor::new()))
    }

    async fn reattach(
        &self,
        handle: &ExecutorHandle,
    ) -> Result<Box<dyn CommandExecutor>, ExecutorError> {
        if handle.kind != LOCAL_KIND {
            return Err(ExecutorError::Reattach(format!(
                "unknown handle kind '{}'",
                handle.kind
            )));
        }
        let pid = handle
            .data
            .get("pid")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ExecutorError::Reattach("handle has no pid".to_string()))?;
        Ok(Box::new(LocalExecutor::attached(pid as u32)))
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
