// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake executor implementations for testing

use crate::command::Command;
use crate::config::PoolConfig;
use crate::executor::{
    CommandExecutor, ExecutorError, ExecutorFactory, ExecutorHandle, ExecutorStatus,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Recorded call to an executor method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorCall {
    Start { command_id: String },
    WaitFor,
    Stop,
    SetJobName { name: String },
}

#[derive(Debug)]
struct FakeExecState {
    calls: Vec<ExecutorCall>,
    status: ExecutorStatus,
    job_name: Option<String>,
    exit_code: i32,
    start_fails: bool,
    stop_fails: bool,
}

/// Fake executor with call recording for testing
#[derive(Clone)]
pub struct FakeExecutor {
    id: String,
    state: Arc<Mutex<FakeExecState>>,
}

impl FakeExecutor {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_status(id, ExecutorStatus::Unknown)
    }

    /// A fake that reports as already running, as a re-attached backend would
    pub fn running(id: impl Into<String>) -> Self {
        Self::with_status(id, ExecutorStatus::Running)
    }

    fn with_status(id: impl Into<String>, status: ExecutorStatus) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(Mutex::new(FakeExecState {
                calls: Vec::new(),
                status,
                job_name: None,
                exit_code: 0,
                start_fails: false,
                stop_fails: false,
            })),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).calls.clone()
    }

    pub fn job_name(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .job_name
            .clone()
    }

    pub fn set_status(&self, status: ExecutorStatus) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).status = status;
    }

    pub fn set_exit_code(&self, code: i32) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).exit_code = code;
    }

    pub fn fail_starts(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).start_fails = true;
    }

    pub fn fail_stops(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).stop_fails = true;
    }

    fn record(&self, call: ExecutorCall) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .push(call);
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn start(
        &self,
        _config: &PoolConfig,
        command: &Command,
        _out: &Path,
        _err: &Path,
    ) -> Result<(), ExecutorError> {
        self.record(ExecutorCall::Start {
            command_id: command.id.clone(),
        });
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.start_fails {
            return Err(ExecutorError::Submit("fake start failure".to_string()));
        }
        state.status = ExecutorStatus::Running;
        Ok(())
    }

    async fn wait_for(&self) -> Result<i32, ExecutorError> {
        self.record(ExecutorCall::WaitFor);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.status = ExecutorStatus::Complete;
        Ok(state.exit_code)
    }

    async fn stop(&self) -> Result<(), ExecutorError> {
        self.record(ExecutorCall::Stop);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.stop_fails {
            return Err(ExecutorError::Stop("fake stop failure".to_string()));
        }
        state.status = ExecutorStatus::Complete;
        Ok(())
    }

    async fn status(&self) -> ExecutorStatus {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).status
    }

    async fn set_job_name(&self, name: &str) -> Result<(), ExecutorError> {
        self.record(ExecutorCall::SetJobName {
            name: name.to_string(),
        });
        self.state.lock().unwrap_or_else(|e| e.into_inner()).job_name = Some(name.to_string());
        Ok(())
    }

    fn handle(&self) -> ExecutorHandle {
        ExecutorHandle::new("fake", json!({ "id": self.id }))
    }
}

#[derive(Default)]
struct FactoryState {
    created: Vec<FakeExecutor>,
    reattached: Vec<String>,
    reattach_status: HashMap<String, ExecutorStatus>,
    create_fails: bool,
}

/// Fake factory that records creations and allows seeding re-attach outcomes
#[derive(Clone, Default)]
pub struct FakeExecutorFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl FakeExecutorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executors handed out by `create`, in order
    pub fn created(&self) -> Vec<FakeExecutor> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .created
            .clone()
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).created.len()
    }

    /// Handle ids that have been re-attached, in order
    pub fn reattached_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reattached
            .clone()
    }

    /// Pre-seed the status a re-attached executor will report.
    /// Unseeded handles re-attach as `Running`.
    pub fn set_reattach_status(&self, id: impl Into<String>, status: ExecutorStatus) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reattach_status
            .insert(id.into(), status);
    }

    pub fn fail_creates(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).create_fails = true;
    }
}

#[async_trait]
impl ExecutorFactory for FakeExecutorFactory {
    async fn create(&self, config: &PoolConfig) -> Result<Box<dyn CommandExecutor>, ExecutorError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.create_fails {
            return Err(ExecutorError::Submit("fake create failure".to_string()));
        }
        let executor = FakeExecutor::new(format!("{}-{}", config.name, state.created.len()));
        state.created.push(executor.clone());
        Ok(Box::new(executor))
    }

    async fn reattach(
        &self,
        handle: &ExecutorHandle,
    ) -> Result<Box<dyn CommandExecutor>, ExecutorError> {
        if handle.kind != "fake" {
            return Err(ExecutorError::Reattach(format!(
                "unknown handle kind '{}'",
                handle.kind
            )));
        }
        let id = handle
            .data
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ExecutorError::Reattach("handle has no id".to_string()))?
            .to_string();

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let status = state
            .reattach_status
            .get(&id)
            .copied()
            .unwrap_or(ExecutorStatus::Running);
        state.reattached.push(id.clone());

        let executor = FakeExecutor::new(&id);
        executor.set_status(status);
        Ok(Box::new(executor))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
