// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One wrapper-job reservation that adopts pipeline commands
//!
//! A `PooledExecutor` owns a long-lived wrapper job on some backend and runs
//! at most one pipeline command at a time by publishing scripts into the
//! wrapper's protocol directory and watching for exit files.

use crate::clock::Clock;
use crate::command::{Command, CommandConfig};
use crate::config::PoolConfig;
use crate::executor::{
    CommandExecutor, ExecutorError, ExecutorHandle, ExecutorStatus,
};
use crate::protocol::{ProtocolError, ProtocolTimings, WrapperDir};
use crate::tail::{FileTailer, ForwardingLog, TailerHandle};
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};

/// Exit code surfaced when a wrapper writes an exit file that does not parse
pub const MALFORMED_EXIT_CODE: i32 = 1;

/// Where a reservation is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PooledState {
    Provisioning,
    Idle,
    Running,
    Stopping,
    Terminated,
}

/// Re-admission interface a pool exposes to its members.
///
/// Implementations must refuse members that have been stopped: a cancelled
/// reservation never returns to the idle set.
pub trait PoolMembership: Send + Sync {
    fn release(&self, member: Arc<PooledExecutor>);
}

struct Adoption {
    state: PooledState,
    current_command_id: Option<String>,
}

/// One wrapper job reservation
pub struct PooledExecutor {
    host_command_id: String,
    executor: Box<dyn CommandExecutor>,
    pool_config: PoolConfig,
    /// The wrapper-level command; its creation time anchors wall-time budgets
    command: Command,
    wrapper: WrapperDir,
    timings: ProtocolTimings,
    clock: Arc<dyn Clock>,
    output_log: ForwardingLog,
    adoption: Mutex<Adoption>,
    membership: Mutex<Option<Weak<dyn PoolMembership>>>,
    tails: Mutex<Vec<TailerHandle>>,
    weak_self: Weak<PooledExecutor>,
}

impl PooledExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host_command_id: impl Into<String>,
        executor: Box<dyn CommandExecutor>,
        pool_config: PoolConfig,
        command: Command,
        wrapper: WrapperDir,
        timings: ProtocolTimings,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            host_command_id: host_command_id.into(),
            executor,
            pool_config,
            command,
            wrapper,
            timings,
            clock,
            output_log: ForwardingLog::new(),
            adoption: Mutex::new(Adoption {
                state: PooledState::Provisioning,
                current_command_id: None,
            }),
            membership: Mutex::new(None),
            tails: Mutex::new(Vec::new()),
            weak_self: weak_self.clone(),
        })
    }

    pub fn host_command_id(&self) -> &str {
        &self.host_command_id
    }

    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool_config
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn wrapper(&self) -> &WrapperDir {
        &self.wrapper
    }

    pub fn output_log(&self) -> ForwardingLog {
        self.output_log.clone()
    }

    pub fn state(&self) -> PooledState {
        self.adoption.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    pub fn current_command_id(&self) -> Option<String> {
        self.adoption
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current_command_id
            .clone()
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state(), PooledState::Stopping | PooledState::Terminated)
    }

    /// Wire the owning pool's re-admission callback
    pub fn bind_membership(&self, membership: Weak<dyn PoolMembership>) {
        *self.membership.lock().unwrap_or_else(|e| e.into_inner()) = Some(membership);
    }

    /// Mark provisioning complete; the reservation may now adopt commands
    pub fn mark_idle(&self) {
        let mut adoption = self.adoption.lock().unwrap_or_else(|e| e.into_inner());
        if adoption.state == PooledState::Provisioning {
            adoption.state = PooledState::Idle;
        }
    }

    /// Begin following the wrapper's captured streams
    pub fn start_tails(&self) {
        let mut tails = self.tails.lock().unwrap_or_else(|e| e.into_inner());
        tails.push(FileTailer::spawn(
            self.wrapper.out_path(),
            self.output_log.clone(),
            self.timings.exit_poll,
        ));
        tails.push(FileTailer::spawn(
            self.wrapper.err_path(),
            self.output_log.clone(),
            self.timings.exit_poll,
        ));
    }

    fn stop_tails(&self) {
        self.tails
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn heartbeat_exists(&self) -> bool {
        self.wrapper.heartbeat_exists()
    }

    pub fn touch_heartbeat(&self) -> std::io::Result<()> {
        self.wrapper.touch_heartbeat(self.clock.epoch_millis())
    }

    /// Whether this reservation can run a command with the given config.
    ///
    /// Rejects only when both the pool and the command declare a wall-time
    /// budget and the wrapper's remaining allowance is too small.
    pub fn can_accept(&self, config: &CommandConfig) -> bool {
        let (Some(pool_walltime), Some(requested)) = (self.pool_config.walltime, config.walltime)
        else {
            return true;
        };
        let elapsed_ms = self.clock.epoch_millis() - self.command.create_time_ms;
        let remaining_ms = pool_walltime.as_millis() as i64 - elapsed_ms;
        // TODO: also weigh memory and cpu requests once command configs carry them
        remaining_ms >= requested.as_millis() as i64
    }

    /// Adopt a pipeline command: bind it, re-point the output log, and
    /// publish its script to the wrapper.
    ///
    /// Dispatch is asynchronous; completion is observed via `wait_for`.
    pub async fn execute(
        &self,
        command: &mut Command,
        log: Box<dyn Write + Send>,
    ) -> Result<(), ExecutorError> {
        {
            let mut adoption = self.adoption.lock().unwrap_or_else(|e| e.into_inner());
            if adoption.state != PooledState::Idle || adoption.current_command_id.is_some() {
                return Err(ExecutorError::Occupied {
                    host: self.host_command_id.clone(),
                });
            }
            adoption.state = PooledState::Running;
            adoption.current_command_id = Some(command.id.clone());
        }

        self.output_log.redirect(log);
        command.host = Some(self.host_command_id.clone());

        if let Err(e) = self.wrapper.dispatch(&command.id, &command.command) {
            // The wrapper never saw the script; put the reservation back
            let mut adoption = self.adoption.lock().unwrap_or_else(|e| e.into_inner());
            adoption.state = PooledState::Idle;
            adoption.current_command_id = None;
            drop(adoption);
            self.output_log.clear();
            command.host = None;
            return Err(e.into());
        }

        tracing::debug!(
            host = %self.host_command_id,
            command = %command.id,
            "command dispatched to wrapper"
        );

        if let Err(e) = self.executor.set_job_name(&command.name).await {
            tracing::warn!(host = %self.host_command_id, error = %e, "failed to set backend job name");
        }

        Ok(())
    }

    fn finish_adoption(&self) -> bool {
        let mut adoption = self.adoption.lock().unwrap_or_else(|e| e.into_inner());
        adoption.current_command_id = None;
        let stopped = matches!(
            adoption.state,
            PooledState::Stopping | PooledState::Terminated
        );
        if !stopped {
            adoption.state = PooledState::Idle;
        }
        stopped
    }

    fn invoke_membership(&self) {
        let membership = self
            .membership
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let (Some(membership), Some(me)) = (membership, self.weak_self.upgrade()) else {
            return;
        };
        if let Some(pool) = membership.upgrade() {
            pool.release(me);
        }
    }
}

#[async_trait]
impl CommandExecutor for PooledExecutor {
    /// Provisioning-time entry point: starts the backing wrapper job and
    /// names it after the pool for operator visibility
    async fn start(
        &self,
        config: &PoolConfig,
        command: &Command,
        out: &Path,
        err: &Path,
    ) -> Result<(), ExecutorError> {
        self.executor.start(config, command, out, err).await?;
        if let Err(e) = self.executor.set_job_name(&config.name).await {
            tracing::warn!(host = %self.host_command_id, error = %e, "failed to name wrapper job");
        }
        Ok(())
    }

    /// Poll for the adopted command's exit file and return its code.
    ///
    /// An unparseable exit file counts as a failed command rather than a
    /// protocol failure: the wrapper did finish, so the reservation may still
    /// return to the idle set.
    async fn wait_for(&self) -> Result<i32, ExecutorError> {
        let command_id = self
            .current_command_id()
            .ok_or_else(|| ExecutorError::NoAdoptedCommand {
                host: self.host_command_id.clone(),
            })?;

        let code = match self.wrapper.await_exit(&command_id, &self.timings).await {
            Ok(code) => code,
            Err(ProtocolError::MalformedExit { content, .. }) => {
                tracing::error!(
                    host = %self.host_command_id,
                    command = %command_id,
                    content,
                    "exit file did not parse; marking command failed"
                );
                MALFORMED_EXIT_CODE
            }
            Err(e) => return Err(e.into()),
        };

        self.finish_adoption();
        self.output_log.clear();

        if let Err(e) = self.executor.set_job_name(&self.pool_config.name).await {
            tracing::warn!(host = %self.host_command_id, error = %e, "failed to restore wrapper job name");
        }

        self.invoke_membership();

        tracing::debug!(
            host = %self.host_command_id,
            command = %command_id,
            code,
            "pooled command finished"
        );
        Ok(code)
    }

    /// Stop the wrapper: backend stop, stop file, heartbeat removal.
    ///
    /// Idempotent; repeated calls leave the same filesystem state.
    async fn stop(&self) -> Result<(), ExecutorError> {
        {
            let mut adoption = self.adoption.lock().unwrap_or_else(|e| e.into_inner());
            if adoption.state != PooledState::Terminated {
                adoption.state = PooledState::Stopping;
            }
        }

        let backend = self.executor.stop().await;

        self.wrapper.write_stop(self.clock.epoch_millis())?;
        self.wrapper.remove_heartbeat()?;
        self.stop_tails();

        self.adoption.lock().unwrap_or_else(|e| e.into_inner()).state = PooledState::Terminated;

        tracing::debug!(host = %self.host_command_id, "wrapper stopped");
        backend
    }

    async fn status(&self) -> ExecutorStatus {
        self.executor.status().await
    }

    async fn set_job_name(&self, name: &str) -> Result<(), ExecutorError> {
        self.executor.set_job_name(name).await
    }

    fn handle(&self) -> ExecutorHandle {
        self.executor.handle()
    }
}

#[cfg(test)]
#[path = "pooled_tests.rs"]
mod tests;
