// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-size pool of wrapper reservations for one backend family

use crate::clock::Clock;
use crate::command::Command;
use crate::config::PoolConfig;
use crate::executor::{CommandExecutor, ExecutorError, ExecutorFactory};
use crate::heartbeat::HeartbeatTicker;
use crate::id::IdGen;
use crate::persist::{
    search_for_existing_pools, PoolDirLock, PoolStore, RecoveredExecutor, StoreError,
    StoredPooledExecutor,
};
use crate::pooled::{PoolMembership, PooledExecutor};
use crate::protocol::{ProtocolError, ProtocolTimings, WrapperDir};
use crate::template::render_wrapper_script;
use chrono::Utc;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared construction dependencies for pools
#[derive(Clone)]
pub struct PoolDeps {
    pub factory: Arc<dyn ExecutorFactory>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGen>,
    pub timings: ProtocolTimings,
    pub state_root: PathBuf,
    pub ticker: Arc<HeartbeatTicker>,
}

/// A pipeline command bound to the wrapper that adopted it
pub struct AdoptedCommand {
    command: Command,
    executor: Arc<PooledExecutor>,
}

impl AdoptedCommand {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn executor(&self) -> &Arc<PooledExecutor> {
        &self.executor
    }

    /// Block until the wrapper reports the command's exit code
    pub async fn wait(&self) -> Result<i32, ExecutorError> {
        self.executor.wait_for().await
    }

    pub fn into_command(self) -> Command {
        self.command
    }
}

/// Outcome of asking for a pooled reservation
pub enum Dispatch {
    /// A wrapper adopted the command
    Adopted(AdoptedCommand),
    /// No compatible reservation; the caller dispatches directly, keeping
    /// its command and log sink
    Direct(Command, Box<dyn Write + Send>),
}

impl Dispatch {
    pub fn is_adopted(&self) -> bool {
        matches!(self, Dispatch::Adopted(_))
    }

    pub fn adopted(self) -> Option<AdoptedCommand> {
        match self {
            Dispatch::Adopted(adopted) => Some(adopted),
            Dispatch::Direct(..) => None,
        }
    }
}

/// Fixed-size set of pooled executors serving one named pool
pub struct ExecutorPool {
    config: PoolConfig,
    deps: PoolDeps,
    store: PoolStore,
    idle: Mutex<Vec<Arc<PooledExecutor>>>,
    members: Mutex<Vec<Arc<PooledExecutor>>>,
    dir_lock: Mutex<Option<PoolDirLock>>,
    started_at_ms: Mutex<Option<i64>>,
}

impl ExecutorPool {
    pub fn new(config: PoolConfig, deps: PoolDeps) -> Result<Arc<Self>, PoolError> {
        let store = PoolStore::open(&deps.state_root, &config.name)?;
        Ok(Arc::new(Self {
            config,
            deps,
            store,
            idle: Mutex::new(Vec::new()),
            members: Mutex::new(Vec::new()),
            dir_lock: Mutex::new(None),
            started_at_ms: Mutex::new(None),
        }))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_persistent(&self) -> bool {
        self.config.persist
    }

    /// Whether this pool serves commands resolved to the given backend config
    pub fn serves(&self, config_name: &str) -> bool {
        self.config.serves(config_name)
    }

    pub fn idle_len(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn size(&self) -> usize {
        self.members.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn started_at_ms(&self) -> Option<i64> {
        *self.started_at_ms.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bring the pool to strength: consume persisted survivors first, then
    /// provision fresh wrappers.
    pub async fn start(self: &Arc<Self>) -> Result<(), PoolError> {
        *self.dir_lock.lock().unwrap_or_else(|e| e.into_inner()) = Some(self.store.lock()?);
        *self.started_at_ms.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(self.deps.clock.epoch_millis());

        let mut survivors = if self.config.persist {
            search_for_existing_pools(&self.store, &self.deps.factory).await?
        } else {
            Vec::new()
        };

        for _ in 0..self.config.jobs {
            let member = match survivors.pop() {
                Some(recovered) => self.connect(recovered),
                None => self.provision().await?,
            };
            self.admit(member);
        }

        if !survivors.is_empty() {
            // Extra survivors get no heartbeat; starvation reaps their wrappers
            tracing::warn!(
                pool = %self.config.name,
                extra = survivors.len(),
                "more persisted wrappers than pool slots, leaving extras to expire"
            );
        }

        tracing::info!(
            pool = %self.config.name,
            jobs = self.config.jobs,
            persist = self.config.persist,
            "pool started"
        );
        Ok(())
    }

    /// Rebuild the transient side of a recovered reservation: fresh output
    /// forwarding, tails, membership, heartbeat registration.
    fn connect(self: &Arc<Self>, recovered: RecoveredExecutor) -> Arc<PooledExecutor> {
        let StoredPooledExecutor {
            host_command_id,
            pool_config,
            command,
            command_dir,
            ..
        } = recovered.descriptor;

        let wrapper = WrapperDir::at(command_dir, host_command_id.clone());
        let member = PooledExecutor::new(
            host_command_id,
            recovered.executor,
            pool_config,
            command,
            wrapper,
            self.deps.timings.clone(),
            Arc::clone(&self.deps.clock),
        );
        tracing::info!(
            pool = %self.config.name,
            host = %member.host_command_id(),
            "re-connected persisted wrapper"
        );
        member
    }

    /// Provision one fresh wrapper: directory, script, backend job, descriptor
    async fn provision(self: &Arc<Self>) -> Result<Arc<PooledExecutor>, PoolError> {
        let host_command_id = self.deps.ids.next();
        let wrapper = WrapperDir::new(&self.deps.state_root, host_command_id.clone());
        wrapper.create()?;

        let script = render_wrapper_script(
            &self.config.name,
            wrapper.dir(),
            &self.deps.timings,
            self.config.debug,
        );
        let command = Command::new(
            host_command_id.clone(),
            self.config.name.clone(),
            script,
            crate::command::CommandConfig::new(self.config.name.clone()),
            self.deps.clock.as_ref(),
        );

        let executor = self.deps.factory.create(&self.config).await?;
        let member = PooledExecutor::new(
            host_command_id.clone(),
            executor,
            self.config.clone(),
            command,
            wrapper,
            self.deps.timings.clone(),
            Arc::clone(&self.deps.clock),
        );

        member
            .start(
                &self.config,
                member.command(),
                &member.wrapper().out_path(),
                &member.wrapper().err_path(),
            )
            .await?;

        self.store.save(&StoredPooledExecutor {
            host_command_id,
            executor: member.handle(),
            pool_config: self.config.clone(),
            command: member.command().clone(),
            command_dir: member.wrapper().dir().to_path_buf(),
            stored_at: Utc::now(),
        })?;

        tracing::info!(
            pool = %self.config.name,
            host = %member.host_command_id(),
            "provisioned new wrapper"
        );
        Ok(member)
    }

    fn admit(self: &Arc<Self>, member: Arc<PooledExecutor>) {
        let membership: Weak<dyn PoolMembership> = Arc::downgrade(&(Arc::clone(self) as Arc<dyn PoolMembership>));
        member.bind_membership(membership);
        member.mark_idle();
        member.start_tails();
        self.deps.ticker.register(&member);
        self.members
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&member));
        self.idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(member);
    }

    /// Hand a compatible idle wrapper the command.
    ///
    /// Selection happens under the idle-set lock so no reservation is handed
    /// out twice; the first compatible member wins. Dispatch itself runs
    /// outside the lock.
    pub async fn take(
        &self,
        mut command: Command,
        log: Box<dyn Write + Send>,
    ) -> Result<Dispatch, PoolError> {
        let selected = {
            let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.iter()
                .position(|pe| pe.can_accept(&command.processed_config))
                .map(|index| idle.remove(index))
        };

        let Some(member) = selected else {
            tracing::debug!(
                pool = %self.config.name,
                command = %command.id,
                "no compatible idle wrapper"
            );
            return Ok(Dispatch::Direct(command, log));
        };

        match member.execute(&mut command, log).await {
            Ok(()) => Ok(Dispatch::Adopted(AdoptedCommand {
                command,
                executor: member,
            })),
            Err(e) => {
                // The reservation rolled itself back; return it for reuse
                self.idle
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(member);
                Err(e.into())
            }
        }
    }

    /// Stop every member wrapper. Individual stop failures are logged, not
    /// propagated, so one stubborn backend cannot wedge a shutdown.
    pub async fn shutdown(&self) {
        let members: Vec<_> = {
            let mut members = self.members.lock().unwrap_or_else(|e| e.into_inner());
            self.idle.lock().unwrap_or_else(|e| e.into_inner()).clear();
            members.drain(..).collect()
        };

        for member in members {
            if let Err(e) = member.stop().await {
                tracing::warn!(
                    pool = %self.config.name,
                    host = %member.host_command_id(),
                    error = %e,
                    "failed to stop wrapper"
                );
            }
            if let Err(e) = self.store.delete(member.host_command_id()) {
                tracing::warn!(
                    pool = %self.config.name,
                    host = %member.host_command_id(),
                    error = %e,
                    "failed to remove descriptor"
                );
            }
        }

        *self.dir_lock.lock().unwrap_or_else(|e| e.into_inner()) = None;
        tracing::info!(pool = %self.config.name, "pool shut down");
    }
}

impl PoolMembership for ExecutorPool {
    fn release(&self, member: Arc<PooledExecutor>) {
        if member.is_stopped() {
            tracing::debug!(
                pool = %self.config.name,
                host = %member.host_command_id(),
                "not re-admitting stopped wrapper"
            );
            return;
        }
        self.idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(member);
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
