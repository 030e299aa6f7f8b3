// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide routing of commands onto named pools
//!
//! The registry is lifecycle-scoped rather than a true global: construct it
//! with its dependencies, `init_pools` from configuration, and inject it
//! wherever commands are dispatched.

use crate::command::{Command, CommandConfig};
use crate::config::{ConfigError, PoolConfig};
use crate::pool::{Dispatch, ExecutorPool, PoolDeps, PoolError};
use std::io::Write;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("preallocate section is not an object")]
    NotAnObject,
}

/// Named pools in registration order
pub struct PoolRegistry {
    deps: PoolDeps,
    pools: Mutex<Vec<Arc<ExecutorPool>>>,
}

impl PoolRegistry {
    pub fn new(deps: PoolDeps) -> Self {
        Self {
            deps,
            pools: Mutex::new(Vec::new()),
        }
    }

    /// Build and start one pool per subsection of the `preallocate`
    /// configuration. The section key defaults both the pool name and the
    /// config list. Starts the heartbeat ticker once pools exist.
    pub async fn init_pools(&self, preallocate: &serde_json::Value) -> Result<(), RegistryError> {
        let sections = preallocate.as_object().ok_or(RegistryError::NotAnObject)?;

        for (key, value) in sections {
            let config = PoolConfig::from_section(key, value)?;
            let pool = ExecutorPool::new(config, self.deps.clone())?;
            pool.start().await?;
            self.register(pool);
        }

        self.deps.ticker.start();
        Ok(())
    }

    /// Add an already-started pool
    pub fn register(&self, pool: Arc<ExecutorPool>) {
        self.pools
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(pool);
    }

    pub fn pools(&self) -> Vec<Arc<ExecutorPool>> {
        self.pools
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn pool(&self, name: &str) -> Option<Arc<ExecutorPool>> {
        self.pools()
            .into_iter()
            .find(|pool| pool.name() == name)
    }

    /// Route a command onto the first registered pool that serves its config
    /// and has a compatible idle wrapper. With no match, the command and its
    /// log sink come back unchanged and the caller dispatches directly.
    pub async fn request_executor(
        &self,
        command: Command,
        config: &CommandConfig,
        log: Box<dyn Write + Send>,
    ) -> Result<Dispatch, RegistryError> {
        let mut command = command;
        let mut log = log;

        for pool in self.pools() {
            if !pool.serves(&config.name) {
                continue;
            }
            match pool.take(command, log).await? {
                Dispatch::Adopted(adopted) => {
                    tracing::debug!(
                        pool = %pool.name(),
                        command = %adopted.command().id,
                        host = ?adopted.command().host,
                        "command adopted by pool"
                    );
                    return Ok(Dispatch::Adopted(adopted));
                }
                Dispatch::Direct(returned_command, returned_log) => {
                    command = returned_command;
                    log = returned_log;
                }
            }
        }

        Ok(Dispatch::Direct(command, log))
    }

    /// Shut down non-persistent pools. Persistent pools are skipped so their
    /// wrappers survive for the next controller run; without a controller the
    /// heartbeat ticker stops with us.
    pub async fn shutdown_all(&self) {
        let pools: Vec<_> = {
            let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
            pools.drain(..).collect()
        };

        for pool in pools {
            if pool.is_persistent() {
                tracing::info!(pool = %pool.name(), "leaving persistent pool running");
                continue;
            }
            pool.shutdown().await;
        }

        self.deps.ticker.stop();
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
