// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pooled-executor descriptors on disk and wrapper re-attachment
//!
//! Every successfully provisioned wrapper is described by one JSON file under
//! `pools/<poolName>/<hostCommandId>`. Transient state (forwarding log,
//! adopted command, pool membership) is deliberately absent from the
//! descriptor and rebuilt when the owning pool reconnects.

use crate::command::Command;
use crate::config::PoolConfig;
use crate::executor::{CommandExecutor, ExecutorFactory, ExecutorHandle, ExecutorStatus};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Directory under the state root holding per-pool descriptor dirs
pub const POOLS_DIR: &str = "pools";

const LOCK_FILE: &str = ".lock";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("descriptor not found: {0}")]
    NotFound(String),
    #[error("pool directory {0} is locked by another controller")]
    Locked(PathBuf),
}

/// Serialized form of one wrapper reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPooledExecutor {
    pub host_command_id: String,
    /// Backend reconnection state
    pub executor: ExecutorHandle,
    /// Pool configuration snapshot at provisioning time
    pub pool_config: PoolConfig,
    /// The wrapper-level command; its creation time anchors wall-time budgets
    pub command: Command,
    /// The wrapper's protocol directory
    pub command_dir: PathBuf,
    pub stored_at: DateTime<Utc>,
}

/// Descriptor storage for one named pool
#[derive(Debug, Clone)]
pub struct PoolStore {
    dir: PathBuf,
}

impl PoolStore {
    pub fn open(state_root: &Path, pool_name: &str) -> Result<Self, StoreError> {
        let dir = state_root.join(POOLS_DIR).join(pool_name);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Take the single-controller lock for this pool directory.
    ///
    /// The lock is held for the lifetime of the returned guard; a second
    /// controller on the same directory fails fast instead of corrupting it.
    pub fn lock(&self) -> Result<PoolDirLock, StoreError> {
        let file = File::create(self.dir.join(LOCK_FILE))?;
        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(self.dir.clone()))?;
        Ok(PoolDirLock { _file: file })
    }

    pub fn save(&self, descriptor: &StoredPooledExecutor) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(descriptor)?;
        fs::write(self.dir.join(&descriptor.host_command_id), json)?;
        Ok(())
    }

    pub fn load(&self, host_command_id: &str) -> Result<StoredPooledExecutor, StoreError> {
        let path = self.dir.join(host_command_id);
        if !path.exists() {
            return Err(StoreError::NotFound(host_command_id.to_string()));
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn delete(&self, host_command_id: &str) -> Result<(), StoreError> {
        let path = self.dir.join(host_command_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// List stored wrapper ids. Descriptor filenames follow the backend
    /// job-id convention: entirely numeric, so anything else is ignored.
    pub fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Held for the lifetime of a controller's claim on a pool directory
pub struct PoolDirLock {
    _file: File,
}

/// A descriptor whose backend was re-attached and still reports as running
pub struct RecoveredExecutor {
    pub descriptor: StoredPooledExecutor,
    pub executor: Box<dyn CommandExecutor>,
}

/// Rediscover wrappers left running by a previous controller.
///
/// Unreadable descriptors are logged and skipped; descriptors whose backend
/// is no longer running are discarded. Survivors are consumed by the pool
/// before it provisions any new wrappers.
pub async fn search_for_existing_pools(
    store: &PoolStore,
    factory: &Arc<dyn ExecutorFactory>,
) -> Result<Vec<RecoveredExecutor>, StoreError> {
    let mut recovered = Vec::new();

    for id in store.list_ids()? {
        let descriptor = match store.load(&id) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::error!(host = %id, error = %e, "unreadable pool descriptor, skipping");
                continue;
            }
        };

        let executor = match factory.reattach(&descriptor.executor).await {
            Ok(executor) => executor,
            Err(e) => {
                tracing::warn!(host = %id, error = %e, "could not re-attach backend, discarding descriptor");
                let _ = store.delete(&id);
                continue;
            }
        };

        match executor.status().await {
            ExecutorStatus::Running => {
                tracing::info!(host = %id, "re-attached running wrapper");
                recovered.push(RecoveredExecutor {
                    descriptor,
                    executor,
                });
            }
            status => {
                tracing::debug!(host = %id, ?status, "wrapper no longer running, discarding descriptor");
                let _ = store.delete(&id);
            }
        }
    }

    Ok(recovered)
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
