// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID generation abstractions

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Generates unique identifiers
pub trait IdGen: Send + Sync + 'static {
    fn next(&self) -> String;
}

/// UUID-based ID generator for pipeline-level commands
#[derive(Clone, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// All-digit ID generator for wrapper commands.
///
/// Pool descriptor filenames follow the backend job-id convention and must be
/// entirely numeric, so wrapper ids come from a counter rather than a UUID.
/// The counter is seeded from the epoch so ids stay unique across controller
/// restarts sharing one pool directory.
#[derive(Clone)]
pub struct NumericIdGen {
    counter: Arc<AtomicU64>,
}

impl NumericIdGen {
    pub fn new() -> Self {
        let seed = chrono::Utc::now().timestamp_millis() as u64;
        Self::starting_at(seed)
    }

    /// Start the counter at a known value, for deterministic tests
    pub fn starting_at(seed: u64) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(seed)),
        }
    }
}

impl Default for NumericIdGen {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGen for NumericIdGen {
    fn next(&self) -> String {
        self.counter.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

/// Sequential ID generator for testing
#[derive(Clone)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialIdGen {
    fn default() -> Self {
        Self::new("id")
    }
}

impl IdGen for SequentialIdGen {
    fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
