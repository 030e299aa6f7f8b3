// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller-side heartbeat ticker
//!
//! One process-wide periodic task re-asserts the controller's liveness file
//! for every live wrapper. Wrappers delete the file on their own schedule;
//! the next tick re-creates it. Once the controller dies, the files stay
//! gone and orphaned wrappers terminate themselves.

use crate::clock::Clock;
use crate::pooled::PooledExecutor;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct HeartbeatTicker {
    interval: Duration,
    clock: Arc<dyn Clock>,
    executors: Mutex<Vec<Weak<PooledExecutor>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatTicker {
    pub fn new(interval: Duration, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            interval,
            clock,
            executors: Mutex::new(Vec::new()),
            task: Mutex::new(None),
        })
    }

    /// Add a wrapper to the tick list. Registration is weak: dropped or
    /// stopped wrappers fall off on the next tick.
    pub fn register(&self, executor: &Arc<PooledExecutor>) {
        self.executors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::downgrade(executor));
    }

    /// Number of live registrations, pruning as a side effect
    pub fn registered(&self) -> usize {
        let mut executors = self.executors.lock().unwrap_or_else(|e| e.into_inner());
        executors.retain(|weak| weak.upgrade().is_some_and(|pe| !pe.is_stopped()));
        executors.len()
    }

    /// One tick: re-create any absent heartbeat file.
    ///
    /// One-shot per tick; a file the wrapper deletes between ticks is
    /// re-asserted on the next one.
    pub fn tick(&self) {
        let now_ms = self.clock.epoch_millis();
        let mut executors = self.executors.lock().unwrap_or_else(|e| e.into_inner());
        executors.retain(|weak| {
            let Some(pe) = weak.upgrade() else {
                return false;
            };
            if pe.is_stopped() {
                return false;
            }
            if !pe.heartbeat_exists() {
                if let Err(e) = pe.wrapper().touch_heartbeat(now_ms) {
                    tracing::warn!(
                        host = %pe.host_command_id(),
                        error = %e,
                        "failed to refresh heartbeat"
                    );
                }
            }
            true
        });
    }

    /// Spawn the periodic task; repeated calls are no-ops
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return;
        }
        let ticker = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(ticker.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                ticker.tick();
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}

impl Drop for HeartbeatTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
