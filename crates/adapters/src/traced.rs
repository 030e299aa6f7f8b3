// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced executor wrappers for consistent observability

use async_trait::async_trait;
use std::path::Path;
use weir_core::command::Command;
use weir_core::config::PoolConfig;
use weir_core::executor::{
    CommandExecutor, ExecutorError, ExecutorFactory, ExecutorHandle, ExecutorStatus,
};

/// Wrapper that adds tracing to any CommandExecutor
pub struct TracedExecutor<E> {
    inner: E,
    label: String,
}

impl<E> TracedExecutor<E> {
    pub fn new(inner: E, label: impl Into<String>) -> Self {
        Self {
            inner,
            label: label.into(),
        }
    }
}

#[async_trait]
impl<E: CommandExecutor> CommandExecutor for TracedExecutor<E> {
    async fn start(
        &self,
        config: &PoolConfig,
        command: &Command,
        out: &Path,
        err: &Path,
    ) -> Result<(), ExecutorError> {
        let span = tracing::info_span!("executor.start", label = %self.label);
        let _guard = span.enter();

        tracing::info!(command = %command.id, pool = %config.name, "starting backend job");
        let started = std::time::Instant::now();
        let result = self.inner.start(config, command, out, err).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(()) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "backend job started"
            ),
            Err(e) => tracing::error!(
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "start failed"
            ),
        }

        result
    }

    async fn wait_for(&self) -> Result<i32, ExecutorError> {
        let span = tracing::info_span!("executor.wait_for", label = %self.label);
        let _guard = span.enter();

        let started = std::time::Instant::now();
        let result = self.inner.wait_for().await;
        let elapsed = started.elapsed();

        match &result {
            Ok(code) => tracing::info!(
                code,
                elapsed_ms = elapsed.as_millis() as u64,
                "backend job finished"
            ),
            Err(e) => tracing::error!(error = %e, "wait failed"),
        }

        result
    }

    async fn stop(&self) -> Result<(), ExecutorError> {
        let span = tracing::info_span!("executor.stop", label = %self.label);
        let _guard = span.enter();

        let result = self.inner.stop().await;
        match &result {
            Ok(()) => tracing::info!("stopped"),
            // A backend that is already gone often reports failure here
            Err(e) => tracing::warn!(error = %e, "stop failed (may be expected)"),
        }

        result
    }

    async fn status(&self) -> ExecutorStatus {
        let status = self.inner.status().await;
        tracing::trace!(label = %self.label, ?status, "checked");
        status
    }

    async fn set_job_name(&self, name: &str) -> Result<(), ExecutorError> {
        tracing::debug!(label = %self.label, name, "renaming backend job");
        self.inner.set_job_name(name).await
    }

    fn handle(&self) -> ExecutorHandle {
        self.inner.handle()
    }
}

/// Factory wrapper that traces creations and wraps every product
pub struct TracedExecutorFactory<F> {
    inner: F,
}

impl<F> TracedExecutorFactory<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<F: ExecutorFactory> ExecutorFactory for TracedExecutorFactory<F> {
    async fn create(&self, config: &PoolConfig) -> Result<Box<dyn CommandExecutor>, ExecutorError> {
        tracing::debug!(pool = %config.name, "creating backend executor");
        let executor = self.inner.create(config).await?;
        Ok(Box::new(TracedExecutor::new(executor, config.name.clone())))
    }

    async fn reattach(
        &self,
        handle: &ExecutorHandle,
    ) -> Result<Box<dyn CommandExecutor>, ExecutorError> {
        tracing::debug!(kind = %handle.kind, "re-attaching backend executor");
        let executor = self.inner.reattach(handle).await?;
        Ok(Box::new(TracedExecutor::new(executor, handle.kind.clone())))
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
