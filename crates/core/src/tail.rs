// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output forwarding from wrapper capture files to pipeline logs

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// A log sink whose destination can be swapped while a tailer runs.
///
/// The tailer fetches the wrapped sink fresh for every line, so re-pointing
/// the sink on adoption is race-free: lines simply land in whichever sink is
/// installed when they are forwarded.
#[derive(Clone, Default)]
pub struct ForwardingLog {
    wrapped: Arc<Mutex<Option<Box<dyn Write + Send>>>>,
}

impl ForwardingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the log at a new destination
    pub fn redirect(&self, sink: Box<dyn Write + Send>) {
        *self.wrapped.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }

    /// Drop the current destination; forwarded lines are discarded until the
    /// next redirect
    pub fn clear(&self) {
        *self.wrapped.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_wired(&self) -> bool {
        self.wrapped
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Forward one line to the currently installed sink, if any
    pub fn write_line(&self, line: &str) {
        let mut wrapped = self.wrapped.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sink) = wrapped.as_mut() {
            let _ = writeln!(sink, "{line}");
            let _ = sink.flush();
        }
    }
}

/// Follows a wrapper capture file and forwards appended lines
pub struct FileTailer {
    path: PathBuf,
    offset: u64,
    partial: String,
    log: ForwardingLog,
}

impl FileTailer {
    pub fn new(path: impl Into<PathBuf>, log: ForwardingLog) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            partial: String::new(),
            log,
        }
    }

    /// Forward any complete lines appended since the last poll.
    ///
    /// Returns the number of lines forwarded. A file that does not exist yet
    /// is not an error; the wrapper creates it lazily.
    pub fn poll(&mut self) -> std::io::Result<usize> {
        let mut file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let len = file.metadata()?.len();
        if len < self.offset {
            // Truncated underneath us; start over
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(0);
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        self.offset += buf.len() as u64;

        self.partial.push_str(&buf);
        let mut forwarded = 0;
        while let Some(newline) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=newline).collect();
            self.log.write_line(line.trim_end_matches('\n'));
            forwarded += 1;
        }
        Ok(forwarded)
    }

    /// Spawn a background task polling at the given cadence
    pub fn spawn(path: impl Into<PathBuf>, log: ForwardingLog, interval: Duration) -> TailerHandle {
        let mut tailer = Self::new(path, log);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = tailer.poll() {
                    tracing::warn!(path = %tailer.path.display(), error = %e, "output tail failed");
                }
            }
        });
        TailerHandle { task }
    }
}

/// Handle to a spawned tailer task; aborts the task when stopped or dropped
pub struct TailerHandle {
    task: JoinHandle<()>,
}

impl TailerHandle {
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for TailerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "tail_tests.rs"]
mod tests;
