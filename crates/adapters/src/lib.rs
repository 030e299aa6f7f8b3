// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Backend executor implementations for the weir executor pool

pub mod local;
pub mod traced;

pub use local::{LocalExecutor, LocalExecutorFactory, LOCAL_KIND};
pub use traced::{TracedExecutor, TracedExecutorFactory};
