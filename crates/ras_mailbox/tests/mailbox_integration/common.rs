//! Common Test Infrastructure for Mailbox Integration Tests
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0

pub mod simulated_device;

pub use simulated_device::*;

/// Installs a test logger once per process.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
