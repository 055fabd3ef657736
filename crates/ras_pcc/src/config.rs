//! PCC Transport Configuration
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use core::time::Duration;

/// Tunables shared by every subspace of a registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PccConfig {
    /// Multiplier applied to the nominal subspace latency to obtain the completion deadline. The platform may be
    /// much slower than its nominal latency.
    pub num_retries: u32,
    /// Delay between two reads of the status register while waiting for completion.
    pub poll_interval: Duration,
    /// Length of the window the maximum periodic access rate applies to.
    pub mpar_window: Duration,
}

impl Default for PccConfig {
    fn default() -> Self {
        PccConfig { num_retries: 600, poll_interval: Duration::from_millis(10), mpar_window: Duration::from_secs(60) }
    }
}

impl PccConfig {
    /// Returns the completion deadline for a subspace with the given nominal latency.
    pub fn deadline(&self, latency_us: u32) -> Duration {
        Duration::from_micros(self.num_retries as u64 * latency_us as u64)
    }
}
