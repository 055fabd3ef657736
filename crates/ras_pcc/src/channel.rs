//! PCC Channel Provider
//!
//! The platform side of a PCC subspace: the doorbell used to signal a new command, and the provider that hands out
//! subspaces by identifier.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
extern crate alloc;
use alloc::boxed::Box;

use crate::error::Result;
use crate::shared_memory::PccSharedMemory;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Doorbell of a PCC subspace.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait PccDoorbell: Send + Sync {
    /// Signals the platform that `command` is ready in the shared memory region.
    fn ring(&self, command: u16) -> Result<()>;

    /// Reports the outcome of the last command so the channel can accept the next one.
    fn tx_done(&self, result: Result<()>);
}

/// A subspace as handed out by the platform.
pub struct PccChannelInfo {
    /// Shared memory region of the subspace.
    pub shared_memory: Box<dyn PccSharedMemory>,
    /// Doorbell of the subspace.
    pub doorbell: Box<dyn PccDoorbell>,
    /// Nominal command latency in microseconds.
    pub latency_us: u32,
    /// Minimum request turnaround time in microseconds. Zero means no limit.
    pub min_turnaround_us: u32,
    /// Maximum periodic access rate in commands per minute. Zero means no limit.
    pub max_access_rate: u32,
}

/// Trait implemented by the platform to hand out PCC subspaces.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait PccProvider: Send + Sync {
    /// Requests the subspace with the given identifier.
    fn request_channel(&self, subspace_id: u32) -> Result<PccChannelInfo>;

    /// Returns a subspace previously obtained with [`PccProvider::request_channel`].
    fn free_channel(&self, subspace_id: u32);
}
