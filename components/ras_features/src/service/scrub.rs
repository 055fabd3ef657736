//! Scrub Operations
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use bitflags::bitflags;

use crate::error::{RasError, Result};

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

bitflags! {
    /// Operations a scrub instance provides.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct ScrubOperations: u32 {
        const READ_ADDR = 1 << 0;
        const READ_SIZE = 1 << 1;
        const WRITE_ADDR = 1 << 2;
        const WRITE_SIZE = 1 << 3;
        const GET_ENABLED_BG = 1 << 4;
        const SET_ENABLED_BG = 1 << 5;
        const MIN_CYCLE = 1 << 6;
        const MAX_CYCLE = 1 << 7;
        const GET_CYCLE_DURATION = 1 << 8;
        const SET_CYCLE_DURATION = 1 << 9;
    }
}

/// Patrol and on demand scrub control. Cycle durations are in seconds.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait ScrubOps: Send + Sync {
    /// Returns the operations this instance provides.
    fn operations(&self) -> ScrubOperations;

    /// Returns the base address of the range being scrubbed on demand.
    fn read_addr(&self) -> Result<u64> {
        Err(RasError::NotSupported)
    }

    /// Returns the size of the range being scrubbed on demand.
    fn read_size(&self) -> Result<u64> {
        Err(RasError::NotSupported)
    }

    /// Starts an on demand scrub of the range at `base` with the size set by [`ScrubOps::write_size`].
    fn write_addr(&self, _base: u64) -> Result<()> {
        Err(RasError::NotSupported)
    }

    /// Sets the size of the next on demand scrub.
    fn write_size(&self, _size: u64) -> Result<()> {
        Err(RasError::NotSupported)
    }

    /// Returns whether background scrubbing is enabled.
    fn get_enabled_bg(&self) -> Result<bool> {
        Err(RasError::NotSupported)
    }

    /// Enables or disables background scrubbing.
    fn set_enabled_bg(&self, _enable: bool) -> Result<()> {
        Err(RasError::NotSupported)
    }

    fn min_cycle(&self) -> Result<u32> {
        Err(RasError::NotSupported)
    }

    fn max_cycle(&self) -> Result<u32> {
        Err(RasError::NotSupported)
    }

    fn cycle_duration(&self) -> Result<u32> {
        Err(RasError::NotSupported)
    }

    fn set_cycle_duration(&self, _seconds: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }
}
