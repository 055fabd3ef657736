//! Error Check Scrub Operations
//!
//! Error check scrub (ECS) runs inside the DRAM of every media FRU of a device. All operations address one FRU by
//! index.
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
    /// Operations an ECS instance provides.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct EcsOperations: u32 {
        const GET_LOG_ENTRY_TYPE = 1 << 0;
        const SET_LOG_ENTRY_TYPE = 1 << 1;
        const GET_MODE = 1 << 2;
        const SET_MODE = 1 << 3;
        const RESET = 1 << 4;
        const GET_THRESHOLD = 1 << 5;
        const SET_THRESHOLD = 1 << 6;
    }
}

/// Granularity at which ECS reports errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum EcsLogEntryType {
    PerDram = 0,
    PerMemoryMedia = 1,
}

impl TryFrom<u32> for EcsLogEntryType {
    type Error = RasError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(EcsLogEntryType::PerDram),
            1 => Ok(EcsLogEntryType::PerMemoryMedia),
            _ => Err(RasError::InvalidValue { what: "ECS log entry type", value: value as u64 }),
        }
    }
}

/// What the ECS error counter counts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum EcsCountMode {
    Rows = 0,
    Codewords = 1,
}

impl TryFrom<u32> for EcsCountMode {
    type Error = RasError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(EcsCountMode::Rows),
            1 => Ok(EcsCountMode::Codewords),
            _ => Err(RasError::InvalidValue { what: "ECS count mode", value: value as u64 }),
        }
    }
}

/// Error check scrub control.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait EcsOps: Send + Sync {
    /// Returns the operations this instance provides.
    fn operations(&self) -> EcsOperations;

    /// Returns the number of media FRUs.
    fn fru_count(&self) -> usize;

    fn log_entry_type(&self, _fru: usize) -> Result<EcsLogEntryType> {
        Err(RasError::NotSupported)
    }

    /// Sets the log entry type from its raw value.
    fn set_log_entry_type(&self, _fru: usize, _value: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }

    fn log_entry_type_per_dram(&self, fru: usize) -> Result<bool> {
        Ok(self.log_entry_type(fru)? == EcsLogEntryType::PerDram)
    }

    fn log_entry_type_per_memory_media(&self, fru: usize) -> Result<bool> {
        Ok(self.log_entry_type(fru)? == EcsLogEntryType::PerMemoryMedia)
    }

    fn mode(&self, _fru: usize) -> Result<EcsCountMode> {
        Err(RasError::NotSupported)
    }

    /// Sets the count mode from its raw value.
    fn set_mode(&self, _fru: usize, _value: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }

    fn mode_counts_rows(&self, fru: usize) -> Result<bool> {
        Ok(self.mode(fru)? == EcsCountMode::Rows)
    }

    fn mode_counts_codewords(&self, fru: usize) -> Result<bool> {
        Ok(self.mode(fru)? == EcsCountMode::Codewords)
    }

    /// Resets the error counter of a FRU. Only the value 1 is accepted.
    fn reset(&self, _fru: usize, _value: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }

    /// Returns the error count threshold.
    fn threshold(&self, _fru: usize) -> Result<u32> {
        Err(RasError::NotSupported)
    }

    fn set_threshold(&self, _fru: usize, _threshold: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }
}
