//! Memory Repair Operations
//!
//! Post package repair and memory sparing share one interface. A caller stages the target (the DPA and, where the
//! device needs them, the DRAM coordinates), optionally queries the device for repair resources, and then triggers
//! the repair. A query leaves the staged target in place; every repair attempt clears it, successful or not.
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
    /// Operations a repair instance provides.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct RepairOperations: u32 {
        const REPAIR_TYPE = 1 << 0;
        const GET_PERSIST_MODE = 1 << 1;
        const SET_PERSIST_MODE = 1 << 2;
        const DPA_SUPPORT = 1 << 3;
        const SAFE_WHEN_IN_USE = 1 << 4;
        const DPA_BOUNDS = 1 << 5;
        const DPA = 1 << 6;
        const NIBBLE_MASK = 1 << 7;
        const BANK_GROUP = 1 << 8;
        const BANK = 1 << 9;
        const RANK = 1 << 10;
        const ROW = 1 << 11;
        const COLUMN = 1 << 12;
        const CHANNEL = 1 << 13;
        const SUB_CHANNEL = 1 << 14;
        const QUERY = 1 << 15;
        const REPAIR = 1 << 16;
    }
}

/// Kind of repair an instance performs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RepairType {
    PostPackageRepair,
    CachelineSparing,
    RowSparing,
    BankSparing,
    RankSparing,
}

/// Whether a repair survives a power cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PersistMode {
    /// Temporary repair, lost on power cycle.
    Soft = 0,
    /// Permanent repair.
    Hard = 1,
}

impl TryFrom<u32> for PersistMode {
    type Error = RasError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(PersistMode::Soft),
            1 => Ok(PersistMode::Hard),
            _ => Err(RasError::InvalidValue { what: "persist mode", value: value as u64 }),
        }
    }
}

/// The staged repair target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RepairTarget {
    /// Device physical address. A repair needs one.
    pub dpa: Option<u64>,
    /// Nibbles of the x4 DRAM devices to repair, 24 bits. Zero selects all.
    pub nibble_mask: u32,
    pub bank_group: u8,
    pub bank: u8,
    pub rank: u8,
    /// Row address, 24 bits.
    pub row: u32,
    pub column: u16,
    pub channel: u8,
    pub sub_channel: u8,
}

/// Memory repair control.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait MemRepairOps: Send + Sync {
    /// Returns the operations this instance provides.
    fn operations(&self) -> RepairOperations;

    fn repair_type(&self) -> RepairType;

    fn persist_mode(&self) -> Result<PersistMode> {
        Err(RasError::NotSupported)
    }

    /// Sets the persist mode from its raw value.
    fn set_persist_mode(&self, _value: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }

    /// Returns whether the device accepts a DPA to identify the repair target.
    fn dpa_support(&self) -> Result<bool> {
        Err(RasError::NotSupported)
    }

    /// Returns whether the media stays accessible and keeps its data during the repair.
    fn safe_when_in_use(&self) -> Result<bool> {
        Err(RasError::NotSupported)
    }

    fn min_dpa(&self) -> Result<u64> {
        Err(RasError::NotSupported)
    }

    fn max_dpa(&self) -> Result<u64> {
        Err(RasError::NotSupported)
    }

    /// Returns a snapshot of the staged target.
    fn target(&self) -> RepairTarget;

    fn set_dpa(&self, _dpa: u64) -> Result<()> {
        Err(RasError::NotSupported)
    }

    fn set_nibble_mask(&self, _mask: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }

    fn set_bank_group(&self, _bank_group: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }

    fn set_bank(&self, _bank: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }

    fn set_rank(&self, _rank: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }

    fn set_row(&self, _row: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }

    fn set_column(&self, _column: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }

    fn set_channel(&self, _channel: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }

    fn set_sub_channel(&self, _sub_channel: u32) -> Result<()> {
        Err(RasError::NotSupported)
    }

    /// Asks the device whether it has the resources to repair the staged target.
    fn query(&self) -> Result<()> {
        Err(RasError::NotSupported)
    }

    /// Repairs the staged target.
    fn repair(&self) -> Result<()> {
        Err(RasError::NotSupported)
    }
}
