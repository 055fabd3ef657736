//! RAS2 Patrol Scrub Parameter Block
//!
//! The patrol scrub parameter block follows the common header in the shared memory of a subspace. The OS selects a
//! scrub command and its inputs, the platform reports the scrubber state and the supported scrub rates.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use bitfield_struct::bitfield;

use crate::error::Result;
use crate::shared_memory::{layout, PccSharedMemory};

/// RAS2 feature bit of the patrol scrubber in the features and set capabilities bitmaps.
pub const RAS2_FEATURE_PATROL_SCRUB: u8 = 1 << 0;

/// Byte offsets of the patrol scrub parameter block fields.
pub mod offsets {
    use crate::shared_memory::layout::COMMON_HEADER_SIZE;

    pub const BLOCK: usize = COMMON_HEADER_SIZE;
    pub const TYPE: usize = BLOCK;
    pub const VERSION: usize = BLOCK + 2;
    pub const LENGTH: usize = BLOCK + 4;
    pub const COMMAND: usize = BLOCK + 6;
    /// Requested base and size, two `u64`.
    pub const REQUESTED_RANGE: usize = BLOCK + 8;
    /// Base and size being scrubbed, two `u64`.
    pub const ACTUAL_RANGE: usize = BLOCK + 24;
    pub const FLAGS: usize = BLOCK + 40;
    pub const PARAMS_OUT: usize = BLOCK + 44;
    pub const PARAMS_IN: usize = BLOCK + 48;
    /// Size of the parameter block.
    pub const SIZE: usize = 52;
}

/// Scrubber running flag of the block flags field.
pub const PATROL_SCRUB_RUNNING: u32 = 1 << 0;

/// Patrol scrub commands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum PatrolScrubCommand {
    /// Reports the scrubber state and rates.
    GetParameters = 1,
    /// Starts scrubbing with the written parameters.
    Start = 2,
    /// Stops scrubbing.
    Stop = 3,
}

/// Scrub rates reported by the platform, in hours per scrub cycle.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct ScrubParamsOut {
    pub current_cycle_hours: u8,
    pub min_cycle_hours: u8,
    pub max_cycle_hours: u8,
    #[bits(8)]
    __reserved: u8,
}

/// Scrub parameters written by the OS.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct ScrubParamsIn {
    /// Scrub the whole memory of the node in the background.
    pub enable_background: bool,
    #[bits(7)]
    __reserved0: u8,
    /// Requested scrub cycle in hours.
    pub cycle_hours: u8,
    #[bits(16)]
    __reserved1: u16,
}

/// Scrubber state decoded from the parameter block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct PatrolScrubStatus {
    pub running: bool,
    pub actual_base: u64,
    pub actual_size: u64,
    pub current_cycle_hours: u8,
    pub min_cycle_hours: u8,
    pub max_cycle_hours: u8,
}

/// Accessor for the patrol scrub parameter block of a subspace.
///
/// Only meant to be used from the `prepare` and `complete` stages of a subspace exchange, where the subspace lock is
/// held.
pub struct PatrolScrubBlock<'a>(&'a dyn PccSharedMemory);

impl<'a> PatrolScrubBlock<'a> {
    pub fn new(memory: &'a dyn PccSharedMemory) -> Self {
        Self(memory)
    }

    /// Returns whether the platform advertises the patrol scrubber.
    pub fn is_supported(&self) -> Result<bool> {
        Ok(self.0.read_u8(layout::FEATURES)? & RAS2_FEATURE_PATROL_SCRUB != 0)
    }

    /// Selects the patrol scrubber as the feature the next command applies to.
    pub fn select(&self) -> Result<()> {
        self.0.write_u8(layout::SET_CAPABILITIES, RAS2_FEATURE_PATROL_SCRUB)
    }

    pub fn set_command(&self, command: PatrolScrubCommand) -> Result<()> {
        self.0.write_u16(offsets::COMMAND, command as u16)
    }

    pub fn set_requested_range(&self, base: u64, size: u64) -> Result<()> {
        self.0.write_u64(offsets::REQUESTED_RANGE, base)?;
        self.0.write_u64(offsets::REQUESTED_RANGE + 8, size)
    }

    pub fn params_in(&self) -> Result<ScrubParamsIn> {
        Ok(ScrubParamsIn::from_bits(self.0.read_u32(offsets::PARAMS_IN)?))
    }

    pub fn set_params_in(&self, params: ScrubParamsIn) -> Result<()> {
        self.0.write_u32(offsets::PARAMS_IN, params.into_bits())
    }

    /// Decodes the scrubber state reported by the platform.
    pub fn status(&self) -> Result<PatrolScrubStatus> {
        let params = ScrubParamsOut::from_bits(self.0.read_u32(offsets::PARAMS_OUT)?);
        Ok(PatrolScrubStatus {
            running: self.0.read_u32(offsets::FLAGS)? & PATROL_SCRUB_RUNNING != 0,
            actual_base: self.0.read_u64(offsets::ACTUAL_RANGE)?,
            actual_size: self.0.read_u64(offsets::ACTUAL_RANGE + 8)?,
            current_cycle_hours: params.current_cycle_hours(),
            min_cycle_hours: params.min_cycle_hours(),
            max_cycle_hours: params.max_cycle_hours(),
        })
    }
}
