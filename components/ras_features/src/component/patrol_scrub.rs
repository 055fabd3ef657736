//! CXL Patrol Scrub
//!
//! Patrol scrub control through the Patrol Scrub Feature of a memory device. A context either drives a single
//! device or every interleave target of a region. Region reads report the most restrictive values of the targets,
//! region writes are validated against all targets before any of them is written.
//!
//! The device record stores the scrub cycle in hours; the operations use seconds.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
extern crate alloc;
use alloc::vec::Vec;

use bitfield_struct::bitfield;
use scroll::{Pread, Pwrite, LE};

use crate::component::device::FeatureContext;
use crate::error::{RasError, Result};
use crate::service::scrub::{ScrubOperations, ScrubOps};
use crate::service::HOUR_IN_SECS;

/// Longest scrub cycle the record can express, in hours.
const MAX_CYCLE_HOURS: u8 = u8::MAX;

#[bitfield(u8)]
struct ScrubCapabilities {
    /// The scrub cycle and enable flag can be changed.
    changeable: bool,
    /// The device reports the scrub cycle in real time.
    realtime_report: bool,
    #[bits(6)]
    __reserved: u8,
}

#[bitfield(u16)]
struct ScrubCycle {
    current_hours: u8,
    min_hours: u8,
}

#[bitfield(u8)]
struct ScrubFlags {
    enabled: bool,
    #[bits(7)]
    __reserved: u8,
}

/// Current attributes of the Patrol Scrub Feature.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pread, Pwrite)]
struct PatrolScrubReadRecord {
    capabilities: u8,
    cycle: u16,
    flags: u8,
}

/// Attributes written to the Patrol Scrub Feature.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pread, Pwrite)]
struct PatrolScrubWriteRecord {
    cycle_hours: u8,
    flags: u8,
}

impl PatrolScrubWriteRecord {
    const SIZE: usize = 2;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct ScrubState {
    changeable: bool,
    enabled: bool,
    current_hours: u8,
    min_hours: u8,
}

fn read_state(context: &FeatureContext) -> Result<ScrubState> {
    let record: PatrolScrubReadRecord = context.read_current()?.pread_with(0, LE)?;
    let cycle = ScrubCycle::from_bits(record.cycle);
    Ok(ScrubState {
        changeable: ScrubCapabilities::from_bits(record.capabilities).changeable(),
        enabled: ScrubFlags::from_bits(record.flags).enabled(),
        current_hours: cycle.current_hours(),
        min_hours: cycle.min_hours(),
    })
}

fn write_state(context: &FeatureContext, cycle_hours: u8, enabled: bool) -> Result<()> {
    let record = PatrolScrubWriteRecord { cycle_hours, flags: ScrubFlags::new().with_enabled(enabled).into_bits() };
    let mut buffer = [0u8; PatrolScrubWriteRecord::SIZE];
    buffer.pwrite_with(record, 0, LE)?;
    context.write(&buffer)
}

/// Patrol scrub of a memory device or of a region.
pub struct CxlPatrolScrub {
    targets: Vec<FeatureContext>,
    region: Option<u32>,
}

impl CxlPatrolScrub {
    /// Creates the scrub context of a single device.
    pub fn new(context: FeatureContext) -> Self {
        Self { targets: alloc::vec![context], region: None }
    }

    /// Creates the scrub context of a region from the Patrol Scrub Feature of each of its targets.
    pub fn for_region(region: u32, targets: Vec<FeatureContext>) -> Result<Self> {
        if targets.is_empty() {
            log::error!(target: "ras_feat", "Region {}: no scrub capable targets", region);
            return Err(RasError::InvalidArgument);
        }
        Ok(Self { targets, region: Some(region) })
    }

    /// Returns the region the context scrubs, if it is region scoped.
    pub fn region(&self) -> Option<u32> {
        self.region
    }

    pub fn targets(&self) -> &[FeatureContext] {
        &self.targets
    }

    fn read_all(&self) -> Result<Vec<ScrubState>> {
        self.targets.iter().map(read_state).collect()
    }

    /// Reads every target and fails if any of them cannot be changed.
    fn read_changeable(&self) -> Result<Vec<ScrubState>> {
        let states = self.read_all()?;
        if let Some((context, _)) = self.targets.iter().zip(&states).find(|(_, state)| !state.changeable) {
            log::warn!(target: "ras_feat", "Device {}: patrol scrub is not changeable", context.device().id());
            return Err(RasError::NotSupported);
        }
        Ok(states)
    }

    fn min_hours(states: &[ScrubState]) -> u8 {
        states.iter().map(|state| state.min_hours).max().unwrap_or(0)
    }
}

impl ScrubOps for CxlPatrolScrub {
    fn operations(&self) -> ScrubOperations {
        ScrubOperations::GET_ENABLED_BG
            | ScrubOperations::SET_ENABLED_BG
            | ScrubOperations::MIN_CYCLE
            | ScrubOperations::MAX_CYCLE
            | ScrubOperations::GET_CYCLE_DURATION
            | ScrubOperations::SET_CYCLE_DURATION
    }

    fn get_enabled_bg(&self) -> Result<bool> {
        Ok(self.read_all()?.iter().all(|state| state.enabled))
    }

    fn set_enabled_bg(&self, enable: bool) -> Result<()> {
        let states = self.read_changeable()?;
        for (context, state) in self.targets.iter().zip(&states) {
            write_state(context, state.current_hours, enable)?;
        }
        log::info!(
            target: "ras_feat",
            "Patrol scrub {} on {} device(s)",
            if enable { "enabled" } else { "disabled" },
            self.targets.len()
        );
        Ok(())
    }

    fn min_cycle(&self) -> Result<u32> {
        Ok(Self::min_hours(&self.read_all()?) as u32 * HOUR_IN_SECS)
    }

    fn max_cycle(&self) -> Result<u32> {
        Ok(MAX_CYCLE_HOURS as u32 * HOUR_IN_SECS)
    }

    /// Returns the longest current cycle of the targets.
    fn cycle_duration(&self) -> Result<u32> {
        let hours = self.read_all()?.iter().map(|state| state.current_hours).max().unwrap_or(0);
        Ok(hours as u32 * HOUR_IN_SECS)
    }

    fn set_cycle_duration(&self, seconds: u32) -> Result<()> {
        let states = self.read_changeable()?;
        let min = Self::min_hours(&states);
        let hours = seconds / HOUR_IN_SECS;
        if hours < min as u32 || hours > MAX_CYCLE_HOURS as u32 {
            log::warn!(
                target: "ras_feat",
                "Scrub cycle {}s outside of [{}h, {}h]",
                seconds,
                min,
                MAX_CYCLE_HOURS
            );
            return Err(RasError::OutOfRange {
                what: "scrub cycle",
                value: seconds as u64,
                min: min as u64 * HOUR_IN_SECS as u64,
                max: MAX_CYCLE_HOURS as u64 * HOUR_IN_SECS as u64,
            });
        }

        for (context, state) in self.targets.iter().zip(&states) {
            write_state(context, hours as u8, state.enabled)?;
        }
        log::info!(target: "ras_feat", "Patrol scrub cycle set to {}h on {} device(s)", hours, self.targets.len());
        Ok(())
    }
}
