//! RAS2 Platform Patrol Scrub
//!
//! Patrol scrub of a memory node driven by platform firmware through a RAS2 PCC subspace. The scrubber runs either
//! in the background over the whole node, or on demand over one address range.
//!
//! The platform only reports the scrubber state in response to a command, so the context keeps a cache of the last
//! reported state: the requested range, the scrub rates, and whether this context started a background scrub. An
//! on demand scrub starts when the base address is written, using the size written before it and the cycle
//! duration held in the cache.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use ras_pcc::patrol_scrub::{PatrolScrubBlock, PatrolScrubCommand, PatrolScrubStatus, ScrubParamsIn};
use ras_pcc::registry::PccSubspaceHandle;
use ras_pcc::shared_memory::{layout, PCC_CMD_EXEC};
use spin::Mutex;

use crate::error::{RasError, Result};
use crate::service::scrub::{ScrubOperations, ScrubOps};
use crate::service::HOUR_IN_SECS;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
struct ScrubCache {
    background: bool,
    base: u64,
    size: u64,
    min_hours: u8,
    max_hours: u8,
    cycle_hours: u8,
}

impl ScrubCache {
    /// Takes the rates from a platform report, and the range too unless a background scrub owns it.
    fn update(&mut self, status: &PatrolScrubStatus) {
        self.min_hours = status.min_cycle_hours;
        self.max_hours = status.max_cycle_hours;
        self.cycle_hours = status.current_cycle_hours;
        if !self.background {
            self.base = status.actual_base;
            self.size = status.actual_size;
        }
    }
}

/// Patrol scrub of a memory node behind a RAS2 PCC subspace.
pub struct Ras2PatrolScrub {
    subspace: PccSubspaceHandle,
    node: u32,
    cache: Mutex<ScrubCache>,
}

impl Ras2PatrolScrub {
    /// Creates the context and reads the initial scrubber state.
    ///
    /// Fails with [`RasError::NotSupported`] if the platform does not advertise the patrol scrubber on the subspace.
    pub fn new(subspace: PccSubspaceHandle, node: u32) -> Result<Self> {
        let supported = subspace.inspect(|memory| {
            let supported = PatrolScrubBlock::new(memory).is_supported()?;
            memory.write(layout::SET_CAPABILITIES, &[0u8; layout::SET_CAPABILITIES_SIZE])?;
            Ok(supported)
        })?;
        if !supported {
            log::info!(target: "ras_feat", "Subspace {}: no patrol scrubber", subspace.id());
            return Err(RasError::NotSupported);
        }

        let scrub = Self { subspace, node, cache: Mutex::new(ScrubCache::default()) };
        {
            let mut cache = scrub.cache.lock();
            let status = scrub.get_parameters(&cache)?;
            cache.update(&status);
        }
        log::info!(target: "ras_feat", "Node {}: RAS2 patrol scrub on subspace {}", node, scrub.subspace.id());
        Ok(scrub)
    }

    /// Returns the memory node the subspace serves.
    pub fn node(&self) -> u32 {
        self.node
    }

    pub fn subspace_id(&self) -> u32 {
        self.subspace.id()
    }

    /// Issues a patrol scrub command and returns the reported state.
    fn command(
        &self,
        command: PatrolScrubCommand,
        range: (u64, u64),
        params: impl FnOnce(ScrubParamsIn) -> ScrubParamsIn,
    ) -> Result<PatrolScrubStatus> {
        let status = self.subspace.exchange(
            PCC_CMD_EXEC,
            |memory| {
                let block = PatrolScrubBlock::new(memory);
                block.select()?;
                block.set_command(command)?;
                block.set_requested_range(range.0, range.1)?;
                block.set_params_in(params(block.params_in()?))
            },
            |memory| PatrolScrubBlock::new(memory).status(),
        );
        status.map_err(|err| {
            log::error!(target: "ras_feat", "Node {}: patrol scrub {:?} failed: {}", self.node, command, err);
            RasError::from(err)
        })
    }

    fn get_parameters(&self, cache: &ScrubCache) -> Result<PatrolScrubStatus> {
        self.command(PatrolScrubCommand::GetParameters, (cache.base, cache.size), |params| params)
    }

    fn is_running(&self, cache: &ScrubCache) -> Result<bool> {
        Ok(self.get_parameters(cache)?.running)
    }

    fn refresh(&self, cache: &mut ScrubCache) -> Result<()> {
        let status = self.get_parameters(cache)?;
        cache.update(&status);
        Ok(())
    }

    /// Reads a range field, refreshing the cache unless a background scrub is running.
    fn read_range(&self, field: impl FnOnce(&ScrubCache) -> u64) -> Result<u64> {
        let mut cache = self.cache.lock();
        if cache.background {
            return Err(RasError::Busy);
        }
        self.refresh(&mut cache)?;
        Ok(field(&cache))
    }
}

impl ScrubOps for Ras2PatrolScrub {
    fn operations(&self) -> ScrubOperations {
        ScrubOperations::all()
    }

    fn read_addr(&self) -> Result<u64> {
        self.read_range(|cache| cache.base)
    }

    fn read_size(&self) -> Result<u64> {
        self.read_range(|cache| cache.size)
    }

    /// Starts an on demand scrub of `size` bytes at `base`, using the size written before.
    fn write_addr(&self, base: u64) -> Result<()> {
        let mut cache = self.cache.lock();
        if cache.background {
            return Err(RasError::Busy);
        }
        if base == 0 || cache.size == 0 {
            log::warn!(target: "ras_feat", "Node {}: invalid scrub range {:#x}+{:#x}", self.node, base, cache.size);
            return Err(RasError::InvalidValue { what: "scrub base", value: base });
        }
        if self.is_running(&cache)? {
            return Err(RasError::Busy);
        }

        let hours = cache.cycle_hours;
        let status = self.command(PatrolScrubCommand::Start, (base, cache.size), |params| {
            params.with_cycle_hours(hours).with_enable_background(false)
        })?;
        cache.update(&status);
        log::info!(target: "ras_feat", "Node {}: scrubbing {:#x}+{:#x} every {}h", self.node, base, cache.size, hours);
        Ok(())
    }

    fn write_size(&self, size: u64) -> Result<()> {
        let mut cache = self.cache.lock();
        if size == 0 {
            return Err(RasError::InvalidValue { what: "scrub size", value: size });
        }
        if self.is_running(&cache)? {
            return Err(RasError::Busy);
        }
        cache.size = size;
        Ok(())
    }

    fn get_enabled_bg(&self) -> Result<bool> {
        Ok(self.cache.lock().background)
    }

    fn set_enabled_bg(&self, enable: bool) -> Result<()> {
        let mut cache = self.cache.lock();
        let hours = cache.cycle_hours;
        if enable {
            if cache.background || self.is_running(&cache)? {
                return Err(RasError::Busy);
            }
            self.command(PatrolScrubCommand::Start, (0, 0), |params| {
                params.with_cycle_hours(hours).with_enable_background(true)
            })?;
            cache.background = true;
            self.refresh(&mut cache)?;
        } else {
            if !cache.background {
                return Err(RasError::PermissionDenied);
            }
            self.command(PatrolScrubCommand::Stop, (cache.base, cache.size), |params| {
                params.with_enable_background(false)
            })?;
            self.refresh(&mut cache)?;
            cache.background = false;
        }
        log::info!(
            target: "ras_feat",
            "Node {}: background scrub {}",
            self.node,
            if enable { "started" } else { "stopped" }
        );
        Ok(())
    }

    fn min_cycle(&self) -> Result<u32> {
        Ok(self.cache.lock().min_hours as u32 * HOUR_IN_SECS)
    }

    fn max_cycle(&self) -> Result<u32> {
        Ok(self.cache.lock().max_hours as u32 * HOUR_IN_SECS)
    }

    fn cycle_duration(&self) -> Result<u32> {
        Ok(self.cache.lock().cycle_hours as u32 * HOUR_IN_SECS)
    }

    /// Sets the cycle the next scrub started by this context uses.
    fn set_cycle_duration(&self, seconds: u32) -> Result<()> {
        let mut cache = self.cache.lock();
        if self.is_running(&cache)? {
            return Err(RasError::Busy);
        }
        let hours = seconds / HOUR_IN_SECS;
        if hours < cache.min_hours as u32 || hours > cache.max_hours as u32 {
            return Err(RasError::OutOfRange {
                what: "scrub cycle",
                value: seconds as u64,
                min: cache.min_hours as u64 * HOUR_IN_SECS as u64,
                max: cache.max_hours as u64 * HOUR_IN_SECS as u64,
            });
        }
        cache.cycle_hours = hours as u8;
        Ok(())
    }
}
