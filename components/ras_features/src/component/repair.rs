//! Repair Staging
//!
//! State shared by post package repair and memory sparing: the staged target, the DPA bounds of the device, and
//! the rules for turning a staged target into a Perform Maintenance command.
//!
//! A repair needs a staged DPA. When the device cannot repair without disturbing the data or the accessibility of
//! the media, the DPA must not belong to a committed region, and the region topology stays read locked until the
//! maintenance command has completed. A query only asks the device for resources and keeps the target staged; a
//! repair clears it whatever the outcome.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
extern crate alloc;
use alloc::{sync::Arc, vec::Vec};

use bitfield_struct::bitfield;
use scroll::{Pread, LE};
use spin::Mutex;

use crate::component::device::FeatureContext;
use crate::error::{RasError, Result};
use crate::region::RegionTopology;
use crate::service::repair::RepairTarget;

/// Size of the maintenance attribute header that starts every repair Feature record.
pub(crate) const REPAIR_HEADER_SIZE: usize = 16;

/// Largest value of the 24 bit row and nibble mask fields.
pub(crate) const MAX_U24: u32 = 0xFF_FFFF;

/// Restriction flags of a repair Feature record.
#[bitfield(u16)]
pub(crate) struct RepairRestrictions {
    /// The media is not accessible while the operation runs.
    pub media_not_accessible: bool,
    __reserved0: bool,
    /// The data of the repaired range is lost.
    pub data_not_retained: bool,
    /// Hard sparing is supported.
    pub hard_sparing: bool,
    /// Soft sparing is supported.
    pub soft_sparing: bool,
    #[bits(11)]
    __reserved1: u16,
}

impl RepairRestrictions {
    /// Returns whether the operation may run on memory that is in use.
    pub fn safe_when_in_use(&self) -> bool {
        !self.media_not_accessible() && !self.data_not_retained()
    }
}

/// Checks that a coordinate fits its field.
pub(crate) fn check_field(what: &'static str, value: u32, max: u32) -> Result<u32> {
    if value > max {
        return Err(RasError::OutOfRange { what, value: value as u64, min: 0, max: max as u64 });
    }
    Ok(value)
}

/// Encodes the low 24 bits of `value` little endian.
pub(crate) fn u24_bytes(value: u32) -> [u8; 3] {
    let bytes = value.to_le_bytes();
    [bytes[0], bytes[1], bytes[2]]
}

/// Staged target and maintenance dispatch of one repair Feature.
pub(crate) struct RepairCore {
    context: FeatureContext,
    topology: Arc<RegionTopology>,
    target: Mutex<RepairTarget>,
}

impl RepairCore {
    pub fn new(context: FeatureContext, topology: Arc<RegionTopology>) -> Self {
        Self { context, topology, target: Mutex::new(RepairTarget::default()) }
    }

    pub fn context(&self) -> &FeatureContext {
        &self.context
    }

    /// Reads the restriction flags found at `offset` of the current record.
    pub fn restrictions(&self, offset: usize) -> Result<RepairRestrictions> {
        let record = self.context.read_current()?;
        Ok(RepairRestrictions::from_bits(record.pread_with::<u16>(offset, LE)?))
    }

    /// Reads the current record and returns the byte at `offset`.
    pub fn record_byte(&self, offset: usize) -> Result<u8> {
        let record = self.context.read_current()?;
        Ok(record.pread_with::<u8>(offset, LE)?)
    }

    pub fn target(&self) -> RepairTarget {
        *self.target.lock()
    }

    pub fn stage(&self, update: impl FnOnce(&mut RepairTarget)) {
        update(&mut self.target.lock());
    }

    pub fn min_dpa(&self) -> u64 {
        0
    }

    pub fn max_dpa(&self) -> u64 {
        self.context.device().dpa_size().saturating_sub(1)
    }

    pub fn set_dpa(&self, dpa: u64) -> Result<()> {
        let (min, max) = (self.min_dpa(), self.max_dpa());
        if self.context.device().dpa_size() == 0 || dpa > max {
            return Err(RasError::OutOfRange { what: "DPA", value: dpa, min, max });
        }
        self.stage(|target| target.dpa = Some(dpa));
        Ok(())
    }

    /// Sends a query or a repair for the staged target.
    ///
    /// `encode` builds the maintenance payload from the staged target. When `safe_when_in_use` is false a repair
    /// is refused for a DPA mapped into a region.
    pub fn execute(
        &self,
        query: bool,
        safe_when_in_use: bool,
        class: u8,
        subclass: u8,
        encode: impl FnOnce(&RepairTarget, u64) -> Result<Vec<u8>>,
    ) -> Result<()> {
        let staged = {
            let mut target = self.target.lock();
            let staged = *target;
            if !query {
                *target = RepairTarget::default();
            }
            staged
        };

        let device = self.context.device().id();
        let Some(dpa) = staged.dpa else {
            log::warn!(target: "ras_feat", "Device {}: repair requested without a target DPA", device);
            return Err(RasError::NoTarget);
        };

        let payload = encode(&staged, dpa)?;
        let send = || self.context.perform_maintenance(class, subclass, &payload);
        if query || safe_when_in_use {
            send()?;
        } else {
            self.topology.with_unmapped(device, dpa, send)?;
        }

        log::info!(
            target: "ras_feat",
            "Device {}: {} {:#x}/{:#x} at DPA {:#x}",
            device,
            if query { "queried" } else { "repaired" },
            class,
            subclass,
            dpa
        );
        Ok(())
    }
}
