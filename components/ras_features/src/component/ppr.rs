//! CXL Post Package Repair
//!
//! Soft and hard PPR through the sPPR and hPPR maintenance Features. Which of the two an instance performs is
//! fixed by the Feature UUID.
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
use ras_mailbox::feature::{HARD_PPR_UUID, SOFT_PPR_UUID};
use scroll::{Pwrite, LE};

use crate::component::device::FeatureContext;
use crate::component::repair::{check_field, u24_bytes, RepairCore, MAX_U24, REPAIR_HEADER_SIZE};
use crate::error::{RasError, Result};
use crate::region::RegionTopology;
use crate::service::repair::{MemRepairOps, PersistMode, RepairOperations, RepairTarget, RepairType};

/// Maintenance operation class of PPR.
pub const PPR_OP_CLASS: u8 = 0x01;

const PPR_FLAGS_OFFSET: usize = REPAIR_HEADER_SIZE;
const PPR_RESTRICTIONS_OFFSET: usize = REPAIR_HEADER_SIZE + 1;

const PPR_PAYLOAD_SIZE: usize = 12;

#[bitfield(u8)]
struct PprCapabilities {
    /// The device accepts a DPA as repair target.
    dpa_support: bool,
    /// The device accepts a nibble mask.
    nibble_support: bool,
    #[bits(6)]
    __reserved: u8,
}

#[bitfield(u8)]
struct PprMaintenanceFlags {
    /// Only report whether resources are available.
    query_resources: bool,
    #[bits(7)]
    __reserved: u8,
}

/// Post package repair of a memory device.
pub struct CxlPpr {
    core: RepairCore,
    mode: PersistMode,
}

impl CxlPpr {
    /// Creates a PPR context from an sPPR or hPPR Feature.
    pub fn new(context: FeatureContext, topology: Arc<RegionTopology>) -> Result<Self> {
        let uuid = context.entry().uuid;
        let mode = if uuid == SOFT_PPR_UUID {
            PersistMode::Soft
        } else if uuid == HARD_PPR_UUID {
            PersistMode::Hard
        } else {
            log::error!(target: "ras_feat", "Feature {} is not a PPR Feature", uuid);
            return Err(RasError::InvalidArgument);
        };
        Ok(Self { core: RepairCore::new(context, topology), mode })
    }

    fn capabilities(&self) -> Result<PprCapabilities> {
        Ok(PprCapabilities::from_bits(self.core.record_byte(PPR_FLAGS_OFFSET)?))
    }

    fn encode(target: &RepairTarget, dpa: u64, query: bool) -> Result<Vec<u8>> {
        let mut payload = alloc::vec![0u8; PPR_PAYLOAD_SIZE];
        let mut offset = 0;
        payload.gwrite_with(PprMaintenanceFlags::new().with_query_resources(query).into_bits(), &mut offset, LE)?;
        payload.gwrite_with(dpa, &mut offset, LE)?;
        for byte in u24_bytes(target.nibble_mask) {
            payload.gwrite_with(byte, &mut offset, LE)?;
        }
        Ok(payload)
    }

    fn send(&self, query: bool) -> Result<()> {
        let safe = self.safe_when_in_use()?;
        let subclass = self.mode as u8;
        self.core.execute(query, safe, PPR_OP_CLASS, subclass, |target, dpa| Self::encode(target, dpa, query))
    }
}

impl MemRepairOps for CxlPpr {
    fn operations(&self) -> RepairOperations {
        RepairOperations::REPAIR_TYPE
            | RepairOperations::GET_PERSIST_MODE
            | RepairOperations::DPA_SUPPORT
            | RepairOperations::SAFE_WHEN_IN_USE
            | RepairOperations::DPA_BOUNDS
            | RepairOperations::DPA
            | RepairOperations::NIBBLE_MASK
            | RepairOperations::QUERY
            | RepairOperations::REPAIR
    }

    fn repair_type(&self) -> RepairType {
        RepairType::PostPackageRepair
    }

    fn persist_mode(&self) -> Result<PersistMode> {
        Ok(self.mode)
    }

    fn dpa_support(&self) -> Result<bool> {
        Ok(self.capabilities()?.dpa_support())
    }

    fn safe_when_in_use(&self) -> Result<bool> {
        Ok(self.core.restrictions(PPR_RESTRICTIONS_OFFSET)?.safe_when_in_use())
    }

    fn min_dpa(&self) -> Result<u64> {
        Ok(self.core.min_dpa())
    }

    fn max_dpa(&self) -> Result<u64> {
        Ok(self.core.max_dpa())
    }

    fn target(&self) -> RepairTarget {
        self.core.target()
    }

    fn set_dpa(&self, dpa: u64) -> Result<()> {
        self.core.set_dpa(dpa)
    }

    fn set_nibble_mask(&self, mask: u32) -> Result<()> {
        let mask = check_field("nibble mask", mask, MAX_U24)?;
        self.core.stage(|target| target.nibble_mask = mask);
        Ok(())
    }

    fn query(&self) -> Result<()> {
        self.send(true)
    }

    fn repair(&self) -> Result<()> {
        self.send(false)
    }
}
