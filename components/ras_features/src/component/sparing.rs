//! CXL Memory Sparing
//!
//! Cacheline, row, bank and rank sparing through the memory sparing maintenance Features. The sparing type is fixed
//! by the Feature UUID and decides which DRAM coordinates a repair needs. Soft or hard sparing is selected per
//! instance from the modes the device advertises.
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
use ras_mailbox::feature::{BANK_SPARING_UUID, CACHELINE_SPARING_UUID, RANK_SPARING_UUID, ROW_SPARING_UUID};
use scroll::{Pwrite, LE};
use spin::Mutex;

use crate::component::device::FeatureContext;
use crate::component::repair::{check_field, u24_bytes, RepairCore, RepairRestrictions, MAX_U24, REPAIR_HEADER_SIZE};
use crate::error::{RasError, Result};
use crate::region::RegionTopology;
use crate::service::repair::{MemRepairOps, PersistMode, RepairOperations, RepairTarget, RepairType};

/// Maintenance operation class of memory sparing.
pub const SPARING_OP_CLASS: u8 = 0x02;

/// The restriction flags follow one reserved byte.
const SPARING_RESTRICTIONS_OFFSET: usize = REPAIR_HEADER_SIZE + 1;

const SPARING_PAYLOAD_SIZE: usize = 14;

#[bitfield(u8)]
struct SparingMaintenanceFlags {
    query_resources: bool,
    hard_sparing: bool,
    sub_channel_valid: bool,
    nibble_mask_valid: bool,
    #[bits(4)]
    __reserved: u8,
}

/// Returns the sparing type of a Feature UUID.
pub fn sparing_type(uuid: &uuid::Uuid) -> Option<RepairType> {
    [
        (CACHELINE_SPARING_UUID, RepairType::CachelineSparing),
        (ROW_SPARING_UUID, RepairType::RowSparing),
        (BANK_SPARING_UUID, RepairType::BankSparing),
        (RANK_SPARING_UUID, RepairType::RankSparing),
    ]
    .iter()
    .find(|(candidate, _)| candidate == uuid)
    .map(|(_, kind)| *kind)
}

/// Memory sparing of a memory device.
pub struct CxlSparing {
    core: RepairCore,
    kind: RepairType,
    persist_mode: Mutex<PersistMode>,
}

impl CxlSparing {
    /// Creates a sparing context and selects soft sparing when the device supports it.
    pub fn new(context: FeatureContext, topology: Arc<RegionTopology>) -> Result<Self> {
        let Some(kind) = sparing_type(&context.entry().uuid) else {
            log::error!(target: "ras_feat", "Feature {} is not a sparing Feature", context.entry().uuid);
            return Err(RasError::InvalidArgument);
        };
        let core = RepairCore::new(context, topology);
        let restrictions = core.restrictions(SPARING_RESTRICTIONS_OFFSET)?;
        let mode = if restrictions.soft_sparing() { PersistMode::Soft } else { PersistMode::Hard };
        Ok(Self { core, kind, persist_mode: Mutex::new(mode) })
    }

    fn restrictions(&self) -> Result<RepairRestrictions> {
        self.core.restrictions(SPARING_RESTRICTIONS_OFFSET)
    }

    fn coordinates(&self) -> RepairOperations {
        let rank = RepairOperations::CHANNEL | RepairOperations::RANK | RepairOperations::NIBBLE_MASK;
        let bank = rank | RepairOperations::BANK_GROUP | RepairOperations::BANK;
        let row = bank | RepairOperations::ROW;
        match self.kind {
            RepairType::CachelineSparing => row | RepairOperations::COLUMN | RepairOperations::SUB_CHANNEL,
            RepairType::RowSparing => row,
            RepairType::BankSparing => bank,
            _ => rank,
        }
    }

    /// Stages a coordinate the sparing type uses.
    fn stage(&self, operation: RepairOperations, update: impl FnOnce(&mut RepairTarget)) -> Result<()> {
        if !self.coordinates().contains(operation) {
            return Err(RasError::NotSupported);
        }
        self.core.stage(update);
        Ok(())
    }

    fn encode(&self, target: &RepairTarget, query: bool, hard: bool) -> Result<Vec<u8>> {
        let coordinates = self.coordinates();
        let has = |operation| coordinates.contains(operation);
        let flags = SparingMaintenanceFlags::new()
            .with_query_resources(query)
            .with_hard_sparing(hard)
            .with_sub_channel_valid(has(RepairOperations::SUB_CHANNEL))
            .with_nibble_mask_valid(true);

        let mut payload = alloc::vec![0u8; SPARING_PAYLOAD_SIZE];
        let mut offset = 0;
        payload.gwrite_with(flags.into_bits(), &mut offset, LE)?;
        payload.gwrite_with(target.channel, &mut offset, LE)?;
        payload.gwrite_with(target.rank, &mut offset, LE)?;
        for byte in u24_bytes(target.nibble_mask) {
            payload.gwrite_with(byte, &mut offset, LE)?;
        }
        let (bank_group, bank) =
            if has(RepairOperations::BANK) { (target.bank_group, target.bank) } else { (0, 0) };
        payload.gwrite_with(bank_group, &mut offset, LE)?;
        payload.gwrite_with(bank, &mut offset, LE)?;
        let row = if has(RepairOperations::ROW) { target.row } else { 0 };
        for byte in u24_bytes(row) {
            payload.gwrite_with(byte, &mut offset, LE)?;
        }
        payload.gwrite_with(if has(RepairOperations::COLUMN) { target.column } else { 0 }, &mut offset, LE)?;
        payload.gwrite_with(if has(RepairOperations::SUB_CHANNEL) { target.sub_channel } else { 0 }, &mut offset, LE)?;
        Ok(payload)
    }

    fn send(&self, query: bool) -> Result<()> {
        let safe = self.restrictions()?.safe_when_in_use();
        let hard = *self.persist_mode.lock() == PersistMode::Hard;
        let subclass = match self.kind {
            RepairType::CachelineSparing => 0,
            RepairType::RowSparing => 1,
            RepairType::BankSparing => 2,
            _ => 3,
        };
        self.core.execute(query, safe, SPARING_OP_CLASS, subclass, |target, _| self.encode(target, query, hard))
    }
}

impl MemRepairOps for CxlSparing {
    fn operations(&self) -> RepairOperations {
        RepairOperations::REPAIR_TYPE
            | RepairOperations::GET_PERSIST_MODE
            | RepairOperations::SET_PERSIST_MODE
            | RepairOperations::DPA_SUPPORT
            | RepairOperations::SAFE_WHEN_IN_USE
            | RepairOperations::DPA_BOUNDS
            | RepairOperations::DPA
            | RepairOperations::QUERY
            | RepairOperations::REPAIR
            | self.coordinates()
    }

    fn repair_type(&self) -> RepairType {
        self.kind
    }

    fn persist_mode(&self) -> Result<PersistMode> {
        Ok(*self.persist_mode.lock())
    }

    fn set_persist_mode(&self, value: u32) -> Result<()> {
        let mode = PersistMode::try_from(value)?;
        let restrictions = self.restrictions()?;
        let supported = match mode {
            PersistMode::Soft => restrictions.soft_sparing(),
            PersistMode::Hard => restrictions.hard_sparing(),
        };
        if !supported {
            log::warn!(target: "ras_feat", "Device {}: {:?} sparing not supported", self.core.context().device().id(), mode);
            return Err(RasError::NotSupported);
        }
        *self.persist_mode.lock() = mode;
        Ok(())
    }

    /// Sparing addresses DRAM coordinates. The DPA only locates the target for the in use check.
    fn dpa_support(&self) -> Result<bool> {
        Ok(false)
    }

    fn safe_when_in_use(&self) -> Result<bool> {
        Ok(self.restrictions()?.safe_when_in_use())
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
        self.stage(RepairOperations::NIBBLE_MASK, |target| target.nibble_mask = mask)
    }

    fn set_bank_group(&self, bank_group: u32) -> Result<()> {
        let bank_group = check_field("bank group", bank_group, u8::MAX as u32)? as u8;
        self.stage(RepairOperations::BANK_GROUP, |target| target.bank_group = bank_group)
    }

    fn set_bank(&self, bank: u32) -> Result<()> {
        let bank = check_field("bank", bank, u8::MAX as u32)? as u8;
        self.stage(RepairOperations::BANK, |target| target.bank = bank)
    }

    fn set_rank(&self, rank: u32) -> Result<()> {
        let rank = check_field("rank", rank, u8::MAX as u32)? as u8;
        self.stage(RepairOperations::RANK, |target| target.rank = rank)
    }

    fn set_row(&self, row: u32) -> Result<()> {
        let row = check_field("row", row, MAX_U24)?;
        self.stage(RepairOperations::ROW, |target| target.row = row)
    }

    fn set_column(&self, column: u32) -> Result<()> {
        let column = check_field("column", column, u16::MAX as u32)? as u16;
        self.stage(RepairOperations::COLUMN, |target| target.column = column)
    }

    fn set_channel(&self, channel: u32) -> Result<()> {
        let channel = check_field("channel", channel, u8::MAX as u32)? as u8;
        self.stage(RepairOperations::CHANNEL, |target| target.channel = channel)
    }

    fn set_sub_channel(&self, sub_channel: u32) -> Result<()> {
        let sub_channel = check_field("sub-channel", sub_channel, u8::MAX as u32)? as u8;
        self.stage(RepairOperations::SUB_CHANNEL, |target| target.sub_channel = sub_channel)
    }

    fn query(&self) -> Result<()> {
        self.send(true)
    }

    fn repair(&self) -> Result<()> {
        self.send(false)
    }
}
