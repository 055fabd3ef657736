//! CXL Error Check Scrub
//!
//! ECS control through the DDR5 ECS Feature of a memory device. The record holds one log entry type for the device
//! followed by one configuration per media FRU. Set Feature rewrites the whole record, so every change reads the
//! current record, edits the one field, and writes all FRUs back.
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
use crate::service::ecs::{EcsCountMode, EcsLogEntryType, EcsOperations, EcsOps};

/// Size of the record header that precedes the FRU entries.
const ECS_HEADER_SIZE: usize = 1;

#[bitfield(u8)]
#[derive(PartialEq, Eq)]
struct EcsLogCapabilities {
    #[bits(2)]
    log_entry_type: u8,
    #[bits(6)]
    __reserved: u8,
}

#[bitfield(u16)]
#[derive(PartialEq, Eq)]
struct EcsConfig {
    /// Index into the error count thresholds.
    #[bits(3)]
    threshold_index: u8,
    /// Count codewords instead of rows.
    count_mode: bool,
    /// Reset the error counter.
    reset_counter: bool,
    #[bits(11)]
    __reserved: u16,
}

/// Per FRU entry of the current ECS attributes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pread, Pwrite)]
struct EcsFruReadRecord {
    capabilities: u8,
    config: u16,
    flags: u8,
}

impl EcsFruReadRecord {
    const SIZE: usize = 4;
}

/// Error count thresholds by their encoded index.
const THRESHOLDS: [(u8, u32); 3] = [(3, 256), (4, 1024), (5, 4096)];

fn threshold_index(threshold: u32) -> Option<u8> {
    THRESHOLDS.iter().find(|(_, count)| *count == threshold).map(|(index, _)| *index)
}

fn threshold_count(index: u8) -> Option<u32> {
    THRESHOLDS.iter().find(|(i, _)| *i == index).map(|(_, count)| *count)
}

/// Decoded ECS record.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EcsRecord {
    log: EcsLogCapabilities,
    frus: Vec<EcsConfig>,
}

/// Error check scrub of a memory device.
pub struct CxlEcs {
    context: FeatureContext,
    fru_count: usize,
}

impl CxlEcs {
    /// Returns the number of FRUs a record of `get_size` bytes describes.
    pub fn fru_count_for(get_size: u16) -> usize {
        (get_size as usize).saturating_sub(ECS_HEADER_SIZE) / EcsFruReadRecord::SIZE
    }

    /// Creates the ECS context of a device, or `None` if the record describes no FRU.
    pub fn new(context: FeatureContext) -> Option<Self> {
        let fru_count = Self::fru_count_for(context.entry().get_size);
        if fru_count == 0 {
            log::info!(target: "ras_feat", "Device {}: ECS record describes no FRU", context.device().id());
            return None;
        }
        Some(Self { context, fru_count })
    }

    pub fn context(&self) -> &FeatureContext {
        &self.context
    }

    fn check_fru(&self, fru: usize) -> Result<()> {
        if fru >= self.fru_count {
            return Err(RasError::OutOfRange {
                what: "ECS FRU",
                value: fru as u64,
                min: 0,
                max: self.fru_count as u64 - 1,
            });
        }
        Ok(())
    }

    fn read(&self) -> Result<EcsRecord> {
        let bytes = self.context.read_current()?;
        let mut offset = 0;
        let log = EcsLogCapabilities::from_bits(bytes.gread_with::<u8>(&mut offset, LE)?);
        let mut frus = Vec::with_capacity(self.fru_count);
        for _ in 0..self.fru_count {
            let fru: EcsFruReadRecord = bytes.gread_with(&mut offset, LE)?;
            frus.push(EcsConfig::from_bits(fru.config));
        }
        Ok(EcsRecord { log, frus })
    }

    fn write(&self, record: &EcsRecord) -> Result<()> {
        let mut buffer = alloc::vec![0u8; ECS_HEADER_SIZE + record.frus.len() * 2];
        let mut offset = 0;
        buffer.gwrite_with(record.log.into_bits(), &mut offset, LE)?;
        for config in &record.frus {
            buffer.gwrite_with(config.into_bits(), &mut offset, LE)?;
        }
        self.context.write(&buffer)
    }

    /// Reads the record, applies `change` to the configuration of `fru`, and writes the record back.
    ///
    /// A pending counter reset is only carried for the FRU being changed.
    fn update(&self, fru: usize, change: impl FnOnce(&mut EcsLogCapabilities, &mut EcsConfig)) -> Result<()> {
        self.check_fru(fru)?;
        let mut record = self.read()?;
        for config in record.frus.iter_mut() {
            config.set_reset_counter(false);
        }
        let EcsRecord { log, frus } = &mut record;
        change(log, &mut frus[fru]);
        self.write(&record)
    }

    fn fru_config(&self, fru: usize) -> Result<EcsConfig> {
        self.check_fru(fru)?;
        Ok(self.read()?.frus[fru])
    }
}

impl EcsOps for CxlEcs {
    fn operations(&self) -> EcsOperations {
        EcsOperations::all()
    }

    fn fru_count(&self) -> usize {
        self.fru_count
    }

    fn log_entry_type(&self, fru: usize) -> Result<EcsLogEntryType> {
        self.check_fru(fru)?;
        let value = self.read()?.log.log_entry_type();
        EcsLogEntryType::try_from(value as u32).map_err(|_| {
            log::error!(target: "ras_feat", "Device {}: unknown ECS log entry type {}", self.context.device().id(), value);
            RasError::Protocol
        })
    }

    fn set_log_entry_type(&self, fru: usize, value: u32) -> Result<()> {
        let kind = EcsLogEntryType::try_from(value)?;
        self.update(fru, |log, _| log.set_log_entry_type(kind as u8))
    }

    fn mode(&self, fru: usize) -> Result<EcsCountMode> {
        Ok(if self.fru_config(fru)?.count_mode() { EcsCountMode::Codewords } else { EcsCountMode::Rows })
    }

    fn set_mode(&self, fru: usize, value: u32) -> Result<()> {
        let mode = EcsCountMode::try_from(value)?;
        self.update(fru, |_, config| config.set_count_mode(mode == EcsCountMode::Codewords))
    }

    fn reset(&self, fru: usize, value: u32) -> Result<()> {
        if value != 1 {
            return Err(RasError::InvalidValue { what: "ECS reset", value: value as u64 });
        }
        self.update(fru, |_, config| config.set_reset_counter(true))?;
        log::info!(target: "ras_feat", "Device {}: ECS counter of FRU {} reset", self.context.device().id(), fru);
        Ok(())
    }

    fn threshold(&self, fru: usize) -> Result<u32> {
        let index = self.fru_config(fru)?.threshold_index();
        threshold_count(index).ok_or_else(|| {
            log::error!(target: "ras_feat", "Device {}: unknown ECS threshold index {}", self.context.device().id(), index);
            RasError::Protocol
        })
    }

    fn set_threshold(&self, fru: usize, threshold: u32) -> Result<()> {
        let index =
            threshold_index(threshold).ok_or(RasError::InvalidValue { what: "ECS threshold", value: threshold as u64 })?;
        self.update(fru, |_, config| config.set_threshold_index(index))
    }
}
