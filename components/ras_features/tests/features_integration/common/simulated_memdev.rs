//! Simulated CXL Memory Device
//!
//! A memory device that implements the RAS Features the way device firmware would: patrol scrub, error check
//! scrub, soft PPR, one sparing Feature and a vendor Feature. Set Feature writes are interpreted per Feature, so the
//! next Get Feature reflects the new configuration. Maintenance operations are recorded, not executed.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;

use ras_mailbox::feature::{
    CommandEffects, FeatureEntry, FeatureFlags, GetFeatureIn, GetSupportedFeaturesIn, GetSupportedFeaturesOutHeader,
    SetFeatureHeader, SetFeatureTransfer, ECS_UUID, PATROL_SCRUB_UUID, ROW_SPARING_UUID, SOFT_PPR_UUID,
};
use ras_mailbox::mailbox::{CommandMailbox, MailboxCommand, Opcode, ReturnCode};
use scroll::{Pread, Pwrite, LE};
use uuid::Uuid;

/// A vendor Feature callers may reach through the RPC gateway.
pub const VENDOR_UUID: Uuid = Uuid::from_u128(0x3c9a_07e1_52d4_4c21_9f0b_6d8e_11aa_2b77);

/// Size of the vendor Feature record.
pub const VENDOR_RECORD_SIZE: u16 = 8;

const REPAIR_HEADER_SIZE: usize = 16;

/// Restriction bit: the repair does not keep the data of the repaired location.
pub const RESTRICT_DATA_NOT_RETAINED: u16 = 1 << 2;
/// Restriction bit: hard sparing is supported.
pub const SUPPORTS_HARD_SPARING: u16 = 1 << 3;
/// Restriction bit: soft sparing is supported.
pub const SUPPORTS_SOFT_SPARING: u16 = 1 << 4;

/// Features and initial state of a simulated device.
#[derive(Debug, Clone)]
pub struct MemdevConfig {
    pub scrub_min_hours: u8,
    pub scrub_cycle_hours: u8,
    pub scrub_enabled: bool,
    /// Number of ECS FRUs. Zero leaves the ECS Feature out.
    pub ecs_frus: usize,
    /// Restrictions of the soft PPR Feature. `None` leaves it out.
    pub ppr_restrictions: Option<u16>,
    /// Sparing Feature and its restrictions.
    pub sparing: Option<(Uuid, u16)>,
    /// Command effects of the vendor Feature. `None` leaves it out.
    pub vendor_effects: Option<CommandEffects>,
    pub payload_size: usize,
}

impl Default for MemdevConfig {
    fn default() -> Self {
        Self {
            scrub_min_hours: 1,
            scrub_cycle_hours: 12,
            scrub_enabled: true,
            ecs_frus: 2,
            ppr_restrictions: Some(RESTRICT_DATA_NOT_RETAINED),
            sparing: Some((ROW_SPARING_UUID, SUPPORTS_SOFT_SPARING | SUPPORTS_HARD_SPARING | RESTRICT_DATA_NOT_RETAINED)),
            vendor_effects: Some(CommandEffects::CONFIG_CHANGE_COLD_RESET),
            payload_size: 256,
        }
    }
}

/// A maintenance operation the device received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Maintenance {
    pub class: u8,
    pub subclass: u8,
    pub payload: Vec<u8>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct ScrubState {
    min_hours: u8,
    cycle_hours: u8,
    enabled: bool,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
struct EcsFru {
    config: u16,
    resets: u32,
}

struct MemdevState {
    entries: Vec<FeatureEntry>,
    scrub: ScrubState,
    ecs_log: u8,
    ecs: Vec<EcsFru>,
    ppr_restrictions: u16,
    sparing_restrictions: u16,
    vendor: Vec<u8>,
    maintenance: Vec<Maintenance>,
    resources_exhausted: bool,
    set_commands: usize,
}

/// Simulated device mailbox.
pub struct SimulatedMemdev {
    payload_size: usize,
    state: Mutex<MemdevState>,
}

fn changeable(uuid: Uuid, get_size: usize, set_size: usize, effects: CommandEffects) -> FeatureEntry {
    FeatureEntry {
        uuid,
        id: 0,
        get_size: get_size as u16,
        set_size: set_size as u16,
        flags: FeatureFlags::new().with_changeable(true),
        get_version: 1,
        set_version: 1,
        effects: effects.bits(),
    }
}

impl SimulatedMemdev {
    pub fn new(config: MemdevConfig) -> Self {
        let immediate = CommandEffects::CONFIG_CHANGE_IMMEDIATE;
        let mut entries = vec![changeable(PATROL_SCRUB_UUID, 4, 2, immediate)];
        if config.ecs_frus > 0 {
            entries.push(changeable(ECS_UUID, 1 + config.ecs_frus * 4, 1 + config.ecs_frus * 2, immediate));
        }
        if config.ppr_restrictions.is_some() {
            entries.push(changeable(SOFT_PPR_UUID, REPAIR_HEADER_SIZE + 4, 0, immediate));
        }
        if let Some((uuid, _)) = config.sparing {
            entries.push(changeable(uuid, REPAIR_HEADER_SIZE + 3, 0, immediate));
        }
        if let Some(effects) = config.vendor_effects {
            entries.push(changeable(VENDOR_UUID, VENDOR_RECORD_SIZE as usize, VENDOR_RECORD_SIZE as usize, effects));
        }

        Self {
            payload_size: config.payload_size,
            state: Mutex::new(MemdevState {
                entries,
                scrub: ScrubState {
                    min_hours: config.scrub_min_hours,
                    cycle_hours: config.scrub_cycle_hours,
                    enabled: config.scrub_enabled,
                },
                ecs_log: 0,
                ecs: vec![EcsFru { config: 3, resets: 0 }; config.ecs_frus],
                ppr_restrictions: config.ppr_restrictions.unwrap_or_default(),
                sparing_restrictions: config.sparing.map(|(_, restrictions)| restrictions).unwrap_or_default(),
                vendor: vec![0; VENDOR_RECORD_SIZE as usize],
                maintenance: Vec::new(),
                resources_exhausted: false,
                set_commands: 0,
            }),
        }
    }

    /// Scrub cycle in hours and enable flag.
    pub fn scrub(&self) -> (u8, bool) {
        let state = self.state.lock().unwrap();
        (state.scrub.cycle_hours, state.scrub.enabled)
    }

    /// Stored configuration word of an ECS FRU.
    pub fn ecs_config(&self, fru: usize) -> u16 {
        self.state.lock().unwrap().ecs[fru].config
    }

    /// Number of counter resets an ECS FRU received.
    pub fn ecs_resets(&self, fru: usize) -> u32 {
        self.state.lock().unwrap().ecs[fru].resets
    }

    pub fn ecs_log(&self) -> u8 {
        self.state.lock().unwrap().ecs_log
    }

    pub fn vendor_record(&self) -> Vec<u8> {
        self.state.lock().unwrap().vendor.clone()
    }

    pub fn maintenance(&self) -> Vec<Maintenance> {
        self.state.lock().unwrap().maintenance.clone()
    }

    /// Number of Set Feature commands received.
    pub fn set_commands(&self) -> usize {
        self.state.lock().unwrap().set_commands
    }

    /// Makes maintenance operations fail for lack of spare resources.
    pub fn exhaust_resources(&self, exhausted: bool) {
        self.state.lock().unwrap().resources_exhausted = exhausted;
    }
}

impl MemdevState {
    fn record(&self, uuid: &Uuid) -> Option<Vec<u8>> {
        if *uuid == PATROL_SCRUB_UUID {
            let scrub = self.scrub;
            return Some(vec![0x1, scrub.cycle_hours, scrub.min_hours, scrub.enabled as u8]);
        }
        if *uuid == ECS_UUID && !self.ecs.is_empty() {
            let mut record = vec![self.ecs_log];
            for fru in &self.ecs {
                record.push(0);
                record.extend_from_slice(&fru.config.to_le_bytes());
                record.push(0);
            }
            return Some(record);
        }
        if *uuid == VENDOR_UUID {
            return Some(self.vendor.clone());
        }

        let entry = self.entries.iter().find(|entry| entry.uuid == *uuid)?;
        let mut record = vec![0u8; REPAIR_HEADER_SIZE];
        record[3] = 0x01;
        if *uuid == SOFT_PPR_UUID {
            // DPA and nibble mask accepted.
            record.push(0x3);
            record.extend_from_slice(&self.ppr_restrictions.to_le_bytes());
            record.push(0);
        } else {
            record.push(0);
            record.extend_from_slice(&self.sparing_restrictions.to_le_bytes());
        }
        debug_assert_eq!(record.len(), entry.get_size as usize);
        Some(record)
    }

    fn get_supported_features(&self, cmd: &mut MailboxCommand, payload_size: usize) -> ReturnCode {
        let Ok(input) = cmd.payload_in.pread_with::<GetSupportedFeaturesIn>(0, LE) else {
            return ReturnCode::InvalidPayloadLength;
        };
        let start = input.start_index as usize;
        if start > self.entries.len() {
            return ReturnCode::InvalidInput;
        }
        let room = (input.count as usize).min(payload_size).saturating_sub(GetSupportedFeaturesOutHeader::SIZE)
            / FeatureEntry::SIZE;
        let entries = &self.entries[start..(start + room).min(self.entries.len())];

        let header = GetSupportedFeaturesOutHeader {
            num_entries: entries.len() as u16,
            supported_features: self.entries.len() as u16,
            reserved: 0,
        };
        let mut out = vec![0u8; GetSupportedFeaturesOutHeader::SIZE + entries.len() * FeatureEntry::SIZE];
        let mut offset = 0;
        out.gwrite_with(header, &mut offset, LE).unwrap();
        for entry in entries {
            out.gwrite_with(*entry, &mut offset, LE).unwrap();
        }
        cmd.payload_out = out;
        ReturnCode::Success
    }

    fn get_feature(&self, cmd: &mut MailboxCommand) -> ReturnCode {
        let Ok(input) = cmd.payload_in.pread_with::<GetFeatureIn>(0, LE) else {
            return ReturnCode::InvalidPayloadLength;
        };
        let Some(record) = self.record(&input.uuid) else {
            return ReturnCode::Unsupported;
        };
        let start = (input.offset as usize).min(record.len());
        let end = (start + input.count as usize).min(record.len());
        cmd.payload_out = record[start..end].to_vec();
        ReturnCode::Success
    }

    fn set_feature(&mut self, cmd: &MailboxCommand) -> ReturnCode {
        self.set_commands += 1;
        let Ok(header) = cmd.payload_in.pread_with::<SetFeatureHeader>(0, LE) else {
            return ReturnCode::InvalidPayloadLength;
        };
        if header.transfer() != Some(SetFeatureTransfer::Full) {
            return ReturnCode::InvalidInput;
        }
        let data = &cmd.payload_in[SetFeatureHeader::SIZE..];
        let offset = header.offset as usize;

        if header.uuid == PATROL_SCRUB_UUID {
            if offset != 0 || data.len() != 2 {
                return ReturnCode::InvalidPayloadLength;
            }
            if data[0] < self.scrub.min_hours {
                return ReturnCode::InvalidInput;
            }
            self.scrub.cycle_hours = data[0];
            self.scrub.enabled = data[1] & 0x1 != 0;
        } else if header.uuid == ECS_UUID && !self.ecs.is_empty() {
            if offset != 0 || data.len() != 1 + self.ecs.len() * 2 {
                return ReturnCode::InvalidPayloadLength;
            }
            self.ecs_log = data[0];
            for (i, fru) in self.ecs.iter_mut().enumerate() {
                let config = u16::from_le_bytes([data[1 + i * 2], data[2 + i * 2]]);
                if config & (1 << 4) != 0 {
                    fru.resets += 1;
                }
                fru.config = config & !(1 << 4);
            }
        } else if header.uuid == VENDOR_UUID {
            if offset + data.len() > self.vendor.len() {
                return ReturnCode::InvalidPayloadLength;
            }
            self.vendor[offset..offset + data.len()].copy_from_slice(data);
        } else {
            return ReturnCode::Unsupported;
        }
        ReturnCode::Success
    }

    fn perform_maintenance(&mut self, cmd: &MailboxCommand) -> ReturnCode {
        if cmd.payload_in.len() < 2 {
            return ReturnCode::InvalidPayloadLength;
        }
        if self.resources_exhausted {
            return ReturnCode::ResourcesExhausted;
        }
        self.maintenance.push(Maintenance {
            class: cmd.payload_in[0],
            subclass: cmd.payload_in[1],
            payload: cmd.payload_in[2..].to_vec(),
        });
        ReturnCode::Success
    }
}

impl CommandMailbox for SimulatedMemdev {
    fn payload_size(&self) -> usize {
        self.payload_size
    }

    fn execute(&self, cmd: &mut MailboxCommand) -> ras_mailbox::Result<()> {
        let mut state = self.state.lock().unwrap();
        let rc = match cmd.opcode {
            Opcode::GetSupportedFeatures => state.get_supported_features(cmd, self.payload_size),
            Opcode::GetFeature => state.get_feature(cmd),
            Opcode::SetFeature => state.set_feature(cmd),
            Opcode::PerformMaintenance => state.perform_maintenance(cmd),
        };
        cmd.return_code = rc.as_u16();
        Ok(())
    }
}
