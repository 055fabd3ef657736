//! Simulated Memory Device Mailbox
//!
//! A memory device model that answers the Feature commands from an in-memory Feature table. It follows the data
//! transfer rules of Set Feature and records every command it receives.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;

use ras_mailbox::feature::{
    FeatureEntry, FeatureFlags, GetFeatureIn, GetFeatureSelection, GetSupportedFeaturesIn,
    GetSupportedFeaturesOutHeader, SetFeatureHeader, SetFeatureTransfer,
};
use ras_mailbox::mailbox::{CommandMailbox, MailboxCommand, Opcode, ReturnCode};
use scroll::{Pread, Pwrite, LE};
use uuid::Uuid;

/// A command as the device saw it.
#[derive(Debug, Clone)]
pub struct CommandRecord {
    pub opcode: Opcode,
    pub payload_in: Vec<u8>,
    pub return_code: ReturnCode,
}

struct Feature {
    entry: FeatureEntry,
    record: Vec<u8>,
}

struct PendingTransfer {
    uuid: Uuid,
    record: Vec<u8>,
}

#[derive(Default)]
struct DeviceState {
    features: Vec<Feature>,
    page_limit: Option<usize>,
    pending: Option<PendingTransfer>,
    injected: Option<(Opcode, usize, ReturnCode)>,
    commands: Vec<CommandRecord>,
}

/// Simulated device mailbox.
pub struct SimulatedDevice {
    payload_size: usize,
    state: Mutex<DeviceState>,
}

/// Builds a changeable Feature entry for a record of `size` bytes.
pub fn feature_entry(uuid: Uuid, id: u16, size: u16) -> FeatureEntry {
    FeatureEntry {
        uuid,
        id,
        get_size: size,
        set_size: size,
        flags: FeatureFlags::new().with_changeable(true),
        get_version: 1,
        set_version: 1,
        effects: 0,
    }
}

impl SimulatedDevice {
    pub fn new(payload_size: usize) -> Self {
        Self { payload_size, state: Mutex::new(DeviceState::default()) }
    }

    /// Adds a Feature with the given current record.
    pub fn add_feature(&self, entry: FeatureEntry, record: Vec<u8>) {
        self.state.lock().unwrap().features.push(Feature { entry, record });
    }

    /// Caps the number of entries returned per Get Supported Features page.
    pub fn set_page_limit(&self, limit: usize) {
        self.state.lock().unwrap().page_limit = Some(limit);
    }

    /// Fails the `nth` (zero based) upcoming command with the given opcode.
    pub fn fail_nth(&self, opcode: Opcode, nth: usize, rc: ReturnCode) {
        self.state.lock().unwrap().injected = Some((opcode, nth, rc));
    }

    /// Returns the current record of a Feature.
    pub fn record(&self, uuid: &Uuid) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        state.features.iter().find(|f| f.entry.uuid == *uuid).map(|f| f.record.clone()).unwrap_or_default()
    }

    /// Returns every command received so far.
    pub fn commands(&self) -> Vec<CommandRecord> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Returns the transfer stages of the Set Feature commands received so far.
    pub fn set_feature_stages(&self) -> Vec<SetFeatureTransfer> {
        self.commands()
            .iter()
            .filter(|c| c.opcode == Opcode::SetFeature)
            .map(|c| c.payload_in.pread_with::<SetFeatureHeader>(0, LE).unwrap().transfer().unwrap())
            .collect()
    }

    /// Returns the number of commands received with the given opcode.
    pub fn count(&self, opcode: Opcode) -> usize {
        self.commands().iter().filter(|c| c.opcode == opcode).count()
    }
}

impl DeviceState {
    fn injected_failure(&mut self, opcode: Opcode) -> Option<ReturnCode> {
        match self.injected {
            Some((op, 0, rc)) if op == opcode => {
                self.injected = None;
                Some(rc)
            }
            Some((op, n, rc)) if op == opcode => {
                self.injected = Some((op, n - 1, rc));
                None
            }
            _ => None,
        }
    }

    fn get_supported_features(&self, cmd: &mut MailboxCommand) -> ReturnCode {
        let Ok(input) = cmd.payload_in.pread_with::<GetSupportedFeaturesIn>(0, LE) else {
            return ReturnCode::InvalidPayloadLength;
        };
        let room = (input.count as usize).min(cmd.size_out).saturating_sub(GetSupportedFeaturesOutHeader::SIZE)
            / FeatureEntry::SIZE;
        let start = input.start_index as usize;
        if start > self.features.len() {
            return ReturnCode::InvalidInput;
        }
        let returned = room.min(self.page_limit.unwrap_or(usize::MAX)).min(self.features.len() - start);

        let mut out = vec![0u8; GetSupportedFeaturesOutHeader::SIZE + returned * FeatureEntry::SIZE];
        let header = GetSupportedFeaturesOutHeader {
            num_entries: returned as u16,
            supported_features: self.features.len() as u16,
            reserved: 0,
        };
        out.pwrite_with(header, 0, LE).unwrap();
        for (i, feature) in self.features[start..start + returned].iter().enumerate() {
            out.pwrite_with(feature.entry, GetSupportedFeaturesOutHeader::SIZE + i * FeatureEntry::SIZE, LE).unwrap();
        }
        cmd.payload_out = out;
        ReturnCode::Success
    }

    fn get_feature(&self, cmd: &mut MailboxCommand) -> ReturnCode {
        let Ok(input) = cmd.payload_in.pread_with::<GetFeatureIn>(0, LE) else {
            return ReturnCode::InvalidPayloadLength;
        };
        if input.selection != GetFeatureSelection::Current {
            return ReturnCode::UnsupportedFeatureSelection;
        }
        let Some(feature) = self.features.iter().find(|f| f.entry.uuid == input.uuid) else {
            return ReturnCode::Unsupported;
        };
        let start = input.offset as usize;
        let end = (start + input.count as usize).min(feature.record.len());
        if start > end {
            return ReturnCode::InvalidInput;
        }
        cmd.payload_out = feature.record[start..end].to_vec();
        ReturnCode::Success
    }

    fn set_feature(&mut self, cmd: &mut MailboxCommand) -> ReturnCode {
        let Ok(header) = cmd.payload_in.pread_with::<SetFeatureHeader>(0, LE) else {
            return ReturnCode::InvalidPayloadLength;
        };
        let data = &cmd.payload_in[SetFeatureHeader::SIZE..];
        let Some(index) = self.features.iter().position(|f| f.entry.uuid == header.uuid) else {
            return ReturnCode::Unsupported;
        };
        if !self.features[index].entry.is_changeable() {
            return ReturnCode::Unsupported;
        }
        if header.version != self.features[index].entry.set_version {
            return ReturnCode::UnsupportedFeatureVersion;
        }

        let stage = header.transfer();
        let mut record = match stage {
            Some(SetFeatureTransfer::Full) | Some(SetFeatureTransfer::Initiate) => {
                if self.pending.is_some() {
                    return ReturnCode::FeatureTransferInProgress;
                }
                self.features[index].record.clone()
            }
            Some(SetFeatureTransfer::Continue) | Some(SetFeatureTransfer::Finish) => match self.pending.take() {
                Some(pending) if pending.uuid == header.uuid => pending.record,
                _ => return ReturnCode::FeatureTransferOutOfOrder,
            },
            Some(SetFeatureTransfer::Abort) => {
                self.pending = None;
                return ReturnCode::Success;
            }
            None => return ReturnCode::InvalidInput,
        };

        let start = header.offset as usize;
        if start + data.len() > record.len() {
            return ReturnCode::InvalidPayloadLength;
        }
        record[start..start + data.len()].copy_from_slice(data);

        match stage {
            Some(SetFeatureTransfer::Full) | Some(SetFeatureTransfer::Finish) => self.features[index].record = record,
            _ => self.pending = Some(PendingTransfer { uuid: header.uuid, record }),
        }
        ReturnCode::Success
    }
}

impl CommandMailbox for SimulatedDevice {
    fn payload_size(&self) -> usize {
        self.payload_size
    }

    fn execute(&self, cmd: &mut MailboxCommand) -> ras_mailbox::Result<()> {
        let mut state = self.state.lock().unwrap();
        assert!(cmd.payload_in.len() <= self.payload_size, "payload exceeds the mailbox");

        let rc = match state.injected_failure(cmd.opcode) {
            Some(rc) => rc,
            None => match cmd.opcode {
                Opcode::GetSupportedFeatures => state.get_supported_features(cmd),
                Opcode::GetFeature => state.get_feature(cmd),
                Opcode::SetFeature => state.set_feature(cmd),
                Opcode::PerformMaintenance => ReturnCode::Success,
            },
        };

        cmd.return_code = rc.as_u16();
        state.commands.push(CommandRecord { opcode: cmd.opcode, payload_in: cmd.payload_in.clone(), return_code: rc });
        Ok(())
    }
}
