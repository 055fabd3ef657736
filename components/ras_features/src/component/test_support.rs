//! Mailbox fake shared by the unit tests of the feature operations.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use ras_mailbox::catalog::FeatureCatalog;
use ras_mailbox::feature::{
    CommandEffects, FeatureEntry, FeatureFlags, GetFeatureIn, GetSupportedFeaturesIn, GetSupportedFeaturesOutHeader,
    SetFeatureHeader,
};
use ras_mailbox::mailbox::{CommandMailbox, MailboxCommand, Opcode, ReturnCode};
use scroll::{Pread, Pwrite, LE};
use uuid::Uuid;

use crate::component::device::{FeatureContext, RasDevice};
use crate::config::FeatureCapability;

/// A mailbox that serves a fixed catalog and fixed records, and records every write.
#[derive(Default)]
pub(crate) struct FakeMailbox {
    catalog: Mutex<Vec<FeatureEntry>>,
    records: Mutex<BTreeMap<Uuid, Vec<u8>>>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    maintenance: Mutex<Vec<(u8, u8, Vec<u8>)>>,
    fail_with: Mutex<Option<ReturnCode>>,
}

impl FakeMailbox {
    pub(crate) fn set_catalog(&self, entries: Vec<FeatureEntry>) {
        *self.catalog.lock().unwrap() = entries;
    }

    pub(crate) fn set_record(&self, uuid: Uuid, record: Vec<u8>) {
        self.records.lock().unwrap().insert(uuid, record);
    }

    pub(crate) fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    pub(crate) fn maintenance(&self) -> Vec<(u8, u8, Vec<u8>)> {
        self.maintenance.lock().unwrap().clone()
    }

    /// Fails every following Set Feature and Perform Maintenance command.
    pub(crate) fn fail_with(&self, rc: ReturnCode) {
        *self.fail_with.lock().unwrap() = Some(rc);
    }
}

impl CommandMailbox for FakeMailbox {
    fn payload_size(&self) -> usize {
        256
    }

    fn execute(&self, command: &mut MailboxCommand) -> ras_mailbox::Result<()> {
        match command.opcode {
            Opcode::GetFeature => {
                let input: GetFeatureIn = command.payload_in.pread_with(0, LE).unwrap();
                let records = self.records.lock().unwrap();
                let record = records.get(&input.uuid).unwrap();
                let start = input.offset as usize;
                let end = (start + input.count as usize).min(record.len());
                command.payload_out = record[start..end].to_vec();
            }
            Opcode::SetFeature | Opcode::PerformMaintenance => {
                if let Some(rc) = *self.fail_with.lock().unwrap() {
                    command.return_code = rc.as_u16();
                    return Ok(());
                }
                if command.opcode == Opcode::SetFeature {
                    let header: SetFeatureHeader = command.payload_in.pread_with(0, LE).unwrap();
                    let data = command.payload_in[SetFeatureHeader::SIZE..].to_vec();
                    self.writes.lock().unwrap().push((header.uuid, data));
                } else {
                    let payload = &command.payload_in;
                    self.maintenance.lock().unwrap().push((payload[0], payload[1], payload[2..].to_vec()));
                }
            }
            Opcode::GetSupportedFeatures => {
                let input: GetSupportedFeaturesIn = command.payload_in.pread_with(0, LE).unwrap();
                let catalog = self.catalog.lock().unwrap();
                let room = (input.count as usize - GetSupportedFeaturesOutHeader::SIZE) / FeatureEntry::SIZE;
                let page: Vec<FeatureEntry> =
                    catalog.iter().skip(input.start_index as usize).take(room).copied().collect();
                let header = GetSupportedFeaturesOutHeader {
                    num_entries: page.len() as u16,
                    supported_features: catalog.len() as u16,
                    reserved: 0,
                };
                let mut out = vec![0u8; GetSupportedFeaturesOutHeader::SIZE + page.len() * FeatureEntry::SIZE];
                let mut offset = 0;
                out.gwrite_with(header, &mut offset, LE).unwrap();
                for entry in page {
                    out.gwrite_with(entry, &mut offset, LE).unwrap();
                }
                command.payload_out = out;
            }
        }
        Ok(())
    }
}

/// Builds a changeable entry with immediate configuration effects.
pub(crate) fn entry(uuid: Uuid, get_size: u16, set_size: u16) -> FeatureEntry {
    FeatureEntry {
        uuid,
        id: 0,
        get_size,
        set_size,
        flags: FeatureFlags::new().with_changeable(true),
        get_version: 1,
        set_version: 1,
        effects: CommandEffects::CONFIG_CHANGE_IMMEDIATE.bits(),
    }
}

/// Builds a device with a 1 GiB DPA space around a fake mailbox.
pub(crate) fn device(id: u32, mailbox: Arc<FakeMailbox>, entries: Vec<FeatureEntry>) -> Arc<RasDevice> {
    Arc::new(RasDevice::new(id, mailbox, FeatureCatalog::new(entries), FeatureCapability::ReadWrite, 0x4000_0000))
}

/// Builds a context for the first entry of a single Feature device.
pub(crate) fn context(id: u32, mailbox: Arc<FakeMailbox>, entry: FeatureEntry) -> FeatureContext {
    FeatureContext::new(device(id, mailbox, vec![entry]), entry, 0)
}
