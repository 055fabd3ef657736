//! Memory Devices and Feature Contexts
//!
//! A [`RasDevice`] is a memory device whose Feature catalog has been enumerated. A [`FeatureContext`] binds one
//! supported Feature of a device to the record sizes and versions the device reported for it, and is what every
//! typed mailbox operation reads and writes through.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
extern crate alloc;
use alloc::{sync::Arc, vec::Vec};

use ras_mailbox::catalog::FeatureCatalog;
use ras_mailbox::feature::{FeatureEntry, GetFeatureSelection};
use ras_mailbox::mailbox::CommandMailbox;
use ras_mailbox::transport::FeatureTransport;

use crate::config::FeatureCapability;
use crate::error::{RasError, Result};

/// A memory device with an enumerated Feature catalog.
pub struct RasDevice {
    id: u32,
    mailbox: Arc<dyn CommandMailbox>,
    catalog: FeatureCatalog,
    capability: FeatureCapability,
    dpa_size: u64,
}

impl RasDevice {
    pub fn new(
        id: u32,
        mailbox: Arc<dyn CommandMailbox>,
        catalog: FeatureCatalog,
        capability: FeatureCapability,
        dpa_size: u64,
    ) -> Self {
        Self { id, mailbox, catalog, capability, dpa_size }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn catalog(&self) -> &FeatureCatalog {
        &self.catalog
    }

    pub fn capability(&self) -> FeatureCapability {
        self.capability
    }

    /// Returns the size of the device physical address space in bytes.
    pub fn dpa_size(&self) -> u64 {
        self.dpa_size
    }

    /// Returns a Feature transport over the device mailbox.
    pub fn transport(&self) -> FeatureTransport<'_> {
        FeatureTransport::new(self.mailbox.as_ref())
    }
}

/// A supported Feature of a device, bound to the record layout the device reported for it.
#[derive(Clone)]
pub struct FeatureContext {
    device: Arc<RasDevice>,
    entry: FeatureEntry,
    instance: u32,
}

impl FeatureContext {
    pub fn new(device: Arc<RasDevice>, entry: FeatureEntry, instance: u32) -> Self {
        Self { device, entry, instance }
    }

    pub fn device(&self) -> &Arc<RasDevice> {
        &self.device
    }

    pub fn entry(&self) -> &FeatureEntry {
        &self.entry
    }

    /// Returns the class local instance number.
    pub fn instance(&self) -> u32 {
        self.instance
    }

    /// Reads the current Feature record, `get_size` bytes.
    pub fn read_current(&self) -> Result<Vec<u8>> {
        let size = self.entry.get_size as usize;
        let record = self.device.transport().get_feature(&self.entry.uuid, GetFeatureSelection::Current, size, 0)?;
        if record.len() != size {
            log::error!(
                target: "ras_feat",
                "Device {}: Feature {} returned {} of {} bytes",
                self.device.id,
                self.entry.uuid,
                record.len(),
                size
            );
            return Err(RasError::Protocol);
        }
        Ok(record)
    }

    /// Writes a complete Feature record.
    pub fn write(&self, record: &[u8]) -> Result<()> {
        if record.len() > self.entry.set_size as usize {
            log::error!(
                target: "ras_feat",
                "Device {}: {} byte record exceeds Feature {} set size {}",
                self.device.id,
                record.len(),
                self.entry.uuid,
                self.entry.set_size
            );
            return Err(RasError::Protocol);
        }
        self.device.transport().set_feature(&self.entry.uuid, self.entry.set_version, record, 0, 0).map_err(|err| {
            log::error!(target: "ras_feat", "Device {}: Set Feature {} failed: {}", self.device.id, self.entry.uuid, err);
            RasError::from(err)
        })
    }

    /// Issues a Perform Maintenance command on the device.
    pub fn perform_maintenance(&self, class: u8, subclass: u8, payload: &[u8]) -> Result<()> {
        self.device.transport().perform_maintenance(class, subclass, payload).map_err(|err| {
            log::error!(
                target: "ras_feat",
                "Device {}: maintenance {:#x}/{:#x} failed: {}",
                self.device.id,
                class,
                subclass,
                err
            );
            RasError::from(err)
        })
    }
}
