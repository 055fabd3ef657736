//! ACPI RAS2 Table
//!
//! Only the fields needed to find the PCC subspaces of memory features are decoded.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
extern crate alloc;
use alloc::vec::Vec;

use scroll::{Pread, LE};

use crate::error::{PccError, Result};

/// Size of the standard ACPI system description table header.
const ACPI_HEADER_SIZE: usize = 36;
/// Offset of the first PCC descriptor.
const DESCRIPTORS_OFFSET: usize = ACPI_HEADER_SIZE + 4;

/// RAS2 feature type of memory features.
pub const RAS2_FEATURE_TYPE_MEMORY: u8 = 0x00;

/// A PCC descriptor of the RAS2 table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pread)]
pub struct Ras2PccDescriptor {
    /// PCC subspace identifier.
    pub channel_id: u8,
    pub reserved: u16,
    /// RAS2 feature type served by the subspace.
    pub feature_type: u8,
    /// Instance of the feature, such as a memory node.
    pub instance: u32,
}

impl Ras2PccDescriptor {
    pub const SIZE: usize = 8;
}

/// A parsed RAS2 table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ras2Table {
    revision: u8,
    descriptors: Vec<Ras2PccDescriptor>,
}

impl Ras2Table {
    /// Parses a RAS2 table, ACPI header included.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DESCRIPTORS_OFFSET || &bytes[0..4] != b"RAS2" {
            log::error!(target: "ras2_pcc", "RAS2 table missing or too short");
            return Err(PccError::InvalidTable);
        }

        let length = bytes.pread_with::<u32>(4, LE)? as usize;
        if length < DESCRIPTORS_OFFSET || length > bytes.len() {
            log::error!(target: "ras2_pcc", "RAS2 table length {} invalid for {} bytes", length, bytes.len());
            return Err(PccError::InvalidTable);
        }
        let table = &bytes[..length];

        if table.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte)) != 0 {
            log::error!(target: "ras2_pcc", "RAS2 table checksum mismatch");
            return Err(PccError::InvalidTable);
        }

        let revision = table.pread_with::<u8>(8, LE)?;
        let count = table.pread_with::<u16>(ACPI_HEADER_SIZE + 2, LE)? as usize;
        if count == 0 {
            log::error!(target: "ras2_pcc", "RAS2 table does not contain PCC descriptors");
            return Err(PccError::InvalidTable);
        }
        if DESCRIPTORS_OFFSET + count * Ras2PccDescriptor::SIZE > length {
            log::error!(target: "ras2_pcc", "RAS2 table too short for {} descriptors", count);
            return Err(PccError::InvalidTable);
        }

        let mut offset = DESCRIPTORS_OFFSET;
        let descriptors =
            (0..count).map(|_| table.gread_with::<Ras2PccDescriptor>(&mut offset, LE)).collect::<core::result::Result<Vec<_>, _>>()?;

        Ok(Self { revision, descriptors })
    }

    /// Returns the table revision.
    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// Returns every descriptor in table order.
    pub fn descriptors(&self) -> &[Ras2PccDescriptor] {
        &self.descriptors
    }

    /// Returns the memory feature descriptors, one per distinct subspace, in table order.
    pub fn memory_descriptors(&self) -> Vec<Ras2PccDescriptor> {
        let mut unique: Vec<Ras2PccDescriptor> = Vec::new();
        for descriptor in self.descriptors.iter().filter(|d| d.feature_type == RAS2_FEATURE_TYPE_MEMORY) {
            if !unique.iter().any(|d| d.channel_id == descriptor.channel_id) {
                unique.push(*descriptor);
            }
        }
        unique
    }
}
