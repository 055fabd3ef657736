//! Memory Region Topology
//!
//! Tracks the interleaved regions that map device physical address (DPA) ranges of memory devices into the host
//! address space. Repair operations that may disturb the media consult it to make sure the repair target is not in
//! use, and region scrub contexts use it to find their member devices.
//!
//! Two tables are kept, each behind its own reader-writer lock: the region table and the DPA mapping table. Both
//! locks are always taken in that order.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
extern crate alloc;
use alloc::{collections::BTreeMap, vec::Vec};

use spin::RwLock;

use crate::error::{RasError, Result};

/// One interleave target of a region.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegionTarget {
    /// Identifier of the memory device.
    pub device: u32,
    /// First DPA of the device that belongs to the region.
    pub dpa_base: u64,
}

/// An interleaved memory region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: u32,
    pub hpa_base: u64,
    pub size: u64,
    /// Interleave targets in position order.
    pub targets: Vec<RegionTarget>,
}

impl Region {
    /// Returns the number of DPA bytes every target contributes.
    pub fn target_span(&self) -> u64 {
        match self.targets.len() as u64 {
            0 => 0,
            ways => self.size / ways,
        }
    }
}

#[derive(Debug, Copy, Clone)]
struct DpaMapping {
    device: u32,
    dpa_base: u64,
    size: u64,
    region: u32,
}

impl DpaMapping {
    fn contains(&self, device: u32, dpa: u64) -> bool {
        self.device == device && dpa >= self.dpa_base && dpa - self.dpa_base < self.size
    }

    fn overlaps(&self, other: &DpaMapping) -> bool {
        self.device == other.device
            && self.dpa_base < other.dpa_base.saturating_add(other.size)
            && other.dpa_base < self.dpa_base.saturating_add(self.size)
    }
}

/// Region and DPA mapping tables.
#[derive(Default)]
pub struct RegionTopology {
    regions: RwLock<BTreeMap<u32, Region>>,
    dpa_map: RwLock<Vec<DpaMapping>>,
}

impl RegionTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a region and maps the DPA span of each of its targets.
    pub fn add_region(&self, region: Region) -> Result<()> {
        let ways = region.targets.len() as u64;
        if ways == 0 || region.size == 0 || region.size % ways != 0 {
            log::warn!(target: "ras_feat", "Region {}: {} bytes cannot be interleaved {} ways", region.id, region.size, ways);
            return Err(RasError::InvalidArgument);
        }

        let mut regions = self.regions.write();
        let mut dpa_map = self.dpa_map.write();
        if regions.contains_key(&region.id) {
            return Err(RasError::InvalidArgument);
        }

        let span = region.target_span();
        let mappings: Vec<DpaMapping> = region
            .targets
            .iter()
            .map(|target| DpaMapping { device: target.device, dpa_base: target.dpa_base, size: span, region: region.id })
            .collect();
        if mappings.iter().any(|new| dpa_map.iter().any(|old| old.overlaps(new))) {
            log::warn!(target: "ras_feat", "Region {}: DPA range already mapped", region.id);
            return Err(RasError::Busy);
        }

        log::debug!(target: "ras_feat", "Region {}: {:#x}+{:#x}, {} ways", region.id, region.hpa_base, region.size, ways);
        dpa_map.extend(mappings);
        regions.insert(region.id, region);
        Ok(())
    }

    /// Removes a region and its DPA mappings.
    pub fn remove_region(&self, id: u32) -> Option<Region> {
        let mut regions = self.regions.write();
        let mut dpa_map = self.dpa_map.write();
        let region = regions.remove(&id)?;
        dpa_map.retain(|mapping| mapping.region != id);
        Some(region)
    }

    /// Returns a copy of a region.
    pub fn region(&self, id: u32) -> Option<Region> {
        self.regions.read().get(&id).cloned()
    }

    /// Returns whether a DPA of a device belongs to a region.
    pub fn is_mapped(&self, device: u32, dpa: u64) -> bool {
        let _regions = self.regions.read();
        self.dpa_map.read().iter().any(|mapping| mapping.contains(device, dpa))
    }

    /// Runs `f` with both tables read locked, provided the DPA of the device is not mapped into any region.
    ///
    /// No region can be created over the address until `f` returns.
    pub fn with_unmapped<T>(&self, device: u32, dpa: u64, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _regions = self.regions.read();
        let dpa_map = self.dpa_map.read();
        if let Some(mapping) = dpa_map.iter().find(|mapping| mapping.contains(device, dpa)) {
            log::warn!(
                target: "ras_feat",
                "Device {}: DPA {:#x} is mapped by region {}",
                device,
                dpa,
                mapping.region
            );
            return Err(RasError::AddressMapped { dpa });
        }
        f()
    }
}
