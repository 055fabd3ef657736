//! Feature Catalog
//!
//! The enumerated list of Features a device supports. A catalog is built once when the device is registered and is
//! read-only afterwards.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
extern crate alloc;
use alloc::vec::Vec;

use uuid::Uuid;

use crate::feature::{is_exclusive, FeatureEntry};

/// Supported Features of a device, in device order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureCatalog {
    entries: Vec<FeatureEntry>,
    user_count: usize,
}

impl FeatureCatalog {
    /// Creates a catalog from enumerated entries.
    pub fn new(entries: Vec<FeatureEntry>) -> Self {
        let user_count = entries.iter().filter(|entry| !is_exclusive(&entry.uuid)).count();
        Self { entries, user_count }
    }

    /// Returns all entries, exclusive ones included.
    pub fn entries(&self) -> &[FeatureEntry] {
        &self.entries
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the device reported no Features.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of entries that may be shown to a less trusted caller.
    pub fn user_count(&self) -> usize {
        self.user_count
    }

    /// Finds the entry of a Feature.
    pub fn find(&self, uuid: &Uuid) -> Option<&FeatureEntry> {
        self.entries.iter().find(|entry| entry.uuid == *uuid)
    }

    /// Iterates the entries that may be shown to a less trusted caller.
    pub fn user_entries(&self) -> impl Iterator<Item = &FeatureEntry> {
        self.entries.iter().filter(|entry| !is_exclusive(&entry.uuid))
    }
}
