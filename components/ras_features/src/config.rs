//! RAS Feature Configuration
//!
//! Registration time settings of a [`FeatureRegistry`](crate::component::registry::FeatureRegistry).
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!

/// Availability of the Feature commands on a device, as reported by its command effects log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum FeatureCapability {
    /// The device does not implement the Feature commands.
    None,
    /// Get Supported Features and Get Feature are implemented.
    ReadOnly,
    /// All Feature commands are implemented.
    #[default]
    ReadWrite,
}

/// RAS feature registration configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RasConfig {
    /// Feature command availability of the devices being registered.
    pub feature_capability: FeatureCapability,
    /// Register patrol scrub contexts.
    pub enable_scrub: bool,
    /// Register error check scrub contexts.
    pub enable_ecs: bool,
    /// Register post package repair and memory sparing contexts.
    pub enable_repair: bool,
    /// Number of supported Features to enumerate. Zero asks the device.
    pub get_supported_features_hint: usize,
}

impl Default for RasConfig {
    fn default() -> Self {
        RasConfig {
            feature_capability: FeatureCapability::ReadWrite,
            enable_scrub: true,
            enable_ecs: true,
            enable_repair: true,
            get_supported_features_hint: 0,
        }
    }
}

impl RasConfig {
    pub fn with_feature_capability(mut self, capability: FeatureCapability) -> Self {
        self.feature_capability = capability;
        self
    }

    pub fn with_scrub(mut self, enable: bool) -> Self {
        self.enable_scrub = enable;
        self
    }

    pub fn with_ecs(mut self, enable: bool) -> Self {
        self.enable_ecs = enable;
        self
    }

    pub fn with_repair(mut self, enable: bool) -> Self {
        self.enable_repair = enable;
        self
    }

    pub fn with_supported_features_hint(mut self, count: usize) -> Self {
        self.get_supported_features_hint = count;
        self
    }
}
