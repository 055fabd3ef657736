//! RAS Feature Registry
//!
//! Discovers the memory RAS features of memory devices, regions and the platform, and keeps one typed context per
//! feature instance.
//!
//! Registering a memory device enumerates its Feature catalog. Each changeable Feature that belongs to a known
//! class becomes a context of that class: patrol scrub, error check scrub, or repair (PPR and sparing). Instances
//! are numbered from zero per device and class, in catalog order, and PPR and sparing share the repair numbering.
//! The catalog stays attached to the device so the restricted RPC gateway can serve it.
//!
//! A region gets one patrol scrub context spanning all of its targets. The platform patrol scrubbers described by
//! the ACPI RAS2 table get one context per PCC subspace.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
extern crate alloc;
use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicU32, Ordering};

use ras_mailbox::catalog::FeatureCatalog;
use ras_mailbox::feature::{FeatureEntry, ECS_UUID, HARD_PPR_UUID, PATROL_SCRUB_UUID, SOFT_PPR_UUID};
use ras_mailbox::mailbox::CommandMailbox;
use ras_mailbox::transport::FeatureTransport;
use ras_pcc::registry::PccSubspaceRegistry;
use ras_pcc::table::Ras2Table;
use spin::RwLock;

use crate::component::device::{FeatureContext, RasDevice};
use crate::component::ecs::CxlEcs;
use crate::component::fwctl::FeatureGateway;
use crate::component::patrol_scrub::CxlPatrolScrub;
use crate::component::ppr::CxlPpr;
use crate::component::ras2_scrub::Ras2PatrolScrub;
use crate::component::sparing::{sparing_type, CxlSparing};
use crate::config::{FeatureCapability, RasConfig};
use crate::error::{RasError, Result};
use crate::region::RegionTopology;
use crate::service::ecs::{EcsOperations, EcsOps};
use crate::service::repair::{MemRepairOps, RepairOperations};
use crate::service::scrub::{ScrubOperations, ScrubOps};

/// A feature instance, tagged by class.
#[derive(Clone)]
pub enum RasFeature {
    Scrub(Arc<dyn ScrubOps>),
    ErrorCheckScrub(Arc<dyn EcsOps>),
    Repair(Arc<dyn MemRepairOps>),
    Sparing(Arc<dyn MemRepairOps>),
}

impl RasFeature {
    /// Returns the operations the instance provides.
    pub fn operations(&self) -> FeatureOperations {
        match self {
            RasFeature::Scrub(ops) => FeatureOperations::Scrub(ops.operations()),
            RasFeature::ErrorCheckScrub(ops) => FeatureOperations::ErrorCheckScrub(ops.operations()),
            RasFeature::Repair(ops) | RasFeature::Sparing(ops) => FeatureOperations::Repair(ops.operations()),
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            RasFeature::Scrub(_) => "scrub",
            RasFeature::ErrorCheckScrub(_) => "ecs",
            RasFeature::Repair(_) => "repair",
            RasFeature::Sparing(_) => "sparing",
        }
    }

    pub fn as_scrub(&self) -> Option<&Arc<dyn ScrubOps>> {
        match self {
            RasFeature::Scrub(ops) => Some(ops),
            _ => None,
        }
    }

    pub fn as_ecs(&self) -> Option<&Arc<dyn EcsOps>> {
        match self {
            RasFeature::ErrorCheckScrub(ops) => Some(ops),
            _ => None,
        }
    }

    /// Returns the repair operations of a PPR or sparing instance.
    pub fn as_repair(&self) -> Option<&Arc<dyn MemRepairOps>> {
        match self {
            RasFeature::Repair(ops) | RasFeature::Sparing(ops) => Some(ops),
            _ => None,
        }
    }
}

/// Operation set of a feature instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FeatureOperations {
    Scrub(ScrubOperations),
    ErrorCheckScrub(EcsOperations),
    Repair(RepairOperations),
}

/// A registered feature instance.
#[derive(Clone)]
pub struct RegisteredFeature {
    instance: u32,
    feature: RasFeature,
    operations: FeatureOperations,
}

impl RegisteredFeature {
    fn new(instance: u32, feature: RasFeature) -> Self {
        let operations = feature.operations();
        Self { instance, feature, operations }
    }

    /// Returns the instance number within the class.
    pub fn instance(&self) -> u32 {
        self.instance
    }

    pub fn feature(&self) -> &RasFeature {
        &self.feature
    }

    /// Returns the operations computed at registration.
    pub fn operations(&self) -> FeatureOperations {
        self.operations
    }
}

struct MemdevEntry {
    device: Arc<RasDevice>,
    features: Vec<RegisteredFeature>,
}

/// Next instance number of each class of one device.
#[derive(Default)]
struct InstanceCounters {
    scrub: u32,
    ecs: u32,
    repair: u32,
}

fn next(counter: &mut u32) -> Result<u32> {
    let instance = *counter;
    *counter = counter.checked_add(1).ok_or(RasError::InvalidArgument)?;
    Ok(instance)
}

/// Registry of the RAS feature instances of memory devices, regions and the platform.
pub struct FeatureRegistry {
    config: RasConfig,
    topology: Arc<RegionTopology>,
    devices: RwLock<BTreeMap<u32, MemdevEntry>>,
    regions: RwLock<BTreeMap<u32, RegisteredFeature>>,
    next_region_instance: AtomicU32,
    platform: RwLock<Vec<RegisteredFeature>>,
}

impl FeatureRegistry {
    pub fn new(config: RasConfig, topology: Arc<RegionTopology>) -> Self {
        Self {
            config,
            topology,
            devices: RwLock::new(BTreeMap::new()),
            regions: RwLock::new(BTreeMap::new()),
            next_region_instance: AtomicU32::new(0),
            platform: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &RasConfig {
        &self.config
    }

    pub fn topology(&self) -> &Arc<RegionTopology> {
        &self.topology
    }

    /// Enumerates the Features of a memory device and registers a context for each supported RAS feature.
    ///
    /// A device without Feature command support is registered with an empty catalog.
    pub fn register_memdev(&self, id: u32, mailbox: Arc<dyn CommandMailbox>, dpa_size: u64) -> Result<Arc<RasDevice>> {
        if self.devices.read().contains_key(&id) {
            log::error!(target: "ras_feat", "Device {} already registered", id);
            return Err(RasError::InvalidArgument);
        }

        let capability = self.config.feature_capability;
        let catalog = if capability >= FeatureCapability::ReadOnly {
            FeatureTransport::new(mailbox.as_ref()).get_supported_features(self.config.get_supported_features_hint)?
        } else {
            FeatureCatalog::default()
        };
        log::info!(
            target: "ras_feat",
            "Device {}: {} Features, {} visible to callers",
            id,
            catalog.len(),
            catalog.user_count()
        );

        let device = Arc::new(RasDevice::new(id, mailbox, catalog, capability, dpa_size));
        let features = self.create_features(&device)?;

        let mut devices = self.devices.write();
        if devices.contains_key(&id) {
            return Err(RasError::InvalidArgument);
        }
        devices.insert(id, MemdevEntry { device: device.clone(), features });
        Ok(device)
    }

    fn create_features(&self, device: &Arc<RasDevice>) -> Result<Vec<RegisteredFeature>> {
        let mut counters = InstanceCounters::default();
        let mut features = Vec::new();
        let entries: Vec<FeatureEntry> = device.catalog().entries().to_vec();

        for entry in entries {
            if !entry.is_changeable() {
                log::debug!(target: "ras_feat", "Device {}: Feature {} is not changeable", device.id(), entry.uuid);
                continue;
            }
            let uuid = entry.uuid;

            if uuid == PATROL_SCRUB_UUID && self.config.enable_scrub {
                let instance = next(&mut counters.scrub)?;
                let context = FeatureContext::new(device.clone(), entry, instance);
                features.push(RegisteredFeature::new(instance, RasFeature::Scrub(Arc::new(CxlPatrolScrub::new(context)))));
            } else if uuid == ECS_UUID && self.config.enable_ecs {
                let context = FeatureContext::new(device.clone(), entry, counters.ecs);
                if let Some(ecs) = CxlEcs::new(context) {
                    let instance = next(&mut counters.ecs)?;
                    features.push(RegisteredFeature::new(instance, RasFeature::ErrorCheckScrub(Arc::new(ecs))));
                }
            } else if (uuid == SOFT_PPR_UUID || uuid == HARD_PPR_UUID) && self.config.enable_repair {
                let instance = next(&mut counters.repair)?;
                let context = FeatureContext::new(device.clone(), entry, instance);
                let ppr = CxlPpr::new(context, self.topology.clone())?;
                features.push(RegisteredFeature::new(instance, RasFeature::Repair(Arc::new(ppr))));
            } else if sparing_type(&uuid).is_some() && self.config.enable_repair {
                let instance = next(&mut counters.repair)?;
                let context = FeatureContext::new(device.clone(), entry, instance);
                let sparing = CxlSparing::new(context, self.topology.clone())?;
                features.push(RegisteredFeature::new(instance, RasFeature::Sparing(Arc::new(sparing))));
            }
        }

        for feature in &features {
            log::info!(
                target: "ras_feat",
                "Device {}: {}{} registered",
                device.id(),
                feature.feature.class_name(),
                feature.instance
            );
        }
        Ok(features)
    }

    /// Removes a memory device and its feature instances.
    pub fn unregister_memdev(&self, id: u32) -> Option<Arc<RasDevice>> {
        let entry = self.devices.write().remove(&id)?;
        log::info!(target: "ras_feat", "Device {}: {} feature instances removed", id, entry.features.len());
        Some(entry.device)
    }

    pub fn device(&self, id: u32) -> Option<Arc<RasDevice>> {
        self.devices.read().get(&id).map(|entry| entry.device.clone())
    }

    /// Returns the feature instances of a memory device.
    pub fn features(&self, id: u32) -> Vec<RegisteredFeature> {
        self.devices.read().get(&id).map(|entry| entry.features.clone()).unwrap_or_default()
    }

    /// Returns the restricted RPC gateway of a memory device.
    pub fn gateway(&self, id: u32) -> Option<FeatureGateway> {
        self.device(id).map(FeatureGateway::new)
    }

    /// Registers a patrol scrub context over every target of a committed region.
    ///
    /// Every target must be a registered device with a changeable Patrol Scrub Feature.
    pub fn register_scrub_region(&self, region_id: u32) -> Result<RegisteredFeature> {
        if !self.config.enable_scrub {
            return Err(RasError::NotSupported);
        }
        let Some(region) = self.topology.region(region_id) else {
            log::error!(target: "ras_feat", "Region {} not found", region_id);
            return Err(RasError::InvalidArgument);
        };

        let instance = self
            .next_region_instance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| next.checked_add(1))
            .map_err(|_| RasError::InvalidArgument)?;
        let mut targets = Vec::with_capacity(region.targets.len());
        {
            let devices = self.devices.read();
            for target in &region.targets {
                let Some(memdev) = devices.get(&target.device) else {
                    log::error!(target: "ras_feat", "Region {}: device {} not registered", region_id, target.device);
                    return Err(RasError::InvalidArgument);
                };
                let entry = match memdev.device.catalog().find(&PATROL_SCRUB_UUID) {
                    Some(entry) if entry.is_changeable() => *entry,
                    _ => {
                        log::info!(target: "ras_feat", "Region {}: device {} cannot scrub", region_id, target.device);
                        return Err(RasError::NotSupported);
                    }
                };
                targets.push(FeatureContext::new(memdev.device.clone(), entry, instance));
            }
        }

        let scrub = CxlPatrolScrub::for_region(region_id, targets)?;
        let feature = RegisteredFeature::new(instance, RasFeature::Scrub(Arc::new(scrub)));

        let mut regions = self.regions.write();
        if regions.contains_key(&region_id) {
            return Err(RasError::InvalidArgument);
        }
        regions.insert(region_id, feature.clone());
        log::info!(target: "ras_feat", "Region {}: scrub over {} devices registered", region_id, region.targets.len());
        Ok(feature)
    }

    /// Removes the scrub context of a region. Returns whether one was registered.
    pub fn unregister_scrub_region(&self, region_id: u32) -> bool {
        self.regions.write().remove(&region_id).is_some()
    }

    pub fn region_scrub(&self, region_id: u32) -> Option<RegisteredFeature> {
        self.regions.read().get(&region_id).cloned()
    }

    /// Registers a platform patrol scrub context for each memory PCC subspace of the RAS2 table.
    ///
    /// Subspaces without a patrol scrubber are skipped. Returns the number of contexts registered.
    pub fn register_ras2(&self, table: &Ras2Table, subspaces: &PccSubspaceRegistry) -> Result<usize> {
        if !self.config.enable_scrub {
            return Err(RasError::NotSupported);
        }
        if !self.platform.read().is_empty() {
            log::error!(target: "ras_feat", "RAS2 scrub contexts already registered");
            return Err(RasError::InvalidArgument);
        }

        let mut features = Vec::new();
        for descriptor in table.memory_descriptors() {
            let subspace = subspaces.acquire(descriptor.channel_id as u32)?;
            match Ras2PatrolScrub::new(subspace, descriptor.instance) {
                Ok(scrub) => {
                    let instance = features.len() as u32;
                    features.push(RegisteredFeature::new(instance, RasFeature::Scrub(Arc::new(scrub))));
                }
                Err(RasError::NotSupported) => continue,
                Err(err) => {
                    log::error!(target: "ras_feat", "Subspace {}: RAS2 scrub failed: {}", descriptor.channel_id, err);
                    return Err(err);
                }
            }
        }

        let count = features.len();
        *self.platform.write() = features;
        log::info!(target: "ras_feat", "{} RAS2 patrol scrub contexts registered", count);
        Ok(count)
    }

    /// Removes the platform patrol scrub contexts, releasing their subspaces.
    pub fn unregister_ras2(&self) {
        self.platform.write().clear();
    }

    pub fn ras2_features(&self) -> Vec<RegisteredFeature> {
        self.platform.read().clone()
    }
}
