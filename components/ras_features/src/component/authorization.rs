//! Feature Command Authorization
//!
//! Decides whether a less trusted caller may send a Feature command to a device. Reads need the read-only scope and
//! a Feature the device reports.
//! A Set Feature is judged by the command effects the device reported for the Feature: changes that take effect
//! immediately need the highest scope, changes that only apply after a reset need the debug write scope, and
//! background commands are never allowed. Features reserved for the typed RAS operations are never reachable.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use ras_mailbox::catalog::FeatureCatalog;
use ras_mailbox::feature::{is_exclusive, CommandEffects};
use ras_mailbox::mailbox::Opcode;
use uuid::Uuid;

use crate::config::FeatureCapability;

/// Privilege of an RPC caller, in increasing order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RpcScope {
    /// Read device configuration.
    Configuration,
    /// Read debug information.
    DebugRead,
    /// Change the device in a way that takes hold after a reset.
    DebugWrite,
    /// Change the device immediately.
    DebugWriteFull,
}

/// Authorization of Feature commands against the catalog of one device.
pub struct AuthorizationGate<'a> {
    catalog: &'a FeatureCatalog,
    capability: FeatureCapability,
}

impl<'a> AuthorizationGate<'a> {
    pub fn new(catalog: &'a FeatureCatalog, capability: FeatureCapability) -> Self {
        Self { catalog, capability }
    }

    /// Returns whether a caller with `scope` may send `opcode`, naming `uuid` if the command carries one.
    pub fn is_allowed(&self, scope: RpcScope, opcode: Opcode, uuid: Option<&Uuid>) -> bool {
        if self.catalog.is_empty() {
            return false;
        }
        if let Some(uuid) = uuid {
            if is_exclusive(uuid) {
                log::debug!(target: "ras_feat", "Feature {} is reserved", uuid);
                return false;
            }
        }

        match opcode {
            Opcode::GetSupportedFeatures => self.may_read(scope),
            Opcode::GetFeature => self.may_read(scope) && uuid.is_some_and(|uuid| self.catalog.find(uuid).is_some()),
            Opcode::SetFeature => {
                self.capability >= FeatureCapability::ReadWrite && uuid.is_some_and(|uuid| self.may_set(scope, uuid))
            }
            Opcode::PerformMaintenance => false,
        }
    }

    fn may_read(&self, scope: RpcScope) -> bool {
        self.capability >= FeatureCapability::ReadOnly && scope >= RpcScope::Configuration
    }

    fn may_set(&self, scope: RpcScope, uuid: &Uuid) -> bool {
        let Some(entry) = self.catalog.find(uuid) else {
            return false;
        };
        if !entry.is_changeable() {
            return false;
        }

        let effects = entry.effects();
        if effects.has_reserved_bits() {
            log::warn!(target: "ras_feat", "Feature {} reports reserved effects {:#x}", uuid, entry.effects);
            return false;
        }
        if effects.contains(CommandEffects::BACKGROUND) {
            return false;
        }
        if effects.intersects(CommandEffects::IMMEDIATE) {
            return scope >= RpcScope::DebugWriteFull;
        }
        effects.intersects(CommandEffects::RESET) && scope >= RpcScope::DebugWrite
    }
}
