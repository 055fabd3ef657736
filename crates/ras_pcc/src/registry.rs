//! PCC Subspace Registry
//!
//! Hands out shared, reference counted [`PccSubspace`] instances keyed by platform subspace identifier. The first
//! request for an identifier obtains the channel from the [`PccProvider`]; the channel is returned to the provider when
//! the last [`PccSubspaceHandle`] for it is dropped.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
extern crate alloc;
use alloc::{collections::BTreeMap, sync::Arc};
use core::ops::Deref;

use spin::Mutex;

use crate::channel::PccProvider;
use crate::clock::Clock;
use crate::config::PccConfig;
use crate::error::Result;
use crate::subspace::PccSubspace;

struct Slot {
    subspace: Arc<PccSubspace>,
    ref_count: usize,
}

struct RegistryInner {
    provider: Arc<dyn PccProvider>,
    clock: Arc<dyn Clock>,
    config: PccConfig,
    slots: Mutex<BTreeMap<u32, Slot>>,
}

/// Registry of the PCC subspaces in use.
#[derive(Clone)]
pub struct PccSubspaceRegistry {
    inner: Arc<RegistryInner>,
}

impl PccSubspaceRegistry {
    /// Creates an empty registry.
    pub fn new(provider: Arc<dyn PccProvider>, clock: Arc<dyn Clock>, config: PccConfig) -> Self {
        Self { inner: Arc::new(RegistryInner { provider, clock, config, slots: Mutex::new(BTreeMap::new()) }) }
    }

    /// Returns a handle to the subspace with the given identifier, requesting the channel from the platform if no
    /// handle to it is alive.
    pub fn acquire(&self, subspace_id: u32) -> Result<PccSubspaceHandle> {
        let mut slots = self.inner.slots.lock();

        if let Some(slot) = slots.get_mut(&subspace_id) {
            slot.ref_count += 1;
            log::debug!(target: "ras2_pcc", "Subspace {} shared, {} users", subspace_id, slot.ref_count);
            return Ok(PccSubspaceHandle { inner: self.inner.clone(), subspace: slot.subspace.clone() });
        }

        let info = self.inner.provider.request_channel(subspace_id).map_err(|err| {
            log::error!(target: "ras2_pcc", "Failed to request subspace {}: {}", subspace_id, err);
            err
        })?;
        log::info!(
            target: "ras2_pcc",
            "Subspace {}: latency {}us, turnaround {}us, access rate {}/window",
            subspace_id,
            info.latency_us,
            info.min_turnaround_us,
            info.max_access_rate
        );

        let subspace = Arc::new(PccSubspace::new(subspace_id, info, self.inner.config, self.inner.clock.clone()));
        slots.insert(subspace_id, Slot { subspace: subspace.clone(), ref_count: 1 });
        Ok(PccSubspaceHandle { inner: self.inner.clone(), subspace })
    }

    /// Returns the number of live handles to a subspace.
    pub fn ref_count(&self, subspace_id: u32) -> usize {
        self.inner.slots.lock().get(&subspace_id).map_or(0, |slot| slot.ref_count)
    }

    /// Returns the number of subspaces in use.
    pub fn len(&self) -> usize {
        self.inner.slots.lock().len()
    }

    /// Returns whether no subspace is in use.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A counted reference to a shared subspace.
pub struct PccSubspaceHandle {
    inner: Arc<RegistryInner>,
    subspace: Arc<PccSubspace>,
}

impl Deref for PccSubspaceHandle {
    type Target = PccSubspace;

    fn deref(&self) -> &Self::Target {
        &self.subspace
    }
}

impl Clone for PccSubspaceHandle {
    fn clone(&self) -> Self {
        let mut slots = self.inner.slots.lock();
        if let Some(slot) = slots.get_mut(&self.subspace.id()) {
            slot.ref_count += 1;
        }
        Self { inner: self.inner.clone(), subspace: self.subspace.clone() }
    }
}

impl Drop for PccSubspaceHandle {
    fn drop(&mut self) {
        let id = self.subspace.id();
        let mut slots = self.inner.slots.lock();
        let Some(slot) = slots.get_mut(&id) else {
            return;
        };

        slot.ref_count = slot.ref_count.saturating_sub(1);
        if slot.ref_count == 0 {
            slots.remove(&id);
            log::debug!(target: "ras2_pcc", "Subspace {} released", id);
            self.inner.provider.free_channel(id);
        }
    }
}
