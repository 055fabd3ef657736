//! RAS Feature Components
//!
//! Implementations of the [`service`](crate::service) traits for CXL memory devices, regions and ACPI RAS2 platform
//! scrubbers, the [`registry::FeatureRegistry`] that creates them, and the restricted Feature command gateway exposed
//! to less trusted callers.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
pub mod authorization;
pub mod device;
pub mod ecs;
pub mod fwctl;
pub mod patrol_scrub;
pub mod ppr;
pub mod ras2_scrub;
pub mod registry;
pub(crate) mod repair;
pub mod sparing;

#[cfg(test)]
pub(crate) mod test_support;
