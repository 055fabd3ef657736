//! Memory RAS Feature Control
//!
//! Discovers the memory reliability, availability and serviceability (RAS) features of CXL memory devices and of the
//! platform, and exposes them as typed operations:
//!
//! - Patrol scrub of a device, of every device of an interleaved region, or of the platform through ACPI RAS2.
//! - Error check scrub (ECS) per field replaceable unit.
//! - Post package repair (PPR) and memory sparing, staged one attribute at a time and then executed.
//!
//! Device Features are reached through the [`ras_mailbox`] Feature commands and platform scrubbers through the
//! [`ras_pcc`] subspaces. The [`component::registry::FeatureRegistry`] enumerates both and hands out one context per
//! feature instance. Repairs that may disturb the media are refused while the target address belongs to a region in
//! [`region::RegionTopology`].
//!
//! Less trusted callers reach the remaining device Features through [`component::fwctl::FeatureGateway`], which
//! filters every command through [`component::authorization::AuthorizationGate`].
//!
//! ## Logging
//!
//! Detailed logging is available for this crate using the `ras_feat` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

extern crate alloc;

pub mod component;
pub mod config;
pub mod error;
pub mod region;
pub mod service;

pub use error::{RasError, Result};
