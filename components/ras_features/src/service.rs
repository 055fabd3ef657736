//! RAS Feature Services
//!
//! The operation interfaces a control surface calls on a registered feature instance. Each feature class has one
//! trait. Every trait method that a given implementation does not provide returns [`RasError::NotSupported`], and
//! the `operations` method of each trait reports which methods are provided so that a caller can decide once, at
//! registration, which named endpoints to expose.
//!
//! [`RasError::NotSupported`]: crate::error::RasError::NotSupported
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
pub mod ecs;
pub mod repair;
pub mod scrub;

pub use ecs::{EcsCountMode, EcsLogEntryType, EcsOperations, EcsOps};
pub use repair::{MemRepairOps, PersistMode, RepairOperations, RepairTarget, RepairType};
pub use scrub::{ScrubOperations, ScrubOps};

/// Seconds per hour. Devices report scrub cycles in hours, operations use seconds.
pub const HOUR_IN_SECS: u32 = 3600;
