//! ACPI RAS2 Platform Communication Channel Transport
//!
//! Platforms that implement the ACPI RAS2 table let the OS drive memory RAS features, such as a hardware patrol
//! scrubber, through a Platform Communication Channel (PCC) subspace. A subspace is a shared memory region plus a
//! doorbell:
//!
//! 1. The OS waits until the platform has completed the previous command (status register, completion bit).
//! 2. The OS writes the feature parameter block and the command word, clears the status register and rings the
//!    doorbell.
//! 3. The platform processes the command and sets the completion bit, or the error bit together with a capability
//!    status.
//!
//! The shared memory is single buffered, so every command on a subspace is serialized by one lock, even when several
//! devices share the subspace. A subspace also carries two platform declared timing limits, the minimum request
//! turnaround time (MRTT) and the maximum periodic access rate (MPAR), which [`subspace::PccSubspace`] enforces.
//!
//! Subspaces are reference counted by a [`registry::PccSubspaceRegistry`]; the underlying channel is requested from the
//! platform [`channel::PccProvider`] on first use and freed when the last handle is dropped.
//!
//! ## Logging
//!
//! Detailed logging is available for this crate using the `ras2_pcc` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

extern crate alloc;

pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod patrol_scrub;
pub mod registry;
pub mod shared_memory;
pub mod subspace;
pub mod table;

pub use error::{PccError, Result};
