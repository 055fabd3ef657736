//! CXL Mailbox Feature Transport
//!
//! Memory devices that follow the CXL command interface expose their RAS controls (patrol scrub, error check scrub,
//! post package repair and memory sparing) as "Features". A Feature is identified by a UUID and is read and written
//! through three mailbox commands:
//!
//! - **Get Supported Features** (`0x0500`) enumerates the Feature catalog of the device, one page at a time.
//! - **Get Feature** (`0x0501`) reads the attribute record of a Feature.
//! - **Set Feature** (`0x0502`) writes the attribute record of a Feature.
//!
//! A device mailbox has a fixed payload size. Records larger than that payload are moved in chunks, with Set Feature
//! tagging every chunk with its position in the transfer. Repair operations are triggered with the **Perform
//! Maintenance** (`0x0600`) command.
//!
//! This crate does not talk to hardware. The owner of a device implements [`mailbox::CommandMailbox`] for its
//! mailbox registers and hands it to a [`transport::FeatureTransport`], which implements the Feature protocol on top.
//! The mailbox is assumed to already be serialized by its owner; the transport adds no locking.
//!
//! ## Examples and Usage
//!
//! ```rust
//! use ras_mailbox::feature::{GetFeatureSelection, PATROL_SCRUB_UUID};
//! use ras_mailbox::mailbox::CommandMailbox;
//! use ras_mailbox::transport::FeatureTransport;
//!
//! fn read_patrol_scrub(mailbox: &dyn CommandMailbox) -> ras_mailbox::Result<()> {
//!     let transport = FeatureTransport::new(mailbox);
//!     let catalog = transport.get_supported_features(0)?;
//!     if let Some(entry) = catalog.find(&PATROL_SCRUB_UUID) {
//!         let record = transport.get_feature(&entry.uuid, GetFeatureSelection::Current, entry.get_size as usize, 0)?;
//!         log::info!("patrol scrub record: {:x?}", record);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! Detailed logging is available for this crate using the `cxl_mbox` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

extern crate alloc;

pub mod catalog;
pub mod error;
pub mod feature;
pub mod mailbox;
pub mod transport;

pub use error::{MailboxError, Result};
