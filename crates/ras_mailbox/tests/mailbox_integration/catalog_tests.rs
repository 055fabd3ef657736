//! Feature Catalog Enumeration Tests
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0

use crate::mailbox_integration::common::*;

use ras_mailbox::feature::{is_exclusive, ECS_UUID, PATROL_SCRUB_UUID, SOFT_PPR_UUID};
use ras_mailbox::mailbox::{Opcode, ReturnCode};
use ras_mailbox::transport::FeatureTransport;
use ras_mailbox::MailboxError;
use uuid::Uuid;

fn populated_device(payload_size: usize, count: u16) -> SimulatedDevice {
    let device = SimulatedDevice::new(payload_size);
    for id in 0..count {
        device.add_feature(feature_entry(Uuid::from_u128(0x5000 + id as u128), id, 8), vec![0; 8]);
    }
    device
}

#[test]
fn test_pagination_returns_every_advertised_entry() {
    init_logging();

    for payload_size in [56, 104, 200, 1024, 4096] {
        for count in [1u16, 2, 5, 21, 64] {
            let device = populated_device(payload_size, count);
            let catalog = FeatureTransport::new(&device).get_supported_features(0).unwrap();

            assert_eq!(catalog.len(), count as usize, "payload {payload_size}");
            let ids: Vec<u16> = catalog.entries().iter().map(|e| e.id).collect();
            assert_eq!(ids, (0..count).collect::<Vec<_>>());
        }
    }
}

#[test]
fn test_pagination_recovers_from_short_pages() {
    init_logging();

    let device = populated_device(1024, 30);
    device.set_page_limit(7);
    let catalog = FeatureTransport::new(&device).get_supported_features(0).unwrap();

    assert_eq!(catalog.len(), 30);
    // One count probe plus ceil(30 / 7) pages.
    assert_eq!(device.count(Opcode::GetSupportedFeatures), 1 + 5);
}

#[test]
fn test_catalog_separates_exclusive_features() {
    let device = SimulatedDevice::new(1024);
    device.add_feature(feature_entry(PATROL_SCRUB_UUID, 0, 4), vec![0; 4]);
    device.add_feature(feature_entry(Uuid::from_u128(0xfeed), 1, 4), vec![0; 4]);
    device.add_feature(feature_entry(ECS_UUID, 2, 9), vec![0; 9]);
    device.add_feature(feature_entry(SOFT_PPR_UUID, 3, 20), vec![0; 20]);

    let catalog = FeatureTransport::new(&device).get_supported_features(0).unwrap();
    assert_eq!(catalog.len(), 4);
    assert_eq!(catalog.user_count(), 1);
    assert!(catalog.user_entries().all(|entry| !is_exclusive(&entry.uuid)));
}

#[test]
fn test_enumeration_failure_is_reported() {
    let device = populated_device(1024, 4);
    device.fail_nth(Opcode::GetSupportedFeatures, 1, ReturnCode::InternalError);

    let result = FeatureTransport::new(&device).get_supported_features(0);
    assert_eq!(result, Err(MailboxError::Device(ReturnCode::InternalError)));
}

#[test]
fn test_payload_too_small_for_any_entry() {
    let device = populated_device(48, 4);
    let result = FeatureTransport::new(&device).get_supported_features(0);
    assert_eq!(result, Err(MailboxError::PayloadTooSmall));
}
