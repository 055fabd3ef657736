//! Restricted Feature RPC Gateway
//!
//! Lets a less trusted caller, such as a user space configuration tool, enumerate and access the Features of a
//! device that are not reserved for the typed RAS operations. Every request is checked by the
//! [`AuthorizationGate`] before it reaches the device. Get Supported Features is served from the catalog cached at
//! registration, so only the user visible entries are ever returned.
//!
//! A request carries a command identifier and the input payload of the matching mailbox command. The response
//! carries the device return code in `retval` and the output payload.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
extern crate alloc;
use alloc::{sync::Arc, vec::Vec};

use ras_mailbox::feature::{FeatureEntry, GetFeatureIn, GetSupportedFeaturesIn, GetSupportedFeaturesOutHeader, SetFeatureHeader};
use ras_mailbox::mailbox::Opcode;
use ras_mailbox::MailboxError;
use scroll::{Pread, Pwrite, LE};

use crate::component::authorization::{AuthorizationGate, RpcScope};
use crate::component::device::RasDevice;
use crate::error::{RasError, Result};

/// Commands a caller may send through the gateway.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum FeatureCommandId {
    GetSupportedFeatures = 0,
    GetFeature = 1,
    SetFeature = 2,
}

impl TryFrom<u32> for FeatureCommandId {
    type Error = RasError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(FeatureCommandId::GetSupportedFeatures),
            1 => Ok(FeatureCommandId::GetFeature),
            2 => Ok(FeatureCommandId::SetFeature),
            _ => Err(RasError::InvalidArgument),
        }
    }
}

impl FeatureCommandId {
    pub fn opcode(&self) -> Opcode {
        match self {
            FeatureCommandId::GetSupportedFeatures => Opcode::GetSupportedFeatures,
            FeatureCommandId::GetFeature => Opcode::GetFeature,
            FeatureCommandId::SetFeature => Opcode::SetFeature,
        }
    }
}

/// An RPC request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RpcRequest<'a> {
    /// Raw [`FeatureCommandId`].
    pub command_id: u32,
    /// Input payload of the mailbox command.
    pub payload: &'a [u8],
}

/// An RPC response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResponse {
    /// Device return code, zero on success.
    pub retval: u32,
    pub payload: Vec<u8>,
}

impl RpcResponse {
    fn success(payload: Vec<u8>) -> Self {
        Self { retval: 0, payload }
    }

    /// Encodes the response as payload size, return value and payload, little endian.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = alloc::vec![0u8; 8 + self.payload.len()];
        let mut offset = 0;
        bytes.gwrite_with(self.payload.len() as u32, &mut offset, LE)?;
        bytes.gwrite_with(self.retval, &mut offset, LE)?;
        bytes[offset..].copy_from_slice(&self.payload);
        Ok(bytes)
    }
}

/// Static information about the gateway of a device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FwctlInfo {
    /// Number of Features a caller can see.
    pub user_features: usize,
}

/// Restricted RPC access to the Features of one device.
pub struct FeatureGateway {
    device: Arc<RasDevice>,
}

impl FeatureGateway {
    pub fn new(device: Arc<RasDevice>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &Arc<RasDevice> {
        &self.device
    }

    /// Returns the gateway information, or [`RasError::NotSupported`] if no Feature is visible to a caller.
    pub fn info(&self) -> Result<FwctlInfo> {
        match self.device.catalog().user_count() {
            0 => Err(RasError::NotSupported),
            user_features => Ok(FwctlInfo { user_features }),
        }
    }

    /// Validates, authorizes and executes a request.
    ///
    /// A command the device fails is reported through the response `retval`, every other failure is an error.
    pub fn rpc(&self, scope: RpcScope, request: &RpcRequest<'_>) -> Result<RpcResponse> {
        let command = FeatureCommandId::try_from(request.command_id)?;
        let payload = request.payload;
        let gate = AuthorizationGate::new(self.device.catalog(), self.device.capability());

        let result = match command {
            FeatureCommandId::GetSupportedFeatures => {
                if payload.len() != GetSupportedFeaturesIn::SIZE {
                    return Err(RasError::InvalidArgument);
                }
                let input: GetSupportedFeaturesIn = payload.pread_with(0, LE)?;
                self.authorize(&gate, scope, command, None)?;
                return self.get_supported_features(&input);
            }
            FeatureCommandId::GetFeature => {
                if payload.len() != GetFeatureIn::SIZE {
                    return Err(RasError::InvalidArgument);
                }
                let input: GetFeatureIn = payload.pread_with(0, LE)?;
                if input.count == 0 {
                    return Err(RasError::InvalidArgument);
                }
                if self.device.catalog().find(&input.uuid).is_none() {
                    log::debug!(target: "ras_feat", "Device {}: Feature {} not supported", self.device.id(), input.uuid);
                    return Err(RasError::InvalidArgument);
                }
                self.authorize(&gate, scope, command, Some(&input.uuid))?;
                self.device
                    .transport()
                    .get_feature(&input.uuid, input.selection, input.count as usize, input.offset)
                    .map(RpcResponse::success)
            }
            FeatureCommandId::SetFeature => {
                if payload.len() <= SetFeatureHeader::SIZE {
                    return Err(RasError::InvalidArgument);
                }
                let header: SetFeatureHeader = payload.pread_with(0, LE)?;
                self.authorize(&gate, scope, command, Some(&header.uuid))?;
                self.device
                    .transport()
                    .set_feature(&header.uuid, header.version, &payload[SetFeatureHeader::SIZE..], header.flags, header.offset)
                    .map(|()| RpcResponse::success(Vec::new()))
            }
        };

        match result {
            Ok(response) => Ok(response),
            Err(MailboxError::Device(rc)) => {
                log::debug!(target: "ras_feat", "Device {}: {:?} returned {:?}", self.device.id(), command, rc);
                Ok(RpcResponse { retval: rc.as_u16() as u32, payload: Vec::new() })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn authorize(
        &self,
        gate: &AuthorizationGate<'_>,
        scope: RpcScope,
        command: FeatureCommandId,
        uuid: Option<&uuid::Uuid>,
    ) -> Result<()> {
        if gate.is_allowed(scope, command.opcode(), uuid) {
            return Ok(());
        }
        log::warn!(target: "ras_feat", "Device {}: {:?} denied at {:?} scope", self.device.id(), command, scope);
        Err(RasError::PermissionDenied)
    }

    /// Serves a page of the user visible catalog.
    fn get_supported_features(&self, input: &GetSupportedFeaturesIn) -> Result<RpcResponse> {
        let catalog = self.device.catalog();
        let user_count = catalog.user_count();
        let start = input.start_index as usize;
        if start >= user_count {
            return Err(RasError::InvalidArgument);
        }

        let requested = (input.count as usize / FeatureEntry::SIZE).min(user_count - start);
        let header = GetSupportedFeaturesOutHeader {
            num_entries: requested as u16,
            supported_features: user_count as u16,
            reserved: 0,
        };

        let mut payload = alloc::vec![0u8; GetSupportedFeaturesOutHeader::SIZE + requested * FeatureEntry::SIZE];
        let mut offset = 0;
        payload.gwrite_with(header, &mut offset, LE)?;
        for entry in catalog.user_entries().skip(start).take(requested) {
            payload.gwrite_with(*entry, &mut offset, LE)?;
        }
        Ok(RpcResponse::success(payload))
    }
}
