//! RAS Feature Errors
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use core::fmt;

use ras_mailbox::mailbox::ReturnCode;
use ras_mailbox::MailboxError;
use ras_pcc::PccError;

/// Errors returned by RAS feature operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RasError {
    /// A device response or record did not have the expected layout.
    Protocol,
    /// A transfer or firmware command did not complete.
    Io,
    /// The hardware or firmware is busy. The caller may retry later.
    Busy,
    /// The hardware reported the capability as not valid or not supported, or the caller lacks the privilege.
    PermissionDenied,
    /// The operation is not implemented by this feature.
    NotSupported,
    /// A value is not one of the values the feature accepts.
    InvalidValue { what: &'static str, value: u64 },
    /// A value is outside of the bounds reported by the device.
    OutOfRange { what: &'static str, value: u64, min: u64, max: u64 },
    /// A repair was requested before a target address was staged.
    NoTarget,
    /// The repair target is mapped into a live region.
    AddressMapped { dpa: u64 },
    /// The device completed the command with a failure return code.
    Device(ReturnCode),
    /// The request is malformed.
    InvalidArgument,
}

impl RasError {
    /// Returns whether the failure is transient and the operation may succeed when retried later.
    pub fn is_busy(&self) -> bool {
        matches!(self, RasError::Busy | RasError::AddressMapped { .. } | RasError::Device(ReturnCode::Busy))
    }
}

impl fmt::Display for RasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RasError::Protocol => write!(f, "malformed feature data"),
            RasError::Io => write!(f, "feature command did not complete"),
            RasError::Busy => write!(f, "feature busy"),
            RasError::PermissionDenied => write!(f, "operation not permitted"),
            RasError::NotSupported => write!(f, "operation not supported"),
            RasError::InvalidValue { what, value } => write!(f, "invalid {}: {}", what, value),
            RasError::OutOfRange { what, value, min, max } => {
                write!(f, "{} {} outside of [{}, {}]", what, value, min, max)
            }
            RasError::NoTarget => write!(f, "no repair target staged"),
            RasError::AddressMapped { dpa } => write!(f, "DPA {:#x} is mapped into a region", dpa),
            RasError::Device(rc) => write!(f, "device returned {:?}", rc),
            RasError::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

impl From<MailboxError> for RasError {
    fn from(err: MailboxError) -> Self {
        match err {
            MailboxError::Device(
                ReturnCode::Unsupported
                | ReturnCode::UnsupportedMailbox
                | ReturnCode::UnsupportedFeatureVersion
                | ReturnCode::UnsupportedFeatureSelection,
            ) => RasError::PermissionDenied,
            MailboxError::Device(rc) => RasError::Device(rc),
            MailboxError::Protocol | MailboxError::PayloadTooSmall => RasError::Protocol,
            MailboxError::Io | MailboxError::Transport => RasError::Io,
            MailboxError::InvalidArgument => RasError::InvalidArgument,
        }
    }
}

impl From<PccError> for RasError {
    fn from(err: PccError) -> Self {
        match err {
            PccError::Timeout | PccError::Doorbell | PccError::ChannelUnavailable => RasError::Io,
            PccError::Busy | PccError::RateLimited => RasError::Busy,
            PccError::PermissionDenied => RasError::PermissionDenied,
            PccError::InvalidArgument => RasError::InvalidArgument,
            PccError::InvalidTable | PccError::OutOfBounds => RasError::Protocol,
        }
    }
}

impl From<scroll::Error> for RasError {
    fn from(err: scroll::Error) -> Self {
        log::error!(target: "ras_feat", "Failed to decode feature record: {:?}", err);
        RasError::Protocol
    }
}

/// Result type for RAS feature operations.
pub type Result<T> = core::result::Result<T, RasError>;
