//! PCC Transport Errors
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use core::fmt;

/// Errors produced by the PCC transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PccError {
    /// The platform did not complete the command before the subspace deadline.
    Timeout,
    /// The platform reported the requested capability as not valid or not supported.
    PermissionDenied,
    /// The platform reported that it is busy.
    Busy,
    /// The platform reported the command as failed, aborted or carrying invalid data.
    InvalidArgument,
    /// The maximum periodic access rate budget of the subspace is exhausted for the current window.
    RateLimited,
    /// The platform could not provide the requested channel.
    ChannelUnavailable,
    /// Ringing the doorbell failed.
    Doorbell,
    /// The RAS2 table is malformed.
    InvalidTable,
    /// An access fell outside of the shared memory region.
    OutOfBounds,
}

impl fmt::Display for PccError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PccError::Timeout => "PCC command timed out",
            PccError::PermissionDenied => "PCC capability not valid or not supported",
            PccError::Busy => "PCC platform busy",
            PccError::InvalidArgument => "PCC command failed",
            PccError::RateLimited => "PCC access rate limit reached",
            PccError::ChannelUnavailable => "PCC channel unavailable",
            PccError::Doorbell => "PCC doorbell failed",
            PccError::InvalidTable => "malformed RAS2 table",
            PccError::OutOfBounds => "PCC shared memory access out of bounds",
        };
        f.write_str(text)
    }
}

impl From<scroll::Error> for PccError {
    fn from(err: scroll::Error) -> Self {
        log::error!(target: "ras2_pcc", "Failed to decode RAS2 data: {:?}", err);
        PccError::InvalidTable
    }
}

/// Result type for PCC transport operations.
pub type Result<T> = core::result::Result<T, PccError>;
