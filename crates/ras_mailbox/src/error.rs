//! Mailbox Transport Errors
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use core::fmt;

use crate::mailbox::ReturnCode;

/// Errors produced by the mailbox Feature transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MailboxError {
    /// The device completed the command with a non-success return code.
    Device(ReturnCode),
    /// The device response is malformed: entry counts, byte counts or sizes do not add up.
    Protocol,
    /// A transfer made no progress (the device returned zero bytes).
    Io,
    /// The mailbox payload cannot carry the command header plus a useful amount of data.
    PayloadTooSmall,
    /// The caller supplied an argument the transport cannot send.
    InvalidArgument,
    /// The mailbox backend failed to execute the command.
    Transport,
}

impl MailboxError {
    /// Returns the device return code to report for this error.
    ///
    /// Errors that did not come from the device report [`ReturnCode::InvalidInput`], the code a device would use
    /// for a request it could not accept.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            MailboxError::Device(rc) => *rc,
            MailboxError::Transport | MailboxError::Io => ReturnCode::InternalError,
            _ => ReturnCode::InvalidInput,
        }
    }
}

impl fmt::Display for MailboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailboxError::Device(rc) => write!(f, "device returned {:?} ({:#06x})", rc, rc.as_u16()),
            MailboxError::Protocol => write!(f, "malformed mailbox response"),
            MailboxError::Io => write!(f, "mailbox transfer made no progress"),
            MailboxError::PayloadTooSmall => write!(f, "mailbox payload too small for transfer"),
            MailboxError::InvalidArgument => write!(f, "invalid mailbox argument"),
            MailboxError::Transport => write!(f, "mailbox backend failure"),
        }
    }
}

impl From<scroll::Error> for MailboxError {
    fn from(err: scroll::Error) -> Self {
        log::error!(target: "cxl_mbox", "Failed to decode mailbox payload: {:?}", err);
        MailboxError::Protocol
    }
}

/// Result type for mailbox transport operations.
pub type Result<T> = core::result::Result<T, MailboxError>;
