//! Device Command Mailbox
//!
//! Defines the command structure exchanged with a memory device mailbox and the [`CommandMailbox`] trait that a
//! device owner implements to execute commands on its hardware.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
extern crate alloc;
use alloc::vec::Vec;

use crate::error::{MailboxError, Result};

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Mailbox command opcodes used by the Feature transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    /// Enumerate the Feature catalog.
    GetSupportedFeatures = 0x0500,
    /// Read a Feature attribute record.
    GetFeature = 0x0501,
    /// Write a Feature attribute record.
    SetFeature = 0x0502,
    /// Run a maintenance operation such as a repair.
    PerformMaintenance = 0x0600,
}

impl Opcode {
    /// Returns the raw opcode value.
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a raw opcode value, if it is one the transport issues.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0500 => Some(Opcode::GetSupportedFeatures),
            0x0501 => Some(Opcode::GetFeature),
            0x0502 => Some(Opcode::SetFeature),
            0x0600 => Some(Opcode::PerformMaintenance),
            _ => None,
        }
    }
}

/// Mailbox command return codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReturnCode {
    Success,
    BackgroundCommandStarted,
    InvalidInput,
    Unsupported,
    InternalError,
    RetryRequired,
    Busy,
    MediaDisabled,
    FwTransferInProgress,
    FwTransferOutOfOrder,
    FwVerificationFailed,
    InvalidSlot,
    FwActivationFailedRollback,
    FwActivationFailedResetRequired,
    InvalidHandle,
    InvalidPhysicalAddress,
    InjectPoisonLimitReached,
    PermanentMediaFailure,
    Aborted,
    InvalidSecurityState,
    IncorrectPassphrase,
    UnsupportedMailbox,
    InvalidPayloadLength,
    InvalidLog,
    Interrupted,
    UnsupportedFeatureVersion,
    UnsupportedFeatureSelection,
    FeatureTransferInProgress,
    FeatureTransferOutOfOrder,
    ResourcesExhausted,
    /// A return code this crate does not name.
    Other(u16),
}

impl ReturnCode {
    const NAMED: [ReturnCode; 30] = [
        ReturnCode::Success,
        ReturnCode::BackgroundCommandStarted,
        ReturnCode::InvalidInput,
        ReturnCode::Unsupported,
        ReturnCode::InternalError,
        ReturnCode::RetryRequired,
        ReturnCode::Busy,
        ReturnCode::MediaDisabled,
        ReturnCode::FwTransferInProgress,
        ReturnCode::FwTransferOutOfOrder,
        ReturnCode::FwVerificationFailed,
        ReturnCode::InvalidSlot,
        ReturnCode::FwActivationFailedRollback,
        ReturnCode::FwActivationFailedResetRequired,
        ReturnCode::InvalidHandle,
        ReturnCode::InvalidPhysicalAddress,
        ReturnCode::InjectPoisonLimitReached,
        ReturnCode::PermanentMediaFailure,
        ReturnCode::Aborted,
        ReturnCode::InvalidSecurityState,
        ReturnCode::IncorrectPassphrase,
        ReturnCode::UnsupportedMailbox,
        ReturnCode::InvalidPayloadLength,
        ReturnCode::InvalidLog,
        ReturnCode::Interrupted,
        ReturnCode::UnsupportedFeatureVersion,
        ReturnCode::UnsupportedFeatureSelection,
        ReturnCode::FeatureTransferInProgress,
        ReturnCode::FeatureTransferOutOfOrder,
        ReturnCode::ResourcesExhausted,
    ];

    /// Returns the raw return code value.
    pub fn as_u16(&self) -> u16 {
        match self {
            ReturnCode::Other(value) => *value,
            named => Self::NAMED.iter().position(|rc| rc == named).map(|index| index as u16).unwrap_or(u16::MAX),
        }
    }

    /// Returns true for [`ReturnCode::Success`].
    pub fn is_success(&self) -> bool {
        *self == ReturnCode::Success
    }
}

impl From<u16> for ReturnCode {
    fn from(value: u16) -> Self {
        Self::NAMED.get(value as usize).copied().unwrap_or(ReturnCode::Other(value))
    }
}

/// A single mailbox command.
///
/// The caller fills the opcode, the input payload and the output bounds. The mailbox backend stores the device
/// return code and the output payload. `payload_out.len()` is the number of bytes the device returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxCommand {
    /// Command opcode.
    pub opcode: Opcode,
    /// Input payload.
    pub payload_in: Vec<u8>,
    /// Largest output payload the caller accepts.
    pub size_out: usize,
    /// Smallest output payload that makes the response valid.
    pub min_out: usize,
    /// Output payload written by the backend.
    pub payload_out: Vec<u8>,
    /// Raw return code written by the backend.
    pub return_code: u16,
}

impl MailboxCommand {
    /// Creates a command with the given input payload and no output expectations.
    pub fn new(opcode: Opcode, payload_in: Vec<u8>) -> Self {
        Self { opcode, payload_in, size_out: 0, min_out: 0, payload_out: Vec::new(), return_code: 0 }
    }

    /// Sets the accepted output payload bounds.
    pub fn with_output(mut self, size_out: usize, min_out: usize) -> Self {
        self.size_out = size_out;
        self.min_out = min_out;
        self
    }
}

/// Trait for executing commands on a device mailbox.
///
/// This trait abstracts the register level mailbox protocol so the Feature transport can be used, and tested,
/// without real hardware.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait CommandMailbox: Send + Sync {
    /// Returns the mailbox payload size in bytes.
    fn payload_size(&self) -> usize;

    /// Executes a command.
    ///
    /// # Parameters
    /// - `command`: The command to execute. On return the backend has filled `return_code` and `payload_out`.
    ///
    /// # Returns
    /// - `Ok(())` if the command reached the device and a return code was read back
    /// - `Err(MailboxError)` if the mailbox itself failed
    fn execute(&self, command: &mut MailboxCommand) -> Result<()>;
}

/// Sends a command and validates the device return code and output size.
pub fn send_command(mailbox: &dyn CommandMailbox, command: &mut MailboxCommand) -> Result<()> {
    if command.payload_in.len() > mailbox.payload_size() || command.size_out > mailbox.payload_size() {
        log::error!(
            target: "cxl_mbox",
            "Command {:?} exceeds mailbox payload ({} in, {} out, {} max)",
            command.opcode,
            command.payload_in.len(),
            command.size_out,
            mailbox.payload_size()
        );
        return Err(MailboxError::InvalidArgument);
    }

    log::trace!(target: "cxl_mbox", "Sending {:?} with {} byte payload", command.opcode, command.payload_in.len());
    mailbox.execute(command)?;

    let rc = ReturnCode::from(command.return_code);
    if !rc.is_success() {
        log::error!(target: "cxl_mbox", "Command {:?} failed: {:?} ({:#06x})", command.opcode, rc, command.return_code);
        return Err(MailboxError::Device(rc));
    }

    let received = command.payload_out.len();
    if received > command.size_out || received < command.min_out {
        log::error!(
            target: "cxl_mbox",
            "Command {:?} returned {} bytes, expected {}..={}",
            command.opcode,
            received,
            command.min_out,
            command.size_out
        );
        return Err(MailboxError::Protocol);
    }

    Ok(())
}
