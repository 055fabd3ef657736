//! PCC Shared Memory
//!
//! Access to the shared memory region of a PCC subspace and the layout of the RAS2 common header at its start.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use core::ptr::NonNull;

use bitflags::bitflags;

use crate::error::{PccError, Result};

/// Byte offsets of the RAS2 PCC shared memory common header.
pub mod layout {
    pub const SIGNATURE: usize = 0;
    pub const COMMAND: usize = 4;
    pub const STATUS: usize = 6;
    pub const VERSION: usize = 8;
    /// Feature support bitmap written by the platform, 16 bytes.
    pub const FEATURES: usize = 10;
    /// Feature selection bitmap written by the OS, 16 bytes.
    pub const SET_CAPABILITIES: usize = 26;
    pub const SET_CAPABILITIES_SIZE: usize = 16;
    pub const NUM_PARAMETER_BLOCKS: usize = 42;
    pub const SET_CAPABILITIES_STATUS: usize = 44;
    /// Size of the common header. Feature parameter blocks follow it.
    pub const COMMON_HEADER_SIZE: usize = 48;
}

/// PCC command that asks the platform to execute the selected RAS2 feature command.
pub const PCC_CMD_EXEC: u16 = 0x01;

bitflags! {
    /// PCC status register.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct PccStatus: u16 {
        const COMMAND_COMPLETE = 1 << 0;
        const PLATFORM_INTERRUPT = 1 << 1;
        const ERROR = 1 << 2;
        const PLATFORM_NOTIFICATION = 1 << 3;
    }
}

/// Set capabilities status reported by the platform when a command fails.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CapabilityStatus {
    Success,
    NotValid,
    NotSupported,
    Busy,
    Failed,
    Aborted,
    InvalidData,
    Other(u32),
}

impl From<u32> for CapabilityStatus {
    fn from(value: u32) -> Self {
        match value {
            0 => CapabilityStatus::Success,
            1 => CapabilityStatus::NotValid,
            2 => CapabilityStatus::NotSupported,
            3 => CapabilityStatus::Busy,
            4 => CapabilityStatus::Failed,
            5 => CapabilityStatus::Aborted,
            6 => CapabilityStatus::InvalidData,
            other => CapabilityStatus::Other(other),
        }
    }
}

impl CapabilityStatus {
    /// Maps the status to the result of the command. Unknown values count as success.
    pub fn into_result(self) -> Result<()> {
        match self {
            CapabilityStatus::NotValid | CapabilityStatus::NotSupported => Err(PccError::PermissionDenied),
            CapabilityStatus::Busy => Err(PccError::Busy),
            CapabilityStatus::Failed | CapabilityStatus::Aborted | CapabilityStatus::InvalidData => {
                Err(PccError::InvalidArgument)
            }
            CapabilityStatus::Success | CapabilityStatus::Other(_) => Ok(()),
        }
    }
}

/// Trait for accessing the shared memory region of a PCC subspace.
pub trait PccSharedMemory: Send + Sync {
    /// Returns the size of the region in bytes.
    fn len(&self) -> usize;

    /// Returns whether the region is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies bytes out of the region starting at `offset`.
    fn read(&self, offset: usize, buffer: &mut [u8]) -> Result<()>;

    /// Copies bytes into the region starting at `offset`.
    fn write(&self, offset: usize, data: &[u8]) -> Result<()>;
}

impl dyn PccSharedMemory + '_ {
    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        let mut bytes = [0u8; 1];
        self.read(offset, &mut bytes)?;
        Ok(bytes[0])
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        let mut bytes = [0u8; 2];
        self.read(offset, &mut bytes)?;
        Ok(u16::from_le_bytes(bytes))
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.read(offset, &mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_u64(&self, offset: usize) -> Result<u64> {
        let mut bytes = [0u8; 8];
        self.read(offset, &mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn write_u8(&self, offset: usize, value: u8) -> Result<()> {
        self.write(offset, &[value])
    }

    pub fn write_u16(&self, offset: usize, value: u16) -> Result<()> {
        self.write(offset, &value.to_le_bytes())
    }

    pub fn write_u32(&self, offset: usize, value: u32) -> Result<()> {
        self.write(offset, &value.to_le_bytes())
    }

    pub fn write_u64(&self, offset: usize, value: u64) -> Result<()> {
        self.write(offset, &value.to_le_bytes())
    }

    /// Reads the status register.
    pub fn status(&self) -> Result<PccStatus> {
        Ok(PccStatus::from_bits_retain(self.read_u16(layout::STATUS)?))
    }
}

/// Memory mapped shared memory region.
///
/// All accesses are volatile byte accesses within the bounds given at construction.
#[derive(Debug, Clone)]
pub struct MmioSharedMemory {
    base: NonNull<u8>,
    length: usize,
}

// SAFETY: the region is owned by the platform channel, and every access is a bounds checked volatile access. The
// subspace lock serializes users.
unsafe impl Send for MmioSharedMemory {}
unsafe impl Sync for MmioSharedMemory {}

impl MmioSharedMemory {
    /// Creates an accessor for a mapped shared memory region.
    ///
    /// ## Safety
    ///
    /// - `base` must point to a mapping of at least `length` bytes that stays valid for the lifetime of this value
    ///   and of every clone of it.
    /// - The region must only be shared with the platform and with other accessors of the same subspace.
    pub unsafe fn new(base: NonNull<u8>, length: usize) -> Self {
        Self { base, length }
    }

    fn check(&self, offset: usize, size: usize) -> Result<()> {
        match offset.checked_add(size) {
            Some(end) if end <= self.length => Ok(()),
            _ => {
                log::error!(target: "ras2_pcc", "Access at {:#x}+{} outside {} byte region", offset, size, self.length);
                Err(PccError::OutOfBounds)
            }
        }
    }
}

impl PccSharedMemory for MmioSharedMemory {
    fn len(&self) -> usize {
        self.length
    }

    fn read(&self, offset: usize, buffer: &mut [u8]) -> Result<()> {
        self.check(offset, buffer.len())?;
        for (i, byte) in buffer.iter_mut().enumerate() {
            // SAFETY: bounds checked above, the mapping is valid per the constructor contract.
            *byte = unsafe { core::ptr::read_volatile(self.base.as_ptr().add(offset + i)) };
        }
        Ok(())
    }

    fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.check(offset, data.len())?;
        for (i, byte) in data.iter().enumerate() {
            // SAFETY: bounds checked above, the mapping is valid per the constructor contract.
            unsafe { core::ptr::write_volatile(self.base.as_ptr().add(offset + i), *byte) };
        }
        Ok(())
    }
}
