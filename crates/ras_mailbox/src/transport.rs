//! Feature Command Transport
//!
//! Implements Get Supported Features, Get Feature, Set Feature and Perform Maintenance over a fixed payload
//! [`CommandMailbox`]. Records that do not fit in one mailbox payload are split into chunks.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
extern crate alloc;
use alloc::vec::Vec;

use scroll::{Pread, Pwrite, LE};
use uuid::Uuid;

use crate::catalog::FeatureCatalog;
use crate::error::{MailboxError, Result};
use crate::feature::{
    FeatureEntry, GetFeatureIn, GetFeatureSelection, GetSupportedFeaturesIn, GetSupportedFeaturesOutHeader,
    MaintenanceHeader, SetFeatureHeader, SetFeatureTransfer, SET_FEATURE_SAVED_ACROSS_RESET,
};
use crate::mailbox::{send_command, CommandMailbox, MailboxCommand, Opcode};

/// Smallest number of data bytes a Set Feature chunk must be able to carry.
const MIN_SET_FEATURE_CHUNK: usize = 10;

/// Feature protocol on top of a device mailbox.
pub struct FeatureTransport<'a> {
    mailbox: &'a dyn CommandMailbox,
}

impl<'a> FeatureTransport<'a> {
    /// Creates a transport for the given mailbox.
    pub fn new(mailbox: &'a dyn CommandMailbox) -> Self {
        Self { mailbox }
    }

    /// Returns the mailbox payload size.
    pub fn payload_size(&self) -> usize {
        self.mailbox.payload_size()
    }

    /// Asks the device how many Features it supports.
    pub fn get_supported_features_count(&self) -> Result<u16> {
        let input = GetSupportedFeaturesIn {
            count: GetSupportedFeaturesOutHeader::SIZE as u32,
            start_index: 0,
            reserved: 0,
        };
        let mut cmd = MailboxCommand::new(Opcode::GetSupportedFeatures, encode(input, GetSupportedFeaturesIn::SIZE)?)
            .with_output(GetSupportedFeaturesOutHeader::SIZE, GetSupportedFeaturesOutHeader::SIZE);
        send_command(self.mailbox, &mut cmd)?;

        let header: GetSupportedFeaturesOutHeader = cmd.payload_out.pread_with(0, LE)?;
        log::debug!(target: "cxl_mbox", "Device supports {} Features", header.supported_features);
        Ok(header.supported_features)
    }

    /// Enumerates the Feature catalog of the device.
    ///
    /// The device is always asked for its Feature count first. A non-zero `count_hint` limits the number of
    /// entries read to at most that many.
    ///
    /// Each page request asks for as many entries as fit in the mailbox payload. A device may return fewer entries
    /// than requested; the shortfall is added to the next page request.
    pub fn get_supported_features(&self, count_hint: usize) -> Result<FeatureCatalog> {
        let advertised = self.get_supported_features_count()? as usize;
        let count = if count_hint == 0 { advertised } else { count_hint.min(advertised) };
        if count == 0 {
            return Ok(FeatureCatalog::default());
        }

        let header_size = GetSupportedFeaturesOutHeader::SIZE;
        let max_entries = self.payload_size().saturating_sub(header_size) / FeatureEntry::SIZE;
        if max_entries == 0 {
            log::error!(target: "cxl_mbox", "Mailbox payload {} cannot hold a Feature entry", self.payload_size());
            return Err(MailboxError::PayloadTooSmall);
        }

        let mut entries = Vec::with_capacity(count);
        let mut remaining = count;
        let mut start: usize = 0;

        while remaining > 0 {
            let requested = remaining.min(max_entries);
            remaining -= requested;
            let out_size = header_size + requested * FeatureEntry::SIZE;

            let input = GetSupportedFeaturesIn {
                count: out_size as u32,
                start_index: u16::try_from(start).map_err(|_| MailboxError::Protocol)?,
                reserved: 0,
            };
            let mut cmd =
                MailboxCommand::new(Opcode::GetSupportedFeatures, encode(input, GetSupportedFeaturesIn::SIZE)?)
                    .with_output(out_size, header_size);
            send_command(self.mailbox, &mut cmd)?;

            if cmd.payload_out.len() <= header_size {
                log::error!(target: "cxl_mbox", "Get Supported Features page at {} returned no entries", start);
                return Err(MailboxError::Protocol);
            }

            let retrieved = cmd.payload_out.len() - header_size;
            let header: GetSupportedFeaturesOutHeader = cmd.payload_out.pread_with(0, LE)?;
            let num_entries = header.num_entries as usize;
            if num_entries == 0 || num_entries * FeatureEntry::SIZE != retrieved || num_entries > requested {
                log::error!(
                    target: "cxl_mbox",
                    "Get Supported Features page at {} reports {} entries in {} bytes ({} requested)",
                    start,
                    num_entries,
                    retrieved,
                    requested
                );
                return Err(MailboxError::Protocol);
            }

            let mut offset = header_size;
            for _ in 0..num_entries {
                entries.push(cmd.payload_out.gread_with::<FeatureEntry>(&mut offset, LE)?);
            }

            log::trace!(target: "cxl_mbox", "Read {} Feature entries starting at {}", num_entries, start);
            remaining += requested - num_entries;
            start += num_entries;
        }

        log::debug!(target: "cxl_mbox", "Enumerated {} of {} Features", entries.len(), advertised);
        Ok(FeatureCatalog::new(entries))
    }

    /// Reads `size` bytes of a Feature record starting at `offset`.
    ///
    /// The record is read in chunks of at most one mailbox payload. A chunk that returns no data fails the whole
    /// read with [`MailboxError::Io`].
    pub fn get_feature(&self, uuid: &Uuid, selection: GetFeatureSelection, size: usize, offset: u16) -> Result<Vec<u8>> {
        if size == 0 || offset as usize + size > u16::MAX as usize + 1 {
            return Err(MailboxError::InvalidArgument);
        }

        let chunk_limit = self.payload_size().min(u16::MAX as usize);
        if chunk_limit == 0 {
            return Err(MailboxError::PayloadTooSmall);
        }

        let mut data = Vec::with_capacity(size);
        while data.len() < size {
            let chunk = (size - data.len()).min(chunk_limit);
            let input = GetFeatureIn {
                uuid: *uuid,
                offset: (offset as usize + data.len()) as u16,
                count: chunk as u16,
                selection,
            };
            let mut cmd =
                MailboxCommand::new(Opcode::GetFeature, encode(input, GetFeatureIn::SIZE)?).with_output(chunk, 0);
            send_command(self.mailbox, &mut cmd)?;

            if cmd.payload_out.is_empty() {
                log::error!(target: "cxl_mbox", "Get Feature {} returned no data at offset {}", uuid, input.offset);
                return Err(MailboxError::Io);
            }
            data.extend_from_slice(&cmd.payload_out);
        }

        log::trace!(target: "cxl_mbox", "Read {} bytes of Feature {}", data.len(), uuid);
        Ok(data)
    }

    /// Writes `data` into a Feature record starting at `offset`.
    ///
    /// The transfer stage bits of `flags` are replaced by the stage of each chunk and the saved across reset flag is
    /// always set. The first failing chunk ends the transfer and its error is returned.
    pub fn set_feature(&self, uuid: &Uuid, version: u8, data: &[u8], flags: u32, offset: u16) -> Result<()> {
        if data.is_empty() || offset as usize + data.len() > u16::MAX as usize + 1 {
            return Err(MailboxError::InvalidArgument);
        }

        let payload_size = self.payload_size();
        let header_size = SetFeatureHeader::SIZE;
        if header_size + MIN_SET_FEATURE_CHUNK > payload_size {
            log::error!(target: "cxl_mbox", "Mailbox payload {} too small for Set Feature", payload_size);
            return Err(MailboxError::PayloadTooSmall);
        }

        let max_chunk = payload_size - header_size;
        let flags = (flags & !SetFeatureTransfer::MASK) | SET_FEATURE_SAVED_ACROSS_RESET;
        let (mut stage, mut chunk) = if data.len() <= max_chunk {
            (SetFeatureTransfer::Full, data.len())
        } else {
            (SetFeatureTransfer::Initiate, max_chunk)
        };

        let mut sent = 0;
        loop {
            let header =
                SetFeatureHeader { uuid: *uuid, flags: flags | stage as u32, offset: (offset as usize + sent) as u16, version };
            let mut payload = encode(header, header_size + chunk)?;
            payload[header_size..].copy_from_slice(&data[sent..sent + chunk]);

            let mut cmd = MailboxCommand::new(Opcode::SetFeature, payload);
            if let Err(err) = send_command(self.mailbox, &mut cmd) {
                log::error!(
                    target: "cxl_mbox",
                    "Set Feature {} {:?} chunk at {} failed: {}",
                    uuid,
                    stage,
                    header.offset,
                    err
                );
                return Err(err);
            }

            sent += chunk;
            if sent >= data.len() {
                log::trace!(target: "cxl_mbox", "Wrote {} bytes of Feature {}", sent, uuid);
                return Ok(());
            }

            let left = data.len() - sent;
            if left <= max_chunk {
                stage = SetFeatureTransfer::Finish;
                chunk = left;
            } else {
                stage = SetFeatureTransfer::Continue;
            }
        }
    }

    /// Issues a Perform Maintenance command for the given operation class and subclass.
    pub fn perform_maintenance(&self, class: u8, subclass: u8, data: &[u8]) -> Result<()> {
        let header_size = MaintenanceHeader::SIZE;
        if header_size + data.len() > self.payload_size() {
            return Err(MailboxError::PayloadTooSmall);
        }

        let header = MaintenanceHeader { operation_class: class, operation_subclass: subclass };
        let mut payload = encode(header, header_size + data.len())?;
        payload[header_size..].copy_from_slice(data);

        log::debug!(target: "cxl_mbox", "Perform Maintenance class {:#x} subclass {:#x}", class, subclass);
        let mut cmd = MailboxCommand::new(Opcode::PerformMaintenance, payload);
        send_command(self.mailbox, &mut cmd)
    }
}

/// Writes a record at the start of a zeroed buffer of `size` bytes.
fn encode<T>(record: T, size: usize) -> Result<Vec<u8>>
where
    T: scroll::ctx::TryIntoCtx<scroll::Endian, Error = scroll::Error>,
{
    let mut buffer = alloc::vec![0u8; size];
    buffer.pwrite_with(record, 0, LE)?;
    Ok(buffer)
}
