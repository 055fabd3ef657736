//! PCC Subspace
//!
//! A single PCC subspace and its command protocol. Commands are serialized by the subspace lock, which is held from
//! the first completion check until the result has been read back out of shared memory.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
extern crate alloc;
use alloc::{boxed::Box, sync::Arc};
use core::time::Duration;

use spin::Mutex;

use crate::channel::{PccChannelInfo, PccDoorbell};
use crate::clock::Clock;
use crate::config::PccConfig;
use crate::error::{PccError, Result};
use crate::shared_memory::{layout, CapabilityStatus, PccSharedMemory, PccStatus, PCC_CMD_EXEC};

/// Mutable state of a subspace. Only touched with the subspace lock held.
struct ChannelState {
    shared_memory: Box<dyn PccSharedMemory>,
    doorbell: Box<dyn PccDoorbell>,
    /// Completion time of the last command, for the minimum request turnaround time.
    last_completion: Option<Duration>,
    /// Commands left in the current access rate window.
    mpar_tokens: u32,
    /// Start of the current access rate window.
    mpar_window_start: Option<Duration>,
}

/// A PCC subspace shared by every feature context that uses the same platform channel.
pub struct PccSubspace {
    id: u32,
    deadline: Duration,
    min_turnaround: Duration,
    max_access_rate: u32,
    config: PccConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<ChannelState>,
}

impl PccSubspace {
    /// Creates a subspace from the channel the platform handed out.
    pub fn new(id: u32, info: PccChannelInfo, config: PccConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            id,
            deadline: config.deadline(info.latency_us),
            min_turnaround: Duration::from_micros(info.min_turnaround_us as u64),
            max_access_rate: info.max_access_rate,
            config,
            clock,
            state: Mutex::new(ChannelState {
                shared_memory: info.shared_memory,
                doorbell: info.doorbell,
                last_completion: None,
                mpar_tokens: 0,
                mpar_window_start: None,
            }),
        }
    }

    /// Returns the platform identifier of the subspace.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns how long a command may take before it is considered lost.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Returns the minimum request turnaround time.
    pub fn min_turnaround(&self) -> Duration {
        self.min_turnaround
    }

    /// Returns the maximum number of commands per access rate window. Zero means unlimited.
    pub fn max_access_rate(&self) -> u32 {
        self.max_access_rate
    }

    /// Sends a command without touching the feature parameter blocks.
    pub fn send_command(&self, command: u16) -> Result<()> {
        self.exchange(command, |_| Ok(()), |_| Ok(()))
    }

    /// Sends a command as one locked exchange.
    ///
    /// `prepare` writes the feature parameters into shared memory right before the command is issued and `complete`
    /// reads the response after the platform completed it. No other command can run on the subspace in between.
    pub fn exchange<T>(
        &self,
        command: u16,
        prepare: impl FnOnce(&dyn PccSharedMemory) -> Result<()>,
        complete: impl FnOnce(&dyn PccSharedMemory) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.lock();

        self.wait_for_completion(&state)?;
        self.enforce_turnaround(&state);

        prepare(state.shared_memory.as_ref())?;
        self.take_access_token(&mut state)?;
        state.shared_memory.write_u16(layout::COMMAND, command)?;
        state.shared_memory.write_u16(layout::STATUS, 0)?;

        if let Err(err) = state.doorbell.ring(command) {
            log::error!(target: "ras2_pcc", "Subspace {}: doorbell for command {:#x} failed: {}", self.id, command, err);
            state.doorbell.tx_done(Err(err));
            return Err(err);
        }

        let mut result = Ok(());
        if command == PCC_CMD_EXEC || !self.min_turnaround.is_zero() {
            result = self.wait_for_completion(&state);
            if !self.min_turnaround.is_zero() {
                state.last_completion = Some(self.clock.now());
            }
        }
        state.doorbell.tx_done(result);
        result?;

        complete(state.shared_memory.as_ref())
    }

    /// Reads shared memory with the subspace lock held, without issuing a command.
    pub fn inspect<T>(&self, read: impl FnOnce(&dyn PccSharedMemory) -> Result<T>) -> Result<T> {
        let state = self.state.lock();
        read(state.shared_memory.as_ref())
    }

    /// Polls the status register until the platform reports completion or an error, or the deadline passes.
    fn wait_for_completion(&self, state: &ChannelState) -> Result<()> {
        let memory = state.shared_memory.as_ref();
        let deadline = self.clock.now() + self.deadline;

        loop {
            let status = memory.status()?;
            if status.contains(PccStatus::ERROR) {
                let cap_status = CapabilityStatus::from(memory.read_u32(layout::SET_CAPABILITIES_STATUS)?);
                memory.write_u16(layout::STATUS, (status - PccStatus::ERROR).bits())?;
                log::warn!(target: "ras2_pcc", "Subspace {}: platform reported {:?}", self.id, cap_status);
                return cap_status.into_result();
            }
            if status.contains(PccStatus::COMMAND_COMPLETE) {
                return Ok(());
            }
            if self.clock.now() > deadline {
                log::error!(target: "ras2_pcc", "Subspace {}: command not completed within {:?}", self.id, self.deadline);
                return Err(PccError::Timeout);
            }
            self.clock.stall(self.config.poll_interval);
        }
    }

    /// Waits out what is left of the minimum request turnaround time.
    fn enforce_turnaround(&self, state: &ChannelState) {
        if self.min_turnaround.is_zero() {
            return;
        }
        if let Some(last) = state.last_completion {
            let elapsed = self.clock.now().saturating_sub(last);
            if elapsed < self.min_turnaround {
                log::trace!(target: "ras2_pcc", "Subspace {}: waiting {:?} for turnaround", self.id, self.min_turnaround - elapsed);
                self.clock.stall(self.min_turnaround - elapsed);
            }
        }
    }

    /// Takes one command from the access rate budget, starting a new window when the old one has run out.
    fn take_access_token(&self, state: &mut ChannelState) -> Result<()> {
        if self.max_access_rate == 0 {
            return Ok(());
        }
        if state.mpar_tokens == 0 {
            let now = self.clock.now();
            if let Some(start) = state.mpar_window_start {
                if now.saturating_sub(start) < self.config.mpar_window {
                    log::debug!(target: "ras2_pcc", "Subspace {}: command not sent due to access rate limit", self.id);
                    return Err(PccError::RateLimited);
                }
            }
            state.mpar_window_start = Some(now);
            state.mpar_tokens = self.max_access_rate;
        }
        state.mpar_tokens -= 1;
        Ok(())
    }
}
