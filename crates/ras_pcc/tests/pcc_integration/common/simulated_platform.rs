//! Simulated RAS2 Platform
//!
//! A platform model with one patrol scrubber per subspace. Ringing the doorbell processes the command in shared
//! memory the way RAS2 firmware would, then raises the completion bit.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use ras_pcc::channel::{PccChannelInfo, PccDoorbell, PccProvider};
use ras_pcc::patrol_scrub::{offsets, PatrolScrubCommand, PATROL_SCRUB_RUNNING, RAS2_FEATURE_PATROL_SCRUB};
use ras_pcc::shared_memory::{layout, PccSharedMemory, PccStatus, PCC_CMD_EXEC};
use ras_pcc::{PccError, Result};

/// Capability status the platform reports for an out of range scrub cycle.
pub const STATUS_INVALID_DATA: u32 = 6;

/// Static description of a simulated subspace.
#[derive(Debug, Copy, Clone)]
pub struct PlatformConfig {
    pub latency_us: u32,
    pub min_turnaround_us: u32,
    pub max_access_rate: u32,
    pub memory_size: u64,
    pub min_cycle_hours: u8,
    pub max_cycle_hours: u8,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            latency_us: 1000,
            min_turnaround_us: 0,
            max_access_rate: 0,
            memory_size: 0x4000_0000,
            min_cycle_hours: 1,
            max_cycle_hours: 24,
        }
    }
}

#[derive(Default)]
struct ScrubModel {
    running: bool,
    current_cycle_hours: u8,
    actual_base: u64,
    actual_size: u64,
    hang: bool,
    fail_next: Option<u32>,
    doorbells: Vec<u16>,
}

/// One simulated subspace: its shared memory and the firmware behind it.
pub struct SimulatedPlatform {
    config: PlatformConfig,
    memory: Mutex<Vec<u8>>,
    model: Mutex<ScrubModel>,
}

impl SimulatedPlatform {
    pub fn new(config: PlatformConfig) -> Arc<Self> {
        let mut memory = vec![0u8; layout::COMMON_HEADER_SIZE + offsets::SIZE];
        memory[layout::SIGNATURE..layout::SIGNATURE + 4].copy_from_slice(&0x5043_4300u32.to_le_bytes());
        memory[layout::STATUS] = PccStatus::COMMAND_COMPLETE.bits() as u8;
        memory[layout::FEATURES] = RAS2_FEATURE_PATROL_SCRUB;
        memory[layout::NUM_PARAMETER_BLOCKS] = 1;
        let platform = Arc::new(Self {
            config,
            memory: Mutex::new(memory),
            model: Mutex::new(ScrubModel { current_cycle_hours: config.min_cycle_hours, ..Default::default() }),
        });
        platform.publish();
        platform
    }

    /// Stops completing commands.
    pub fn hang(&self, hang: bool) {
        self.model.lock().unwrap().hang = hang;
    }

    /// Fails the next command with the given capability status.
    pub fn fail_next(&self, capability_status: u32) {
        self.model.lock().unwrap().fail_next = Some(capability_status);
    }

    /// Commands the doorbell was rung with.
    pub fn doorbells(&self) -> Vec<u16> {
        self.model.lock().unwrap().doorbells.clone()
    }

    pub fn is_running(&self) -> bool {
        self.model.lock().unwrap().running
    }

    pub fn actual_range(&self) -> (u64, u64) {
        let model = self.model.lock().unwrap();
        (model.actual_base, model.actual_size)
    }

    pub fn current_cycle_hours(&self) -> u8 {
        self.model.lock().unwrap().current_cycle_hours
    }

    fn read_u16(memory: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([memory[offset], memory[offset + 1]])
    }

    fn read_u32(memory: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(memory[offset..offset + 4].try_into().unwrap())
    }

    fn read_u64(memory: &[u8], offset: usize) -> u64 {
        u64::from_le_bytes(memory[offset..offset + 8].try_into().unwrap())
    }

    fn write(memory: &mut [u8], offset: usize, bytes: &[u8]) {
        memory[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Writes the scrubber state into the output fields of the parameter block.
    fn publish(&self) {
        let model = self.model.lock().unwrap();
        let mut memory = self.memory.lock().unwrap();
        let params_out = model.current_cycle_hours as u32
            | (self.config.min_cycle_hours as u32) << 8
            | (self.config.max_cycle_hours as u32) << 16;
        Self::write(&mut memory, offsets::PARAMS_OUT, &params_out.to_le_bytes());
        let flags = if model.running { PATROL_SCRUB_RUNNING } else { 0 };
        Self::write(&mut memory, offsets::FLAGS, &flags.to_le_bytes());
        Self::write(&mut memory, offsets::ACTUAL_RANGE, &model.actual_base.to_le_bytes());
        Self::write(&mut memory, offsets::ACTUAL_RANGE + 8, &model.actual_size.to_le_bytes());
    }

    fn complete(&self, capability_status: Option<u32>) {
        let mut memory = self.memory.lock().unwrap();
        let mut status = PccStatus::COMMAND_COMPLETE;
        if let Some(capability_status) = capability_status {
            Self::write(&mut memory, layout::SET_CAPABILITIES_STATUS, &capability_status.to_le_bytes());
            status |= PccStatus::ERROR;
        }
        Self::write(&mut memory, layout::STATUS, &status.bits().to_le_bytes());
    }

    fn process(&self, command: u16) {
        let mut model = self.model.lock().unwrap();
        model.doorbells.push(command);
        if model.hang {
            return;
        }
        if let Some(capability_status) = model.fail_next.take() {
            drop(model);
            self.complete(Some(capability_status));
            return;
        }

        let memory = self.memory.lock().unwrap().clone();
        let selected = memory[layout::SET_CAPABILITIES] & RAS2_FEATURE_PATROL_SCRUB != 0;
        let mut failure = None;
        if command == PCC_CMD_EXEC && selected {
            let scrub_command = Self::read_u16(&memory, offsets::COMMAND);
            if scrub_command == PatrolScrubCommand::Start as u16 {
                let params_in = Self::read_u32(&memory, offsets::PARAMS_IN);
                let hours = ((params_in >> 8) & 0xFF) as u8;
                if hours < self.config.min_cycle_hours || hours > self.config.max_cycle_hours {
                    failure = Some(STATUS_INVALID_DATA);
                } else {
                    let base = Self::read_u64(&memory, offsets::REQUESTED_RANGE);
                    let size = Self::read_u64(&memory, offsets::REQUESTED_RANGE + 8);
                    model.running = true;
                    model.current_cycle_hours = hours;
                    (model.actual_base, model.actual_size) =
                        if size == 0 { (0, self.config.memory_size) } else { (base, size) };
                }
            } else if scrub_command == PatrolScrubCommand::Stop as u16 {
                model.running = false;
            }
        }
        drop(model);
        self.publish();
        self.complete(failure);
    }
}

/// Shared memory view of a simulated subspace.
pub struct SimulatedMemory(Arc<SimulatedPlatform>);

impl PccSharedMemory for SimulatedMemory {
    fn len(&self) -> usize {
        self.0.memory.lock().unwrap().len()
    }

    fn read(&self, offset: usize, buffer: &mut [u8]) -> Result<()> {
        let memory = self.0.memory.lock().unwrap();
        let bytes = memory.get(offset..offset + buffer.len()).ok_or(PccError::OutOfBounds)?;
        buffer.copy_from_slice(bytes);
        Ok(())
    }

    fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        let mut memory = self.0.memory.lock().unwrap();
        let bytes = memory.get_mut(offset..offset + data.len()).ok_or(PccError::OutOfBounds)?;
        bytes.copy_from_slice(data);
        Ok(())
    }
}

/// Doorbell of a simulated subspace.
pub struct SimulatedDoorbell(Arc<SimulatedPlatform>);

impl PccDoorbell for SimulatedDoorbell {
    fn ring(&self, command: u16) -> Result<()> {
        self.0.process(command);
        Ok(())
    }

    fn tx_done(&self, _result: Result<()>) {}
}

/// Provider handing out the simulated subspaces.
#[derive(Default)]
pub struct SimulatedProvider {
    platforms: BTreeMap<u32, Arc<SimulatedPlatform>>,
    requests: Mutex<Vec<u32>>,
    frees: Mutex<Vec<u32>>,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subspace(&mut self, subspace_id: u32, config: PlatformConfig) -> Arc<SimulatedPlatform> {
        let platform = SimulatedPlatform::new(config);
        self.platforms.insert(subspace_id, platform.clone());
        platform
    }

    pub fn requests(&self) -> Vec<u32> {
        self.requests.lock().unwrap().clone()
    }

    pub fn frees(&self) -> Vec<u32> {
        self.frees.lock().unwrap().clone()
    }
}

impl PccProvider for SimulatedProvider {
    fn request_channel(&self, subspace_id: u32) -> Result<PccChannelInfo> {
        let platform = self.platforms.get(&subspace_id).ok_or(PccError::ChannelUnavailable)?;
        self.requests.lock().unwrap().push(subspace_id);
        Ok(PccChannelInfo {
            shared_memory: Box::new(SimulatedMemory(platform.clone())),
            doorbell: Box::new(SimulatedDoorbell(platform.clone())),
            latency_us: platform.config.latency_us,
            min_turnaround_us: platform.config.min_turnaround_us,
            max_access_rate: platform.config.max_access_rate,
        })
    }

    fn free_channel(&self, subspace_id: u32) {
        self.frees.lock().unwrap().push(subspace_id);
    }
}
