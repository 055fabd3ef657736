//! Feature Wire Records
//!
//! Packed little-endian payloads of the Feature commands and the well known Feature UUIDs of the memory RAS
//! Features.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use bitfield_struct::bitfield;
use bitflags::bitflags;
use scroll::{
    ctx::{TryFromCtx, TryIntoCtx},
    Endian, Pread, Pwrite,
};
use uuid::Uuid;

/// Device patrol scrub control Feature.
pub const PATROL_SCRUB_UUID: Uuid = Uuid::from_u128(0x96dad7d6_fde8_482b_a733_75774e06db8a);
/// DDR5 error check scrub control Feature.
pub const ECS_UUID: Uuid = Uuid::from_u128(0xe5b13f22_2328_4a14_b8ba_b9691e893386);
/// Soft post package repair Feature.
pub const SOFT_PPR_UUID: Uuid = Uuid::from_u128(0x892ba475_fad8_474e_9d3e_692c917568bb);
/// Hard post package repair Feature.
pub const HARD_PPR_UUID: Uuid = Uuid::from_u128(0x80ea4521_786f_4127_afb1_ec7459fb0e24);
/// Cacheline sparing Feature.
pub const CACHELINE_SPARING_UUID: Uuid = Uuid::from_u128(0x96c33386_91dd_44c7_9ecb_fdaf6503bac4);
/// Row sparing Feature.
pub const ROW_SPARING_UUID: Uuid = Uuid::from_u128(0x450ebf67_b135_4f97_a498_c2d57f279bed);
/// Bank sparing Feature.
pub const BANK_SPARING_UUID: Uuid = Uuid::from_u128(0x78b79636_90ac_4b64_a4ef_faac5d18a863);
/// Rank sparing Feature.
pub const RANK_SPARING_UUID: Uuid = Uuid::from_u128(0x34dbaff5_0552_4281_8f76_da0b5e7a76a7);

/// Features reserved for in-kernel use.
///
/// Entries in this set are driven only through the typed RAS operations and are never handed to a less trusted
/// caller.
pub const EXCLUSIVE_FEATURES: [Uuid; 8] = [
    PATROL_SCRUB_UUID,
    ECS_UUID,
    SOFT_PPR_UUID,
    HARD_PPR_UUID,
    CACHELINE_SPARING_UUID,
    ROW_SPARING_UUID,
    BANK_SPARING_UUID,
    RANK_SPARING_UUID,
];

/// Returns true if the Feature is reserved for in-kernel use.
pub fn is_exclusive(uuid: &Uuid) -> bool {
    EXCLUSIVE_FEATURES.contains(uuid)
}

/// Feature capability flags of a supported Feature entry.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct FeatureFlags {
    /// The Feature attributes can be changed with Set Feature.
    pub changeable: bool,
    /// Deepest reset that the saved attribute values persist across.
    #[bits(3)]
    pub reset_persistence: u8,
    /// Attribute values persist across a firmware update.
    pub persist_across_fw_update: bool,
    /// The default value can be read with Get Feature.
    pub default_selection: bool,
    /// The saved value can be read with Get Feature.
    pub saved_selection: bool,
    #[bits(25)]
    __reserved: u32,
}

bitflags! {
    /// Effects a Set Feature of this Feature has on the device.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct CommandEffects: u16 {
        const CONFIG_CHANGE_COLD_RESET = 1 << 0;
        const CONFIG_CHANGE_IMMEDIATE = 1 << 1;
        const DATA_CHANGE_IMMEDIATE = 1 << 2;
        const POLICY_CHANGE_IMMEDIATE = 1 << 3;
        const LOG_CHANGE_IMMEDIATE = 1 << 4;
        const SECURITY_STATE_CHANGE = 1 << 5;
        const BACKGROUND = 1 << 6;
        const BACKGROUND_ABORT_SUPPORTED = 1 << 7;
        const EFFECTS_VALID = 1 << 9;
        const CONFIG_CHANGE_CONV_RESET = 1 << 10;
        const CONFIG_CHANGE_CXL_RESET = 1 << 11;
    }
}

impl CommandEffects {
    /// Bits the effects field reserves for future use.
    pub const RESERVED_MASK: u16 = 0xF000;

    /// Effects that change the device immediately.
    pub const IMMEDIATE: CommandEffects = CommandEffects::CONFIG_CHANGE_IMMEDIATE
        .union(CommandEffects::DATA_CHANGE_IMMEDIATE)
        .union(CommandEffects::POLICY_CHANGE_IMMEDIATE)
        .union(CommandEffects::LOG_CHANGE_IMMEDIATE);

    /// Effects that only take hold after a reset.
    pub const RESET: CommandEffects = CommandEffects::CONFIG_CHANGE_COLD_RESET
        .union(CommandEffects::CONFIG_CHANGE_CONV_RESET)
        .union(CommandEffects::CONFIG_CHANGE_CXL_RESET);

    /// Returns true if any reserved bit is set.
    pub fn has_reserved_bits(&self) -> bool {
        self.bits() & Self::RESERVED_MASK != 0
    }
}

/// Get Feature selection field.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum GetFeatureSelection {
    Current = 0,
    Default = 1,
    Saved = 2,
}

impl TryFrom<u8> for GetFeatureSelection {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GetFeatureSelection::Current),
            1 => Ok(GetFeatureSelection::Default),
            2 => Ok(GetFeatureSelection::Saved),
            other => Err(other),
        }
    }
}

/// Set Feature data transfer stage, carried in the low bits of the Set Feature flags.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum SetFeatureTransfer {
    Full = 0,
    Initiate = 1,
    Continue = 2,
    Finish = 3,
    Abort = 4,
}

impl SetFeatureTransfer {
    /// Mask of the transfer stage within the Set Feature flags.
    pub const MASK: u32 = 0x7;

    /// Decodes the transfer stage from Set Feature flags.
    pub fn from_flags(flags: u32) -> Option<Self> {
        match flags & Self::MASK {
            0 => Some(SetFeatureTransfer::Full),
            1 => Some(SetFeatureTransfer::Initiate),
            2 => Some(SetFeatureTransfer::Continue),
            3 => Some(SetFeatureTransfer::Finish),
            4 => Some(SetFeatureTransfer::Abort),
            _ => None,
        }
    }
}

/// Set Feature flag asking the device to keep the written data across a reset.
pub const SET_FEATURE_SAVED_ACROSS_RESET: u32 = 1 << 3;

/// Reads a UUID stored in its wire byte order.
pub(crate) fn read_uuid(from: &[u8], offset: &mut usize) -> Result<Uuid, scroll::Error> {
    let raw = from.gread_with::<&[u8]>(offset, 16)?;
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(raw);
    Ok(Uuid::from_bytes(bytes))
}

/// A supported Feature entry as returned by Get Supported Features.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FeatureEntry {
    /// Feature identifier.
    pub uuid: Uuid,
    /// Index of the Feature in the device catalog.
    pub id: u16,
    /// Size of the Get Feature record in bytes.
    pub get_size: u16,
    /// Size of the Set Feature record in bytes. Zero when the Feature is not writable.
    pub set_size: u16,
    /// Capability flags.
    pub flags: FeatureFlags,
    /// Get Feature record version.
    pub get_version: u8,
    /// Set Feature record version.
    pub set_version: u8,
    /// Raw Set Feature effects.
    pub effects: u16,
}

impl FeatureEntry {
    /// Size of an entry on the wire.
    pub const SIZE: usize = 48;

    /// Returns the effects field, keeping bits this crate does not name.
    pub fn effects(&self) -> CommandEffects {
        CommandEffects::from_bits_retain(self.effects)
    }

    /// Returns true if the Feature can be written.
    pub fn is_changeable(&self) -> bool {
        self.flags.changeable()
    }
}

impl TryFromCtx<'_, Endian> for FeatureEntry {
    type Error = scroll::Error;

    fn try_from_ctx(from: &[u8], ctx: Endian) -> Result<(Self, usize), Self::Error> {
        let mut offset = 0;
        let uuid = read_uuid(from, &mut offset)?;
        let id = from.gread_with::<u16>(&mut offset, ctx)?;
        let get_size = from.gread_with::<u16>(&mut offset, ctx)?;
        let set_size = from.gread_with::<u16>(&mut offset, ctx)?;
        let flags = FeatureFlags::from_bits(from.gread_with::<u32>(&mut offset, ctx)?);
        let get_version = from.gread_with::<u8>(&mut offset, ctx)?;
        let set_version = from.gread_with::<u8>(&mut offset, ctx)?;
        let effects = from.gread_with::<u16>(&mut offset, ctx)?;
        // Reserved.
        from.gread_with::<&[u8]>(&mut offset, 18)?;
        Ok((Self { uuid, id, get_size, set_size, flags, get_version, set_version, effects }, offset))
    }
}

impl TryIntoCtx<Endian> for FeatureEntry {
    type Error = scroll::Error;

    fn try_into_ctx(self, dest: &mut [u8], ctx: Endian) -> Result<usize, Self::Error> {
        let mut offset = 0;
        dest.gwrite_with(self.uuid.as_bytes().as_slice(), &mut offset, ())?;
        dest.gwrite_with(self.id, &mut offset, ctx)?;
        dest.gwrite_with(self.get_size, &mut offset, ctx)?;
        dest.gwrite_with(self.set_size, &mut offset, ctx)?;
        dest.gwrite_with(self.flags.into_bits(), &mut offset, ctx)?;
        dest.gwrite_with(self.get_version, &mut offset, ctx)?;
        dest.gwrite_with(self.set_version, &mut offset, ctx)?;
        dest.gwrite_with(self.effects, &mut offset, ctx)?;
        dest.gwrite_with([0u8; 18].as_slice(), &mut offset, ())?;
        Ok(offset)
    }
}

/// Get Supported Features input payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pread, Pwrite)]
pub struct GetSupportedFeaturesIn {
    /// Size in bytes of the output payload the caller can accept, header included.
    pub count: u32,
    /// Index of the first entry to return.
    pub start_index: u16,
    pub reserved: u16,
}

impl GetSupportedFeaturesIn {
    pub const SIZE: usize = 8;
}

/// Get Supported Features output header. Supported Feature entries follow it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pread, Pwrite)]
pub struct GetSupportedFeaturesOutHeader {
    /// Number of entries in this response.
    pub num_entries: u16,
    /// Total number of Features the device supports.
    pub supported_features: u16,
    pub reserved: u32,
}

impl GetSupportedFeaturesOutHeader {
    pub const SIZE: usize = 8;
}

/// Get Feature input payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GetFeatureIn {
    pub uuid: Uuid,
    /// Byte offset into the Feature record.
    pub offset: u16,
    /// Number of bytes to return.
    pub count: u16,
    pub selection: GetFeatureSelection,
}

impl GetFeatureIn {
    pub const SIZE: usize = 21;
}

impl TryFromCtx<'_, Endian> for GetFeatureIn {
    type Error = scroll::Error;

    fn try_from_ctx(from: &[u8], ctx: Endian) -> Result<(Self, usize), Self::Error> {
        let mut offset = 0;
        let uuid = read_uuid(from, &mut offset)?;
        let feature_offset = from.gread_with::<u16>(&mut offset, ctx)?;
        let count = from.gread_with::<u16>(&mut offset, ctx)?;
        let raw_selection = from.gread_with::<u8>(&mut offset, ctx)?;
        let selection = GetFeatureSelection::try_from(raw_selection)
            .map_err(|_| scroll::Error::BadInput { size: offset, msg: "invalid Get Feature selection" })?;
        Ok((Self { uuid, offset: feature_offset, count, selection }, offset))
    }
}

impl TryIntoCtx<Endian> for GetFeatureIn {
    type Error = scroll::Error;

    fn try_into_ctx(self, dest: &mut [u8], ctx: Endian) -> Result<usize, Self::Error> {
        let mut offset = 0;
        dest.gwrite_with(self.uuid.as_bytes().as_slice(), &mut offset, ())?;
        dest.gwrite_with(self.offset, &mut offset, ctx)?;
        dest.gwrite_with(self.count, &mut offset, ctx)?;
        dest.gwrite_with(self.selection as u8, &mut offset, ctx)?;
        Ok(offset)
    }
}

/// Set Feature input header. The record data follows it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SetFeatureHeader {
    pub uuid: Uuid,
    /// Transfer stage and persistence flags.
    pub flags: u32,
    /// Byte offset into the Feature record.
    pub offset: u16,
    /// Set Feature record version.
    pub version: u8,
}

impl SetFeatureHeader {
    pub const SIZE: usize = 32;

    /// Returns the transfer stage encoded in the flags.
    pub fn transfer(&self) -> Option<SetFeatureTransfer> {
        SetFeatureTransfer::from_flags(self.flags)
    }
}

impl TryFromCtx<'_, Endian> for SetFeatureHeader {
    type Error = scroll::Error;

    fn try_from_ctx(from: &[u8], ctx: Endian) -> Result<(Self, usize), Self::Error> {
        let mut offset = 0;
        let uuid = read_uuid(from, &mut offset)?;
        let flags = from.gread_with::<u32>(&mut offset, ctx)?;
        let feature_offset = from.gread_with::<u16>(&mut offset, ctx)?;
        let version = from.gread_with::<u8>(&mut offset, ctx)?;
        from.gread_with::<&[u8]>(&mut offset, 9)?;
        Ok((Self { uuid, flags, offset: feature_offset, version }, offset))
    }
}

impl TryIntoCtx<Endian> for SetFeatureHeader {
    type Error = scroll::Error;

    fn try_into_ctx(self, dest: &mut [u8], ctx: Endian) -> Result<usize, Self::Error> {
        let mut offset = 0;
        dest.gwrite_with(self.uuid.as_bytes().as_slice(), &mut offset, ())?;
        dest.gwrite_with(self.flags, &mut offset, ctx)?;
        dest.gwrite_with(self.offset, &mut offset, ctx)?;
        dest.gwrite_with(self.version, &mut offset, ctx)?;
        dest.gwrite_with([0u8; 9].as_slice(), &mut offset, ())?;
        Ok(offset)
    }
}

/// Perform Maintenance input header. The operation specific payload follows it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pread, Pwrite)]
pub struct MaintenanceHeader {
    pub operation_class: u8,
    pub operation_subclass: u8,
}

impl MaintenanceHeader {
    pub const SIZE: usize = 2;
}
