//! ## Device info
//!
//! Capabilities and runtime state of the I3C Function itself, populated once
//! from `GET_I3C_CAPABILITY` at initialization (§3, §4.7).
//!

/// Role the I3C Function plays on the downstream bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    PrimaryController,
    SecondaryController,
    Target,
}

impl DeviceRole {
    pub(crate) fn from_wire(value: u8) -> DeviceRole {
        match value {
            0 => DeviceRole::PrimaryController,
            1 => DeviceRole::SecondaryController,
            _ => DeviceRole::Target,
        }
    }
}

/// Whether the I3C Function already knows its downstream targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    StaticData,
    NoStaticData,
}

impl DataType {
    pub(crate) fn from_wire(value: u8) -> DataType {
        match value {
            0 => DataType::StaticData,
            _ => DataType::NoStaticData,
        }
    }
}

/// Capability flags advertised in the I3C Device Data block of
/// `GET_I3C_CAPABILITY` (§4.7). These never change after the initial fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityFlags {
    pub handoff_controller_role: bool,
    pub hot_join: bool,
    pub in_band_interrupt: bool,
}

/// Runtime state bits, mutated only on `SET_FEATURE`/`CLEAR_FEATURE` success (§3, §5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeState {
    pub active_controller: bool,
    pub handoff_enabled: bool,
    pub hot_join_enabled: bool,
    pub ibi_enabled: bool,
}

/// Capabilities and mutable runtime state of the connected I3C Function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub role: DeviceRole,
    pub data_type: DataType,
    pub capability: CapabilityFlags,
    pub state: RuntimeState,
    pub max_ibi_payload_size: u32,
}

impl DeviceInfo {
    pub(crate) fn new(role: DeviceRole, data_type: DataType, capability: CapabilityFlags, max_ibi_payload_size: u32) -> DeviceInfo {
        DeviceInfo {
            role,
            data_type,
            capability,
            state: RuntimeState::default(),
            max_ibi_payload_size,
        }
    }
}
