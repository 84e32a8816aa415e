//! ## Target device
//!
//! A single entry of the target device table (§3, §4.3).
//!

/// Whether a target device speaks I2C or I3C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetDeviceType {
    I2c,
    I3c,
}

/// Per-device configuration, set through `SET_TARGET_DEVICE_CONFIG` (§4.7).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetDeviceConfig {
    pub in_band_interrupt_request: bool,
    pub controller_role_request: bool,
    pub target_interrupt_request: bool,
    pub max_ibi_payload_size: u32,
}

/// A mirror of one row of the I3C Function's target device table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDevice {
    pub current_dynamic_address: u8,
    pub static_address: Option<u8>,
    pub bcr: u8,
    pub dcr: u8,
    pub pid_hi: u32,
    pub pid_lo: u16,
    pub device_type: TargetDeviceType,
    pub device_capability: u16,
    pub config: TargetDeviceConfig,
}
