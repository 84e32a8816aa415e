//! ## Constants
//!
//! Various constants used throughout the project.
//!

#[allow(unused)]
pub mod usb {
    /// bInterfaceClass assigned to the USB I3C device class.
    pub const I3C_CLASS_CODE: u8 = 0x3C;
    /// bInterfaceSubClass for the I3C Function interface.
    pub const I3C_SUBCLASS_CODE: u8 = 0x00;
    /// bInterfaceProtocol for the I3C Function interface.
    pub const I3C_PROTOCOL_CODE: u8 = 0x01;
}

#[allow(unused)]
pub mod misc {
    use std::time::Duration;

    /// The default timeout duration for synchronous control and bulk transfers.
    pub const DEFAULT_TIMEOUT_DURATION: Duration = Duration::from_secs(2);
    /// Duration of a single polling pass in the event loop.
    pub const EVENT_LOOP_POLL_TIMEOUT: Duration = Duration::from_millis(50);
    /// Broadcast target address.
    pub const BROADCAST_ADDRESS: u8 = 0x7E;
    /// Hot-join target address.
    pub const HOT_JOIN_ADDRESS: u8 = 0x02;
    /// Default number of times a stalled request may be resumed before it is cancelled.
    pub const DEFAULT_REATTEMPT_MAX: u8 = 2;
    /// Size, in bytes, of a double word on the wire.
    pub const DWORD_SIZE: usize = 4;
    /// Upper bound on target-device-table entries used to size the scratch
    /// buffer for `GET_TARGET_DEVICE_TABLE`/`GET_I3C_CAPABILITY`; the actual
    /// count is read back from the transfer's reported length.
    pub const MAX_TARGET_DEVICES: usize = 32;
    /// wIndex high byte used for CLEAR_FEATURE(HDR_MODE_EXIT_RECOVERY); every
    /// other feature/index combination leaves the high byte at 0.
    pub const HDR_MODE_EXIT_RECOVERY_WINDEX_HIGH: u8 = 0x7E;
}

/// bRequest codes for the class-specific control requests (§6).
#[allow(unused)]
pub mod control_requests {
    pub const CLEAR_FEATURE: u8 = 0x01;
    pub const SET_FEATURE: u8 = 0x03;
    pub const GET_I3C_CAPABILITY: u8 = 0x10;
    pub const INITIALIZE_I3C_BUS: u8 = 0x11;
    pub const GET_TARGET_DEVICE_TABLE: u8 = 0x12;
    pub const SET_TARGET_DEVICE_CONFIG: u8 = 0x13;
    pub const CHANGE_DYNAMIC_ADDRESS: u8 = 0x14;
    pub const GET_ADDRESS_CHANGE_RESULT: u8 = 0x15;
    pub const GET_BUFFER_AVAILABLE: u8 = 0x16;
    pub const CANCEL_OR_RESUME_BULK_REQUEST: u8 = 0x17;
}

/// Feature selectors for SET_FEATURE / CLEAR_FEATURE.
#[allow(unused)]
pub mod feature_selector {
    pub const HDR_MODE_EXIT_RECOVERY: u16 = 0x0001;
    pub const I3C_CONTROLLER_ROLE_HANDOFF: u16 = 0x0002;
    pub const REGULAR_IBI: u16 = 0x0003;
    pub const HOT_JOIN: u16 = 0x0004;
    pub const REGULAR_IBI_WAKE: u16 = 0x0005;
    pub const HOT_JOIN_WAKE: u16 = 0x0006;
    pub const I3C_CONTROLLER_ROLE_REQUEST_WAKE: u16 = 0x0007;

    /// wIndex to use for CLEAR_FEATURE(HDR_MODE_EXIT_RECOVERY); every other
    /// feature/index combination uses 0.
    pub const HDR_MODE_EXIT_RECOVERY_INDEX: u16 = 0x7E00;
}

/// Command type field (DW1 bits 2:0) of a bulk request command block.
#[allow(unused)]
pub mod command_type {
    pub const REGULAR: u8 = 0x0;
    pub const CCC_WITHOUT_DEFINING_BYTE: u8 = 0x1;
    pub const CCC_WITH_DEFINING_BYTE: u8 = 0x2;
    pub const TARGET_RESET_PATTERN: u8 = 0x3;
}

/// Response kind field of a bulk response transfer header.
#[allow(unused)]
pub mod response_kind {
    pub const REGULAR: u8 = 0;
    pub const INTERRUPT: u8 = 1;
    pub const VENDOR_SPECIFIC: u8 = 2;
}

/// Notification type field of an interrupt notification DW.
#[allow(unused)]
pub mod notification_type {
    pub const I3C_BUS_INITIALIZATION_STATUS: u8 = 0x00;
    pub const STALL_ON_NACK: u8 = 0x01;
    pub const ADDRESS_CHANGE_STATUS: u8 = 0x02;
    pub const ACTIVE_I3C_CONTROLLER_EVENT: u8 = 0x03;
    pub const I3C_BUS_ERROR: u8 = 0x04;
}

/// Command type field used in a SET_TARGET_DEVICE_CONFIG / CHANGE_DYNAMIC_ADDRESS
/// class-specific request header (DW0 bits 3:0).
#[allow(unused)]
pub mod config_command_type {
    pub const CHANGE_CONFIG_COMMAND_TYPE: u8 = 0x01;
    pub const ADDRESS_CHANGE_COMMAND_TYPE: u8 = 0x02;
}

/// Payload selector for CANCEL_OR_RESUME_BULK_REQUEST.
#[allow(unused)]
pub mod bulk_request_action {
    pub const CANCEL: u8 = 0x00;
    pub const RESUME: u8 = 0x01;
}

/// INITIALIZE_I3C_BUS mode values.
#[allow(unused)]
pub mod bus_init_mode {
    pub const CONTROLLER_DECIDED: u8 = 0x00;
    pub const SET_STATIC_AS_DYNAMIC: u8 = 0x01;
    pub const ENTER_DYNAMIC_ADDRESS_ASSIGNMENT: u8 = 0x02;
}

/// Address-change-status notification codes.
#[allow(unused)]
pub mod address_change_code {
    pub const ALL_SUCCEEDED: u8 = 0x00;
    pub const SOME_FAILED: u8 = 0x01;
}
