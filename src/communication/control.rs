//! ## Control
//!
//! Typed wrappers around each class-specific control request (§4.7, §6).
//!

use log::{debug, trace};
use rusb::Direction;

use crate::codec::address_change::{self, AddressChangeRequest, AddressChangeResult};
use crate::codec::capability::{self, CapabilityBuffer};
use crate::codec::device_table;
use crate::codec::target_config::{self, TargetConfigEntry};
use crate::constants::misc::{HDR_MODE_EXIT_RECOVERY_WINDEX_HIGH, MAX_TARGET_DEVICES};
use crate::constants::{bulk_request_action, control_requests};
use crate::error::Result;
use crate::target::TargetDevice;
use crate::types::{Handle, Timeout};

fn w_index(interface_number: u8, high_byte: u8) -> u16 {
    u16::from_le_bytes([interface_number, high_byte])
}

fn read_control(
    handle: &Handle,
    b_request: u8,
    w_value: u16,
    w_index: u16,
    buffer: &mut [u8],
    timeout: &Timeout,
) -> Result<usize> {
    let bm_request_type = rusb::request_type(
        Direction::In,
        rusb::RequestType::Class,
        rusb::Recipient::Interface,
    );
    let n = handle.borrow().read_control(
        bm_request_type,
        b_request,
        w_value,
        w_index,
        buffer,
        timeout.get(),
    )?;
    Ok(n)
}

fn write_control(
    handle: &Handle,
    b_request: u8,
    w_value: u16,
    w_index: u16,
    buffer: &[u8],
    timeout: &Timeout,
) -> Result<()> {
    let bm_request_type = rusb::request_type(
        Direction::Out,
        rusb::RequestType::Class,
        rusb::Recipient::Interface,
    );
    handle.borrow().write_control(
        bm_request_type,
        b_request,
        w_value,
        w_index,
        buffer,
        timeout.get(),
    )?;
    Ok(())
}

/// `GET_I3C_CAPABILITY` (§4.7).
pub fn get_i3c_capability(
    handle: &Handle,
    interface_number: u8,
    timeout: &Timeout,
) -> Result<CapabilityBuffer> {
    let mut buffer = vec![0u8; 4 + 9 * 4 + MAX_TARGET_DEVICES * 16];
    let n = read_control(
        handle,
        control_requests::GET_I3C_CAPABILITY,
        0,
        w_index(interface_number, 0),
        &mut buffer,
        timeout,
    )?;
    trace!("GET_I3C_CAPABILITY: {n} bytes");
    capability::decode(&buffer[..n])
}

/// `INITIALIZE_I3C_BUS(mode)` (§4.7).
pub fn initialize_i3c_bus(
    handle: &Handle,
    interface_number: u8,
    mode: u8,
    timeout: &Timeout,
) -> Result<()> {
    debug!("INITIALIZE_I3C_BUS mode={mode:#x}");
    write_control(
        handle,
        control_requests::INITIALIZE_I3C_BUS,
        mode as u16,
        w_index(interface_number, 0),
        &[],
        timeout,
    )
}

/// `GET_TARGET_DEVICE_TABLE` (§4.7).
pub fn get_target_device_table(
    handle: &Handle,
    interface_number: u8,
    timeout: &Timeout,
) -> Result<Vec<TargetDevice>> {
    let mut buffer = vec![0u8; 4 + MAX_TARGET_DEVICES * 16];
    let n = read_control(
        handle,
        control_requests::GET_TARGET_DEVICE_TABLE,
        0,
        w_index(interface_number, 0),
        &mut buffer,
        timeout,
    )?;
    trace!("GET_TARGET_DEVICE_TABLE: {n} bytes");
    device_table::decode(&buffer[..n])
}

/// `SET_TARGET_DEVICE_CONFIG` (§4.7).
pub fn set_target_device_config(
    handle: &Handle,
    interface_number: u8,
    entries: &[TargetConfigEntry],
    timeout: &Timeout,
) -> Result<()> {
    let buffer = target_config::encode(entries);
    write_control(
        handle,
        control_requests::SET_TARGET_DEVICE_CONFIG,
        0,
        w_index(interface_number, 0),
        &buffer,
        timeout,
    )
}

/// `CHANGE_DYNAMIC_ADDRESS` (§4.7).
pub fn change_dynamic_address(
    handle: &Handle,
    interface_number: u8,
    entries: &[AddressChangeRequest],
    timeout: &Timeout,
) -> Result<()> {
    let buffer = address_change::encode(entries);
    write_control(
        handle,
        control_requests::CHANGE_DYNAMIC_ADDRESS,
        0,
        w_index(interface_number, 0),
        &buffer,
        timeout,
    )
}

/// `GET_ADDRESS_CHANGE_RESULT` (§4.7). Asynchronous in the production
/// contract: the caller is expected to be the helper thread spawned by the
/// notification dispatcher, not the application thread (§C of the expanded
/// design notes).
pub fn get_address_change_result(
    handle: &Handle,
    interface_number: u8,
    timeout: &Timeout,
) -> Result<Vec<AddressChangeResult>> {
    let mut buffer = vec![0u8; MAX_TARGET_DEVICES * 4];
    let n = read_control(
        handle,
        control_requests::GET_ADDRESS_CHANGE_RESULT,
        0,
        w_index(interface_number, 0),
        &mut buffer,
        timeout,
    )?;
    address_change::decode(&buffer[..n])
}

/// `GET_BUFFER_AVAILABLE` (§4.7). Returns the number of free bytes in the
/// device's request buffer.
pub fn get_buffer_available(
    handle: &Handle,
    interface_number: u8,
    timeout: &Timeout,
) -> Result<u32> {
    let mut buffer = [0u8; 4];
    read_control(
        handle,
        control_requests::GET_BUFFER_AVAILABLE,
        0,
        w_index(interface_number, 0),
        &mut buffer,
        timeout,
    )?;
    Ok(u32::from_le_bytes(buffer))
}

/// `SET_FEATURE(selector)` (§4.7).
pub fn set_feature(
    handle: &Handle,
    interface_number: u8,
    selector: u16,
    timeout: &Timeout,
) -> Result<()> {
    write_control(
        handle,
        control_requests::SET_FEATURE,
        selector,
        w_index(interface_number, 0),
        &[],
        timeout,
    )
}

/// `CLEAR_FEATURE(selector)` (§4.7). Only `HDR_MODE_EXIT_RECOVERY` uses a
/// non-zero wIndex high byte.
pub fn clear_feature(
    handle: &Handle,
    interface_number: u8,
    selector: u16,
    timeout: &Timeout,
) -> Result<()> {
    let high_byte = if selector == crate::constants::feature_selector::HDR_MODE_EXIT_RECOVERY {
        HDR_MODE_EXIT_RECOVERY_WINDEX_HIGH
    } else {
        0
    };
    write_control(
        handle,
        control_requests::CLEAR_FEATURE,
        selector,
        w_index(interface_number, high_byte),
        &[],
        timeout,
    )
}

/// `CANCEL_OR_RESUME_BULK_REQUEST` (§4.7). Asynchronous in the production
/// contract; see `get_address_change_result`.
pub fn cancel_or_resume_bulk_request(
    handle: &Handle,
    interface_number: u8,
    resume: bool,
    timeout: &Timeout,
) -> Result<()> {
    let action = if resume {
        bulk_request_action::RESUME
    } else {
        bulk_request_action::CANCEL
    };
    write_control(
        handle,
        control_requests::CANCEL_OR_RESUME_BULK_REQUEST,
        action as u16,
        w_index(interface_number, 0),
        &[],
        timeout,
    )
}
