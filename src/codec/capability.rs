//! `GET_I3C_CAPABILITY` buffer decoding (§4.7).
//!
//! ```text
//! header (1 DW): bits 31:24 error code (0 data present, 0xFF no data),
//!                bits 19:18 data type, bits 17:16 device role, bits 15:0 length
//! if data present:
//!   I3C Device Data (9 DW): bits 31:20 capability flags, bits 7:0 static address (DW1);
//!                           major/minor version (DW2); ...; max IBI payload size (DW9)
//!   per target-device entry (4 DW): bits 31:16 PID_LO, bits 15:8 IBI prioritization,
//!                                   bits 7:0 static address (entry DW0); PID_HI (DW1);
//!                                   major/minor version (DW2); reserved (DW3)
//! ```

use crate::constants::misc::DWORD_SIZE;
use crate::device_info::{CapabilityFlags, DataType, DeviceRole};
use crate::error::{Error, Result};

pub const NO_CAPABILITY_DATA_ERROR_CODE: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityEntry {
    pub static_address: u8,
    pub ibi_prioritization: u8,
    pub pid_lo: u16,
    pub pid_hi: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityBuffer {
    pub has_data: bool,
    pub device_role: DeviceRole,
    pub data_type: DataType,
    pub capability: CapabilityFlags,
    pub static_address: u8,
    pub max_ibi_payload_size: u32,
    pub entries: Vec<CapabilityEntry>,
}

fn dw(buf: &[u8], index: usize) -> Result<u32> {
    let start = index * DWORD_SIZE;
    let end = start + DWORD_SIZE;
    if buf.len() < end {
        return Err(Error::Protocol(format!(
            "capability buffer truncated at DW{index}"
        )));
    }
    Ok(u32::from_le_bytes(buf[start..end].try_into().unwrap()))
}

pub fn decode(buf: &[u8]) -> Result<CapabilityBuffer> {
    let header = dw(buf, 0)?;
    let error_code = ((header >> 24) & 0xFF) as u8;
    let data_type = DataType::from_wire(((header >> 18) & 0b11) as u8);
    let device_role = DeviceRole::from_wire(((header >> 16) & 0b11) as u8);

    if error_code == NO_CAPABILITY_DATA_ERROR_CODE {
        return Ok(CapabilityBuffer {
            has_data: false,
            device_role,
            data_type,
            capability: CapabilityFlags::default(),
            static_address: 0,
            max_ibi_payload_size: 0,
            entries: Vec::new(),
        });
    }

    let device_data = dw(buf, 1)?;
    let capability_bits = (device_data >> 20) & 0xFFF;
    let static_address = (device_data & 0xFF) as u8;
    let max_ibi_payload_size = dw(buf, 9)?;

    let capability = CapabilityFlags {
        handoff_controller_role: capability_bits & 0b001 != 0,
        hot_join: capability_bits & 0b010 != 0,
        in_band_interrupt: capability_bits & 0b100 != 0,
    };

    let mut entries = Vec::new();
    let mut index = 10; // first entry starts right after the 1 DW header + 9 DW device data
    while index * DWORD_SIZE + 16 <= buf.len() {
        let entry_dw0 = dw(buf, index)?;
        let entry_dw1 = dw(buf, index + 1)?;
        entries.push(CapabilityEntry {
            static_address: (entry_dw0 & 0xFF) as u8,
            ibi_prioritization: ((entry_dw0 >> 8) & 0xFF) as u8,
            pid_lo: ((entry_dw0 >> 16) & 0xFFFF) as u16,
            pid_hi: entry_dw1,
        });
        index += 4;
    }

    Ok(CapabilityBuffer {
        has_data: true,
        device_role,
        data_type,
        capability,
        static_address,
        max_ibi_payload_size,
        entries,
    })
}

#[cfg(test)]
fn encode(buffer: &CapabilityBuffer) -> Vec<u8> {
    let mut out = Vec::new();

    let data_type = match buffer.data_type {
        DataType::StaticData => 0u32,
        DataType::NoStaticData => 1u32,
    };
    let role = match buffer.device_role {
        crate::device_info::DeviceRole::PrimaryController => 0u32,
        crate::device_info::DeviceRole::SecondaryController => 1u32,
        crate::device_info::DeviceRole::Target => 2u32,
    };

    if !buffer.has_data {
        let header: u32 = ((NO_CAPABILITY_DATA_ERROR_CODE as u32) << 24) | (data_type << 18) | (role << 16);
        out.extend_from_slice(&header.to_le_bytes());
        return out;
    }

    let header: u32 = (data_type << 18) | (role << 16);
    out.extend_from_slice(&header.to_le_bytes());

    let mut capability_bits: u32 = 0;
    if buffer.capability.handoff_controller_role {
        capability_bits |= 0b001;
    }
    if buffer.capability.hot_join {
        capability_bits |= 0b010;
    }
    if buffer.capability.in_band_interrupt {
        capability_bits |= 0b100;
    }
    let device_data: u32 = (capability_bits << 20) | buffer.static_address as u32;
    out.extend_from_slice(&device_data.to_le_bytes());
    for _ in 0..7 {
        out.extend_from_slice(&0u32.to_le_bytes());
    }
    out.extend_from_slice(&buffer.max_ibi_payload_size.to_le_bytes());

    for entry in &buffer.entries {
        let entry_dw0: u32 =
            ((entry.pid_lo as u32) << 16) | ((entry.ibi_prioritization as u32) << 8) | entry.static_address as u32;
        out.extend_from_slice(&entry_dw0.to_le_bytes());
        out.extend_from_slice(&entry.pid_hi.to_le_bytes());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_info::DeviceRole;

    /// S1: capability fetch with role = primary controller, data type =
    /// static, 3 target-device entries.
    #[test]
    fn round_trip_three_entries() {
        let buffer = CapabilityBuffer {
            has_data: true,
            device_role: DeviceRole::PrimaryController,
            data_type: DataType::StaticData,
            capability: CapabilityFlags {
                handoff_controller_role: true,
                hot_join: true,
                in_band_interrupt: false,
            },
            static_address: 0x08,
            max_ibi_payload_size: 256,
            entries: vec![
                CapabilityEntry {
                    static_address: 0x08,
                    ibi_prioritization: 0,
                    pid_lo: 0x1234,
                    pid_hi: 0x5678,
                },
                CapabilityEntry {
                    static_address: 0x09,
                    ibi_prioritization: 1,
                    pid_lo: 0x1235,
                    pid_hi: 0x5678,
                },
                CapabilityEntry {
                    static_address: 0x0A,
                    ibi_prioritization: 2,
                    pid_lo: 0x1236,
                    pid_hi: 0x5678,
                },
            ],
        };

        let encoded = encode(&buffer);
        let decoded = decode(&encoded).unwrap();

        assert_eq!(decoded.device_role, DeviceRole::PrimaryController);
        assert_eq!(decoded.data_type, DataType::StaticData);
        assert!(decoded.capability.handoff_controller_role);
        assert!(decoded.capability.hot_join);
        assert!(!decoded.capability.in_band_interrupt);
        assert_eq!(decoded.max_ibi_payload_size, 256);
        assert_eq!(decoded.entries.len(), 3);
        assert_eq!(decoded.entries[0].static_address, 0x08);
        assert_eq!(decoded.entries[2].pid_lo, 0x1236);
    }

    #[test]
    fn no_data_error_code_short_circuits() {
        let buffer = CapabilityBuffer {
            has_data: false,
            device_role: DeviceRole::Target,
            data_type: DataType::NoStaticData,
            capability: CapabilityFlags::default(),
            static_address: 0,
            max_ibi_payload_size: 0,
            entries: Vec::new(),
        };
        let encoded = encode(&buffer);
        let decoded = decode(&encoded).unwrap();
        assert!(!decoded.has_data);
        assert!(decoded.entries.is_empty());
    }
}
