//! `SET_TARGET_DEVICE_CONFIG` buffer encoding (§4.3, §4.7).
//!
//! ```text
//! header (1 DW): bits 15:8 number of entries, bits 7:0 config command type (0x01)
//! per entry (2 DW):
//!   DW0 bit 2 in-band interrupt request, bit 1 controller role request,
//!       bit 0 target interrupt request, bits 15:8 target address
//!   DW1 max IBI payload size
//! ```

use crate::constants::config_command_type::CHANGE_CONFIG_COMMAND_TYPE;
use crate::target::TargetDeviceConfig;

/// One target address paired with the configuration to push down for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetConfigEntry {
    pub target_address: u8,
    pub config: TargetDeviceConfig,
}

pub fn encode(entries: &[TargetConfigEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + entries.len() * 8);

    let header: u32 = ((entries.len() as u32 & 0xFF) << 8) | CHANGE_CONFIG_COMMAND_TYPE as u32;
    out.extend_from_slice(&header.to_le_bytes());

    for entry in entries {
        let mut flags: u32 = 0;
        if entry.config.target_interrupt_request {
            flags |= 1 << 0;
        }
        if entry.config.controller_role_request {
            flags |= 1 << 1;
        }
        if entry.config.in_band_interrupt_request {
            flags |= 1 << 2;
        }
        let dw0: u32 = ((entry.target_address as u32) << 8) | flags;
        out.extend_from_slice(&dw0.to_le_bytes());
        out.extend_from_slice(&entry.config.max_ibi_payload_size.to_le_bytes());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_header_carries_entry_count_and_command_type() {
        let entries = [
            TargetConfigEntry {
                target_address: 0x08,
                config: TargetDeviceConfig::default(),
            },
            TargetConfigEntry {
                target_address: 0x09,
                config: TargetDeviceConfig {
                    in_band_interrupt_request: true,
                    max_ibi_payload_size: 512,
                    ..TargetDeviceConfig::default()
                },
            },
        ];
        let encoded = encode(&entries);
        assert_eq!(encoded.len(), 4 + 2 * 8);
        let header = u32::from_le_bytes(encoded[0..4].try_into().unwrap());
        assert_eq!(header & 0xFF, CHANGE_CONFIG_COMMAND_TYPE as u32);
        assert_eq!((header >> 8) & 0xFF, 2);

        let dw0 = u32::from_le_bytes(encoded[12..16].try_into().unwrap());
        assert_eq!((dw0 >> 8) & 0xFF, 0x09);
        assert_eq!(dw0 & 0b100, 0b100);
        let max_ibi = u32::from_le_bytes(encoded[16..20].try_into().unwrap());
        assert_eq!(max_ibi, 512);
    }
}
