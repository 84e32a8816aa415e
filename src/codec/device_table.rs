//! `GET_TARGET_DEVICE_TABLE` buffer decoding (§4.3, §4.7).
//!
//! ```text
//! header (1 DW): bits 15:0 table size (number of entries)
//! per entry (4 DW):
//!   DW0 bits 15:8 device type / capability, bits 7:0 current dynamic address
//!   DW1 bits 15:0 max IBI payload size
//!   DW2 bits 31:24 BCR, 23:16 DCR/LVR, 15:0 PID_LO
//!   DW3 PID_HI
//! ```

use crate::constants::misc::DWORD_SIZE;
use crate::error::{Error, Result};
use crate::target::{TargetDevice, TargetDeviceConfig, TargetDeviceType};

const ENTRY_SIZE: usize = 16;

fn dw(buf: &[u8], index: usize) -> Result<u32> {
    let start = index * DWORD_SIZE;
    let end = start + DWORD_SIZE;
    if buf.len() < end {
        return Err(Error::Protocol(format!(
            "target device table buffer truncated at DW{index}"
        )));
    }
    Ok(u32::from_le_bytes(buf[start..end].try_into().unwrap()))
}

pub fn decode(buf: &[u8]) -> Result<Vec<TargetDevice>> {
    let header = dw(buf, 0)?;
    let table_size = (header & 0xFFFF) as usize;

    let mut devices = Vec::with_capacity(table_size);
    for i in 0..table_size {
        let entry_start = DWORD_SIZE + i * ENTRY_SIZE;
        if buf.len() < entry_start + ENTRY_SIZE {
            return Err(Error::Protocol(format!(
                "target device table truncated at entry {i}"
            )));
        }
        let dw0 = u32::from_le_bytes(buf[entry_start..entry_start + 4].try_into().unwrap());
        let dw1 = u32::from_le_bytes(buf[entry_start + 4..entry_start + 8].try_into().unwrap());
        let dw2 = u32::from_le_bytes(buf[entry_start + 8..entry_start + 12].try_into().unwrap());
        let dw3 = u32::from_le_bytes(buf[entry_start + 12..entry_start + 16].try_into().unwrap());

        let current_dynamic_address = (dw0 & 0xFF) as u8;
        let device_type_bits = (dw0 >> 8) & 0xFF;
        let device_type = if device_type_bits & 0x1 != 0 {
            TargetDeviceType::I3c
        } else {
            TargetDeviceType::I2c
        };
        let device_capability = ((dw0 >> 8) & 0xFFFF) as u16;

        let max_ibi_payload_size = dw1 & 0xFFFF;

        let pid_lo = (dw2 & 0xFFFF) as u16;
        let dcr = ((dw2 >> 16) & 0xFF) as u8;
        let bcr = ((dw2 >> 24) & 0xFF) as u8;

        let pid_hi = dw3;

        devices.push(TargetDevice {
            current_dynamic_address,
            static_address: None,
            bcr,
            dcr,
            pid_hi,
            pid_lo,
            device_type,
            device_capability,
            config: TargetDeviceConfig {
                max_ibi_payload_size,
                ..TargetDeviceConfig::default()
            },
        });
    }

    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(address: u8, bcr: u8, dcr: u8) -> [u8; 16] {
        let dw0: u32 = address as u32;
        let dw1: u32 = 64;
        let dw2: u32 = ((bcr as u32) << 24) | ((dcr as u32) << 16) | 0x1234;
        let dw3: u32 = 0x5678;
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&dw0.to_le_bytes());
        out[4..8].copy_from_slice(&dw1.to_le_bytes());
        out[8..12].copy_from_slice(&dw2.to_le_bytes());
        out[12..16].copy_from_slice(&dw3.to_le_bytes());
        out
    }

    /// S1: GET_TARGET_DEVICE_TABLE returns 3 entries with BCR/DCR = pool + i.
    #[test]
    fn decode_three_entries() {
        let pool = 0x08u8;
        let mut buf = Vec::new();
        buf.extend_from_slice(&3u32.to_le_bytes());
        for i in 0..3u8 {
            buf.extend_from_slice(&entry(pool + i, pool + i, pool + i));
        }

        let devices = decode(&buf).unwrap();
        assert_eq!(devices.len(), 3);
        for (i, device) in devices.iter().enumerate() {
            let expected = pool + i as u8;
            assert_eq!(device.current_dynamic_address, expected);
            assert_eq!(device.bcr, expected);
            assert_eq!(device.dcr, expected);
        }
    }

    #[test]
    fn decode_rejects_truncated_entry() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 8]); // only half an entry
        assert!(decode(&buf).is_err());
    }
}
