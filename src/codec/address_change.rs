//! `CHANGE_DYNAMIC_ADDRESS` encoding and `GET_ADDRESS_CHANGE_RESULT` decoding
//! (§4.3, §4.7, §4.8).
//!
//! ```text
//! CHANGE_DYNAMIC_ADDRESS
//!   header (1 DW): bits 15:8 number of entries, bits 7:0 config command type (0x02)
//!   per entry (2 DW):
//!     DW0 bits 15:8 new address, bits 7:0 current address
//!     DW1 PID_HI (ignored on write, present for symmetry with the table entry shape)
//!
//! GET_ADDRESS_CHANGE_RESULT
//!   per entry (1 DW): bits 23:16 status, bits 15:8 new address, bits 7:0 old address
//! ```

use crate::constants::config_command_type::ADDRESS_CHANGE_COMMAND_TYPE;
use crate::constants::misc::DWORD_SIZE;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressChangeRequest {
    pub current_address: u8,
    pub new_address: u8,
}

pub fn encode(entries: &[AddressChangeRequest]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + entries.len() * 8);

    let header: u32 = ((entries.len() as u32 & 0xFF) << 8) | ADDRESS_CHANGE_COMMAND_TYPE as u32;
    out.extend_from_slice(&header.to_le_bytes());

    for entry in entries {
        let dw0: u32 = ((entry.new_address as u32) << 8) | entry.current_address as u32;
        out.extend_from_slice(&dw0.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressChangeResult {
    pub old_address: u8,
    pub new_address: u8,
    pub succeeded: bool,
}

pub fn decode(buf: &[u8]) -> Result<Vec<AddressChangeResult>> {
    if buf.len() % DWORD_SIZE != 0 {
        return Err(Error::Protocol(
            "address change result buffer not double-word aligned".into(),
        ));
    }
    let mut results = Vec::with_capacity(buf.len() / DWORD_SIZE);
    for chunk in buf.chunks_exact(DWORD_SIZE) {
        let dw0 = u32::from_le_bytes(chunk.try_into().unwrap());
        results.push(AddressChangeResult {
            old_address: (dw0 & 0xFF) as u8,
            new_address: ((dw0 >> 8) & 0xFF) as u8,
            succeeded: ((dw0 >> 16) & 0xFF) == 0,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::address_change_code;

    #[test]
    fn encode_change_dynamic_address_request() {
        let entries = [AddressChangeRequest {
            current_address: 0x08,
            new_address: 0x09,
        }];
        let encoded = encode(&entries);
        assert_eq!(encoded.len(), 4 + 8);
        let header = u32::from_le_bytes(encoded[0..4].try_into().unwrap());
        assert_eq!(header & 0xFF, ADDRESS_CHANGE_COMMAND_TYPE as u32);
        assert_eq!((header >> 8) & 0xFF, 1);
        let dw0 = u32::from_le_bytes(encoded[4..8].try_into().unwrap());
        assert_eq!(dw0 & 0xFF, 0x08);
        assert_eq!((dw0 >> 8) & 0xFF, 0x09);
    }

    /// S5: a single succeeded result entry for (old, new).
    #[test]
    fn decode_single_succeeded_result() {
        let dw0: u32 = ((address_change_code::ALL_SUCCEEDED as u32) << 16) | (0x09 << 8) | 0x08;
        let results = decode(&dw0.to_le_bytes()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].old_address, 0x08);
        assert_eq!(results[0].new_address, 0x09);
        assert!(results[0].succeeded);
    }

    #[test]
    fn decode_rejects_misaligned_buffer() {
        assert!(decode(&[0u8; 3]).is_err());
    }
}
