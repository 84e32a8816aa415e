//! Bulk response transfer decoding (§4.1, §4.5).
//!
//! ```text
//! header (1 DW): bits 1:0 response kind (0 regular, 1 interrupt, 2 vendor-specific)
//! per regular response:
//!   DW0 bit 25 attempted, bit 24 has_data, bits 15:0 request id
//!   DW1 bits 31:28 error status, bits 21:0 data length
//!   DW2 reserved
//!   [padded data block, only if has_data]
//! if attempted == 0, only DW0 is present for that response (no descriptor, no data)
//! ```

use crate::codec::pad;
use crate::error::{Error, Result};
use crate::response::{ErrorStatus, Response};

/// Decode the 1-DW bulk response transfer header, returning the response kind
/// (§6: 0 regular, 1 interrupt, 2 vendor-specific).
pub fn decode_header(buf: &[u8]) -> Result<u8> {
    if buf.len() < 4 {
        return Err(Error::Protocol("bulk response buffer shorter than header".into()));
    }
    let dw0 = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    Ok((dw0 & 0b11) as u8)
}

/// Decode one regular-response entry starting at `buf[0..]`. Returns the
/// response and the number of bytes consumed.
pub fn decode_one(buf: &[u8]) -> Result<(Response, usize)> {
    if buf.len() < 4 {
        return Err(Error::Protocol("response descriptor shorter than 1 DW".into()));
    }
    let dw0 = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let attempted = (dw0 >> 25) & 0x1 != 0;
    let has_data = (dw0 >> 24) & 0x1 != 0;
    let request_id = (dw0 & 0xFFFF) as u16;

    if !attempted {
        return Ok((Response::not_attempted(request_id), 4));
    }

    if buf.len() < 12 {
        return Err(Error::Protocol("response descriptor shorter than 3 DWs".into()));
    }
    let dw1 = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let error_status = ErrorStatus::from_wire(((dw1 >> 28) & 0xF) as u8);
    let data_length = dw1 & 0x3F_FFFF;

    let mut consumed = 12;
    let mut data = Vec::new();
    if has_data {
        let padding = pad(data_length as usize);
        let start = consumed + padding;
        let end = start + data_length as usize;
        if buf.len() < end {
            return Err(Error::Protocol("response data block truncated".into()));
        }
        data = buf[start..end].to_vec();
        consumed = end;
    }

    Ok((
        Response {
            request_id,
            attempted,
            has_data,
            error_status,
            data,
        },
        consumed,
    ))
}

/// Encode one regular-response entry, mirroring `decode_one`. Used by test
/// fixtures to build fake bulk-in buffers.
#[cfg(test)]
pub fn encode_one(response: &Response) -> Vec<u8> {
    let mut out = Vec::new();
    let mut dw0: u32 = response.request_id as u32;
    if response.attempted {
        dw0 |= 1 << 25;
    }
    if response.has_data {
        dw0 |= 1 << 24;
    }
    out.extend_from_slice(&dw0.to_le_bytes());
    if !response.attempted {
        return out;
    }
    let error_status_wire = match response.error_status {
        ErrorStatus::Succeeded => 0x0,
        ErrorStatus::CrcError => 0x1,
        ErrorStatus::ParityError => 0x2,
        ErrorStatus::FrameError => 0x3,
        ErrorStatus::AddressHeaderError => 0x4,
        ErrorStatus::AddressArbitratedAway => 0x5,
        ErrorStatus::Nack => 0x6,
        ErrorStatus::Overflow => 0x7,
        ErrorStatus::Underflow => 0x8,
        ErrorStatus::AbortedByController => 0x9,
        ErrorStatus::AbortedByTarget => 0xA,
        ErrorStatus::Other(v) => v,
    };
    let dw1: u32 = ((error_status_wire as u32 & 0xF) << 28) | (response.data.len() as u32 & 0x3F_FFFF);
    out.extend_from_slice(&dw1.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    if response.has_data {
        let padding = pad(response.data.len());
        out.extend(std::iter::repeat(0u8).take(padding));
        out.extend_from_slice(&response.data);
    }
    out
}

#[cfg(test)]
pub fn encode_header(kind: u8) -> [u8; 4] {
    (kind as u32).to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::response_kind;

    /// S2: a write with a 13-byte "Response data" payload round-trips.
    #[test]
    fn round_trip_attempted_with_data() {
        let response = Response {
            request_id: 42,
            attempted: true,
            has_data: true,
            error_status: ErrorStatus::Succeeded,
            data: b"Response data".to_vec(),
        };
        let encoded = encode_one(&response);
        let (decoded, consumed) = decode_one(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded.request_id, 42);
        assert_eq!(decoded.data, b"Response data");
        assert!(decoded.error_status.is_success());
    }

    /// Not-attempted responses carry only DW0 on the wire (§4.1, §4.5).
    #[test]
    fn not_attempted_has_no_descriptor_or_data() {
        let response = Response {
            request_id: 9,
            attempted: false,
            has_data: false,
            error_status: ErrorStatus::Succeeded,
            data: Vec::new(),
        };
        let encoded = encode_one(&response);
        assert_eq!(encoded.len(), 4);

        let (decoded, consumed) = decode_one(&encoded).unwrap();
        assert_eq!(consumed, 4);
        assert!(!decoded.attempted);
        assert_eq!(decoded.request_id, 9);
    }

    #[test]
    fn header_kind_round_trips() {
        let header = encode_header(response_kind::VENDOR_SPECIFIC);
        assert_eq!(decode_header(&header).unwrap(), response_kind::VENDOR_SPECIFIC);
    }

    #[test]
    fn error_status_preserves_unknown_values() {
        assert_eq!(ErrorStatus::from_wire(0x6), ErrorStatus::Nack);
        assert_eq!(ErrorStatus::from_wire(0xD), ErrorStatus::Other(0xD));
    }
}
