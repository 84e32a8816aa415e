//! Interrupt notification decoding (§4.1, §4.6).
//!
//! ```text
//! 1 DW: bits 31:24 notification code, bits 23:16 notification type,
//!       bits 15:0 opaque value (request id, address pair, etc.)
//! ```

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub code: u8,
    pub notification_type: u8,
    pub value: u16,
}

pub fn decode(buf: &[u8]) -> Result<Notification> {
    if buf.len() < 4 {
        return Err(Error::Protocol("notification buffer shorter than 1 DW".into()));
    }
    let dw0 = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    Ok(Notification {
        code: ((dw0 >> 24) & 0xFF) as u8,
        notification_type: ((dw0 >> 16) & 0xFF) as u8,
        value: (dw0 & 0xFFFF) as u16,
    })
}

#[cfg(test)]
pub fn encode(notification: &Notification) -> [u8; 4] {
    let dw0: u32 = ((notification.code as u32) << 24)
        | ((notification.notification_type as u32) << 16)
        | (notification.value as u32);
    dw0.to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::notification_type;

    #[test]
    fn round_trip_stall_on_nack() {
        let notification = Notification {
            code: 0,
            notification_type: notification_type::STALL_ON_NACK,
            value: 7,
        };
        let encoded = encode(&notification);
        assert_eq!(decode(&encoded).unwrap(), notification);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert!(decode(&[0, 0, 0]).is_err());
    }
}
