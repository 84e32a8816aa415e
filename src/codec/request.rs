//! Bulk request transfer encoding/decoding (§4.1).
//!
//! ```text
//! transfer header (1 DW): bit 2 dependent_on_previous, bits 1:0 tag
//! per command:
//!   DW0 bit 16 has_data, bits 15:0 request id
//!   DW1 bits 31:24 tm specific info, 23:21 transfer rate, 20:16 transfer mode,
//!       15:8 target address, 7:4 error handling, 3 r/w, 2:0 command type
//!   DW2 bits 15:8 ccc, 7:0 defining byte
//!   DW3 bits 21:0 data length
//!   DW4 reserved
//!   [padded data block]
//! ```

use crate::codec::pad;
use crate::command::{CommandKind, Direction, ErrorHandling, QueuedCommand, TransferMode, TransferRate};
use crate::error::{Error, Result};

/// A single command block as it appears on the wire, decoded back into its
/// constituent fields (§8 invariant 5: round-trip encode/decode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub request_id: u16,
    pub has_data: bool,
    pub transfer_rate: u8,
    pub transfer_mode: u8,
    pub target_address: u8,
    pub error_handling: u8,
    pub direction: Direction,
    pub command_type: u8,
    pub ccc: u8,
    pub defining_byte: u8,
    pub data_length: u32,
    pub data: Vec<u8>,
}

/// Encode the 1-DW transfer header.
fn encode_transfer_header(dependent_on_previous: bool) -> [u8; 4] {
    let word: u32 = if dependent_on_previous { 0b100 } else { 0 };
    word.to_le_bytes()
}

/// Size, in bytes, that `command` will occupy once encoded (5 DW command
/// block plus the padded data block), matching §8 invariant 4's per-command term.
pub fn encoded_command_size(command: &QueuedCommand) -> usize {
    let data_len = wire_data_len(command);
    20 + data_len + pad(data_len)
}

/// Total encoded size of a bulk request transfer carrying `commands` (§8 invariant 4):
/// `4 + sum(20 + len_i + pad(len_i))`.
pub fn encoded_transfer_size(commands: &[QueuedCommand]) -> usize {
    4 + commands.iter().map(encoded_command_size).sum::<usize>()
}

fn wire_data_len(command: &QueuedCommand) -> usize {
    match command.direction {
        Direction::Read => 0,
        Direction::Write => command.data.as_ref().map(|d| d.len()).unwrap_or(0),
    }
}

/// Encode one command block (and its padded data, if any) into `out`.
fn encode_command(out: &mut Vec<u8>, request_id: u16, command: &QueuedCommand) {
    let wire_data_len = wire_data_len(command);
    let has_data = wire_data_len > 0;

    let dw0: u32 = ((has_data as u32) << 16) | (request_id as u32);
    out.extend_from_slice(&dw0.to_le_bytes());

    let (ccc, defining_byte) = command.kind.ccc_and_defining_byte();
    let tm_specific_info: u8 = 0;
    let dw1: u32 = ((tm_specific_info as u32) << 24)
        | (((command.transfer_rate.to_wire() as u32) & 0b111) << 21)
        | (((command.transfer_mode.to_wire() as u32) & 0x1F) << 16)
        | ((command.target_address as u32) << 8)
        | (((command.error_handling.to_wire() as u32) & 0xF) << 4)
        | (((command.direction == Direction::Write) as u32) << 3)
        | (command.kind.to_wire_type() as u32 & 0b111);
    out.extend_from_slice(&dw1.to_le_bytes());

    let dw2: u32 = ((ccc as u32) << 8) | (defining_byte as u32);
    out.extend_from_slice(&dw2.to_le_bytes());

    let dw3: u32 = command.data_length & 0x3F_FFFF;
    out.extend_from_slice(&dw3.to_le_bytes());

    out.extend_from_slice(&0u32.to_le_bytes());

    if has_data {
        let data = command.data.as_ref().expect("has_data implies payload present");
        let padding = pad(data.len());
        out.extend(std::iter::repeat(0u8).take(padding));
        out.extend_from_slice(data);
    }
}

/// Encode a whole bulk request transfer: header, then one command block per
/// `(request_id, command)` pair in `commands`, in order.
pub fn encode_transfer(dependent_on_previous: bool, commands: &[(u16, &QueuedCommand)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + commands.len() * 24);
    out.extend_from_slice(&encode_transfer_header(dependent_on_previous));
    for (request_id, command) in commands {
        encode_command(&mut out, *request_id, command);
    }
    out
}

/// Decode a single command block starting at `buf[0..]`, for round-trip
/// testing (§8 invariant 5). Returns the descriptor and the number of bytes consumed.
pub fn decode_command(buf: &[u8]) -> Result<(CommandDescriptor, usize)> {
    if buf.len() < 20 {
        return Err(Error::Protocol("command block shorter than 20 bytes".into()));
    }
    let dw0 = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let dw1 = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let dw2 = u32::from_le_bytes(buf[8..12].try_into().unwrap());
    let dw3 = u32::from_le_bytes(buf[12..16].try_into().unwrap());

    let has_data = (dw0 >> 16) & 0x1 != 0;
    let request_id = (dw0 & 0xFFFF) as u16;

    let transfer_rate = ((dw1 >> 21) & 0b111) as u8;
    let transfer_mode = ((dw1 >> 16) & 0b1_1111) as u8;
    let target_address = ((dw1 >> 8) & 0xFF) as u8;
    let error_handling = ((dw1 >> 4) & 0xF) as u8;
    let direction = if (dw1 >> 3) & 0x1 != 0 { Direction::Write } else { Direction::Read };
    let command_type = (dw1 & 0b111) as u8;

    let ccc = ((dw2 >> 8) & 0xFF) as u8;
    let defining_byte = (dw2 & 0xFF) as u8;

    let data_length = dw3 & 0x3F_FFFF;

    let mut consumed = 20;
    let mut data = Vec::new();
    if has_data {
        let padding = pad(data_length as usize);
        let start = consumed + padding;
        let end = start + data_length as usize;
        if buf.len() < end {
            return Err(Error::Protocol("command data block truncated".into()));
        }
        data = buf[start..end].to_vec();
        consumed = end;
    }

    Ok((
        CommandDescriptor {
            request_id,
            has_data,
            transfer_rate,
            transfer_mode,
            target_address,
            error_handling,
            direction,
            command_type,
            ccc,
            defining_byte,
            data_length,
            data,
        },
        consumed,
    ))
}

pub(crate) fn error_handling_from_wire(value: u8) -> Option<ErrorHandling> {
    ErrorHandling::from_wire(value)
}

pub(crate) fn transfer_mode_from_wire(value: u8) -> TransferMode {
    TransferMode::from_wire(value)
}

pub(crate) fn transfer_rate_from_wire(value: u8) -> TransferRate {
    TransferRate::from_wire(value)
}

pub(crate) fn command_kind_from_wire(command_type: u8, ccc: u8, defining_byte: u8) -> Option<CommandKind> {
    use crate::constants::command_type as ct;
    match command_type {
        t if t == ct::REGULAR => Some(CommandKind::Regular),
        t if t == ct::CCC_WITHOUT_DEFINING_BYTE => Some(CommandKind::CccWithoutDefiningByte { ccc }),
        t if t == ct::CCC_WITH_DEFINING_BYTE => Some(CommandKind::CccWithDefiningByte { ccc, defining_byte }),
        t if t == ct::TARGET_RESET_PATTERN => Some(CommandKind::TargetResetPattern),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, ErrorHandling};

    fn queued(data: &[u8]) -> QueuedCommand {
        Command::write(1, data).into()
    }

    /// §8 invariant 5: encoding a command then decoding it back yields the
    /// original descriptor bit-exactly.
    #[test]
    fn round_trip_write_with_payload() {
        let cmd = queued(b"Response data");
        let mut buf = Vec::new();
        encode_command(&mut buf, 7, &cmd);

        let (decoded, consumed) = decode_command(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded.request_id, 7);
        assert!(decoded.has_data);
        assert_eq!(decoded.direction, Direction::Write);
        assert_eq!(decoded.data, b"Response data");
        assert_eq!(decoded.data_length, 13);
        assert_eq!(decoded.target_address, 1);
    }

    #[test]
    fn round_trip_read_has_no_data_block() {
        let cmd: QueuedCommand = Command::read(5, 16).into();
        let mut buf = Vec::new();
        encode_command(&mut buf, 2, &cmd);

        let (decoded, consumed) = decode_command(&buf).unwrap();
        assert_eq!(consumed, 20);
        assert!(!decoded.has_data);
        assert_eq!(decoded.direction, Direction::Read);
        assert_eq!(decoded.data_length, 16);
        assert!(decoded.data.is_empty());
    }

    /// §8 invariant 4: encoded size = 4 + sum(20 + len_i + pad(len_i)).
    #[test]
    fn encoded_transfer_size_matches_invariant() {
        let commands = vec![queued(b"abc"), queued(b"Response data"), Command::read(3, 4).into()];
        let expected: usize = 4
            + commands
                .iter()
                .map(|c| {
                    let len = match c.direction {
                        Direction::Write => c.data.as_ref().map(|d| d.len()).unwrap_or(0),
                        Direction::Read => 0,
                    };
                    20 + len + pad(len)
                })
                .sum::<usize>();
        assert_eq!(encoded_transfer_size(&commands), expected);
    }

    #[test]
    fn padding_keeps_blocks_double_word_aligned() {
        let cmd = queued(b"abc"); // 3 bytes, needs 1 byte of padding
        let mut buf = Vec::new();
        encode_command(&mut buf, 0, &cmd);
        assert_eq!(buf.len() % 4, 0);
        assert_eq!(buf.len(), 20 + 4); // 3 data bytes + 1 pad byte
    }

    #[test]
    fn transfer_header_encodes_dependency_bit() {
        assert_eq!(u32::from_le_bytes(encode_transfer_header(true)), 0b100);
        assert_eq!(u32::from_le_bytes(encode_transfer_header(false)), 0);
    }

    #[test]
    fn error_handling_round_trips_through_wire_values() {
        for eh in [
            ErrorHandling::TerminateOnAnyError,
            ErrorHandling::TerminateOnAnyErrorExceptNack,
            ErrorHandling::Continue,
        ] {
            assert_eq!(error_handling_from_wire(eh.to_wire()), Some(eh));
        }
        assert_eq!(error_handling_from_wire(0xF), None);
    }
}
