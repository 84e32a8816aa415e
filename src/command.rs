//! ## Command
//!
//! The command type enqueued by callers and consumed by the command pipeline (§3, §4.4).
//!

use crate::error::{Error, Result};
use crate::response::Response;

/// Read or write direction of a command (DW1 bit 3 of the command block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// What to do with the remaining commands of a bulk request when one of them
/// fails (DW1 bits 7:4 of the command block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorHandling {
    /// Stop processing the bulk request on any error.
    TerminateOnAnyError,
    /// Stop processing on any error except a plain NACK.
    TerminateOnAnyErrorExceptNack,
    /// Keep processing subsequent commands regardless of this one's outcome.
    Continue,
}

impl ErrorHandling {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            ErrorHandling::TerminateOnAnyError => 0,
            ErrorHandling::TerminateOnAnyErrorExceptNack => 1,
            ErrorHandling::Continue => 2,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Option<ErrorHandling> {
        match value {
            0 => Some(ErrorHandling::TerminateOnAnyError),
            1 => Some(ErrorHandling::TerminateOnAnyErrorExceptNack),
            2 => Some(ErrorHandling::Continue),
            _ => None,
        }
    }
}

/// I3C transfer mode (DW1 bits 20:16 of the command block). SDR and HDR-DDR
/// are named explicitly by the spec; other modes are preserved as raw values
/// so the encoder never has to reject a mode it doesn't recognize by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Sdr,
    HdrDdr,
    Other(u8),
}

impl TransferMode {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            TransferMode::Sdr => 0,
            TransferMode::HdrDdr => 1,
            TransferMode::Other(v) => v,
        }
    }

    pub(crate) fn from_wire(value: u8) -> TransferMode {
        match value {
            0 => TransferMode::Sdr,
            1 => TransferMode::HdrDdr,
            other => TransferMode::Other(other),
        }
    }
}

/// Transfer rate (DW1 bits 23:21 of the command block), a 3-bit field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRate(u8);

impl TransferRate {
    pub fn new(value: u8) -> Result<TransferRate> {
        if value > 0b111 {
            return Err(Error::InvalidArgument(format!(
                "transfer rate {value} does not fit in 3 bits"
            )));
        }
        Ok(TransferRate(value))
    }

    pub(crate) fn to_wire(self) -> u8 {
        self.0
    }

    pub(crate) fn from_wire(value: u8) -> TransferRate {
        TransferRate(value & 0b111)
    }
}

impl Default for TransferRate {
    fn default() -> Self {
        TransferRate(0)
    }
}

/// Which of the four command types (DW1 bits 2:0 of the command block) this
/// command is, plus the CCC/defining-byte fields that only some of them carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Regular,
    CccWithoutDefiningByte { ccc: u8 },
    CccWithDefiningByte { ccc: u8, defining_byte: u8 },
    /// The target-reset pattern: no data block, every non-type field is zero (§4.1).
    TargetResetPattern,
}

impl CommandKind {
    pub(crate) fn to_wire_type(self) -> u8 {
        match self {
            CommandKind::Regular => crate::constants::command_type::REGULAR,
            CommandKind::CccWithoutDefiningByte { .. } => {
                crate::constants::command_type::CCC_WITHOUT_DEFINING_BYTE
            }
            CommandKind::CccWithDefiningByte { .. } => {
                crate::constants::command_type::CCC_WITH_DEFINING_BYTE
            }
            CommandKind::TargetResetPattern => {
                crate::constants::command_type::TARGET_RESET_PATTERN
            }
        }
    }

    pub(crate) fn ccc_and_defining_byte(self) -> (u8, u8) {
        match self {
            CommandKind::CccWithoutDefiningByte { ccc } => (ccc, 0),
            CommandKind::CccWithDefiningByte { ccc, defining_byte } => (ccc, defining_byte),
            _ => (0, 0),
        }
    }
}

/// Callback invoked by the event loop when a response to this command arrives
/// on the asynchronous (`submit_commands`) path (§4.4 callback discipline).
pub type ResponseCallback = Box<dyn FnMut(Response) + Send>;

/// A single command to enqueue onto the pipeline (§3).
///
/// `data` borrows the caller's payload; the pipeline only needs it for the
/// duration of encoding (the Ownership summary in §3), so by the time
/// `enqueue` returns the bytes have already been copied into the queue.
pub struct Command<'a> {
    pub kind: CommandKind,
    pub direction: Direction,
    /// Target address, 0-127. 0x7E is broadcast, 0x02 is hot-join.
    pub target_address: u8,
    pub error_handling: ErrorHandling,
    pub transfer_mode: TransferMode,
    pub transfer_rate: TransferRate,
    /// Data length: for reads, the number of bytes to read; for writes, the
    /// number of payload bytes. 0..=2^22-1.
    pub data_length: u32,
    pub data: Option<&'a [u8]>,
    pub on_response_cb: Option<ResponseCallback>,
}

impl<'a> Command<'a> {
    /// A plain regular write command with a payload.
    pub fn write(target_address: u8, data: &'a [u8]) -> Command<'a> {
        Command {
            kind: CommandKind::Regular,
            direction: Direction::Write,
            target_address,
            error_handling: ErrorHandling::TerminateOnAnyError,
            transfer_mode: TransferMode::Sdr,
            transfer_rate: TransferRate::default(),
            data_length: data.len() as u32,
            data: Some(data),
            on_response_cb: None,
        }
    }

    /// A plain regular read command for `data_length` bytes.
    pub fn read(target_address: u8, data_length: u32) -> Command<'a> {
        Command {
            kind: CommandKind::Regular,
            direction: Direction::Read,
            target_address,
            error_handling: ErrorHandling::TerminateOnAnyError,
            transfer_mode: TransferMode::Sdr,
            transfer_rate: TransferRate::default(),
            data_length,
            data: None,
            on_response_cb: None,
        }
    }

    /// A target-reset-pattern command; carries no data by construction (§4.1).
    pub fn target_reset(target_address: u8) -> Command<'a> {
        Command {
            kind: CommandKind::TargetResetPattern,
            direction: Direction::Write,
            target_address,
            error_handling: ErrorHandling::TerminateOnAnyError,
            transfer_mode: TransferMode::Sdr,
            transfer_rate: TransferRate::default(),
            data_length: 0,
            data: None,
            on_response_cb: None,
        }
    }

    pub fn with_on_response(mut self, cb: ResponseCallback) -> Command<'a> {
        self.on_response_cb = Some(cb);
        self
    }

    pub fn with_error_handling(mut self, eh: ErrorHandling) -> Command<'a> {
        self.error_handling = eh;
        self
    }

    pub fn with_transfer(mut self, mode: TransferMode, rate: TransferRate) -> Command<'a> {
        self.transfer_mode = mode;
        self.transfer_rate = rate;
        self
    }

    /// Validate the read/write + data_length/data agreement invariant (§3):
    /// reads have `data_length > 0` and no data; writes with `data_length > 0`
    /// must carry a payload of exactly that length.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.data_length > 0x3F_FFFF {
            return Err(Error::InvalidArgument(format!(
                "data_length {} exceeds 22-bit maximum",
                self.data_length
            )));
        }
        match self.direction {
            Direction::Read => {
                if self.data.is_some() {
                    return Err(Error::InvalidArgument(
                        "read commands must not carry data".into(),
                    ));
                }
            }
            Direction::Write => {
                if self.data_length > 0 {
                    match self.data {
                        Some(data) if data.len() as u32 == self.data_length => {}
                        Some(data) => {
                            return Err(Error::InvalidArgument(format!(
                                "write command declares data_length {} but carries {} bytes",
                                self.data_length,
                                data.len()
                            )))
                        }
                        None => {
                            return Err(Error::InvalidArgument(
                                "write command with data_length > 0 must carry data".into(),
                            ))
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Owned copy of a `Command`'s fields, as held in the per-device queue and in
/// the request tracker. The pipeline makes this copy at `enqueue` time so the
/// caller's borrow only needs to live for the duration of that call.
pub(crate) struct QueuedCommand {
    pub kind: CommandKind,
    pub direction: Direction,
    pub target_address: u8,
    pub error_handling: ErrorHandling,
    pub transfer_mode: TransferMode,
    pub transfer_rate: TransferRate,
    pub data_length: u32,
    pub data: Option<Vec<u8>>,
    pub on_response_cb: Option<ResponseCallback>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_with_matching_data_length_is_valid() {
        let cmd = Command::write(1, &[1, 2, 3]);
        assert!(cmd.validate().is_ok());
    }

    #[test]
    fn write_with_mismatched_data_length_is_rejected() {
        let mut cmd = Command::write(1, &[1, 2, 3]);
        cmd.data_length = 4;
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn write_declaring_data_length_without_payload_is_rejected() {
        let mut cmd = Command::write(1, &[]);
        cmd.data_length = 4;
        cmd.data = None;
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn read_is_valid_without_data() {
        let cmd = Command::read(1, 16);
        assert!(cmd.validate().is_ok());
    }

    #[test]
    fn read_carrying_data_is_rejected() {
        let payload = [1u8, 2];
        let mut cmd = Command::read(1, 16);
        cmd.data = Some(&payload);
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn data_length_over_22_bits_is_rejected() {
        let mut cmd = Command::read(1, 0);
        cmd.data_length = 1 << 22;
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn target_reset_carries_no_data() {
        let cmd = Command::target_reset(0x7E);
        assert!(cmd.validate().is_ok());
        assert_eq!(cmd.kind, CommandKind::TargetResetPattern);
        assert_eq!(cmd.data_length, 0);
    }

    #[test]
    fn transfer_rate_rejects_values_wider_than_three_bits() {
        assert!(TransferRate::new(0b1000).is_err());
        assert!(TransferRate::new(0b111).is_ok());
    }
}

impl<'a> From<Command<'a>> for QueuedCommand {
    fn from(cmd: Command<'a>) -> QueuedCommand {
        QueuedCommand {
            kind: cmd.kind,
            direction: cmd.direction,
            target_address: cmd.target_address,
            error_handling: cmd.error_handling,
            transfer_mode: cmd.transfer_mode,
            transfer_rate: cmd.transfer_rate,
            data_length: cmd.data_length,
            data: cmd.data.map(|d| d.to_vec()),
            on_response_cb: cmd.on_response_cb,
        }
    }
}
