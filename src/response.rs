//! ## Response
//!
//! The response type produced by the bulk-in parser and delivered either to
//! a synchronous caller or to an asynchronous callback (§3, §4.5).
//!

/// Device-reported error status (DW1 bits 31:28 of a response descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    Succeeded,
    CrcError,
    ParityError,
    FrameError,
    AddressHeaderError,
    AddressArbitratedAway,
    Nack,
    Overflow,
    Underflow,
    AbortedByController,
    AbortedByTarget,
    /// A status value the spec does not name; preserved verbatim.
    Other(u8),
}

impl ErrorStatus {
    pub(crate) fn from_wire(value: u8) -> ErrorStatus {
        match value {
            0x0 => ErrorStatus::Succeeded,
            0x1 => ErrorStatus::CrcError,
            0x2 => ErrorStatus::ParityError,
            0x3 => ErrorStatus::FrameError,
            0x4 => ErrorStatus::AddressHeaderError,
            0x5 => ErrorStatus::AddressArbitratedAway,
            0x6 => ErrorStatus::Nack,
            0x7 => ErrorStatus::Overflow,
            0x8 => ErrorStatus::Underflow,
            0x9 => ErrorStatus::AbortedByController,
            0xA => ErrorStatus::AbortedByTarget,
            other => ErrorStatus::Other(other),
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ErrorStatus::Succeeded)
    }
}

/// The outcome of a single command, as matched back against its request ID (§3).
#[derive(Debug, Clone)]
pub struct Response {
    pub request_id: u16,
    /// Whether the I3C Function actually attempted this command (it may not
    /// have, e.g. because an earlier command in the same bulk request
    /// terminated the rest under `ErrorHandling::TerminateOnAnyError`).
    pub attempted: bool,
    pub has_data: bool,
    pub error_status: ErrorStatus,
    pub data: Vec<u8>,
}

impl Response {
    /// A response synthesized for a command the device reports as not attempted;
    /// no descriptor was present on the wire for it (§4.5).
    pub(crate) fn not_attempted(request_id: u16) -> Response {
        Response {
            request_id,
            attempted: false,
            has_data: false,
            error_status: ErrorStatus::Other(0),
            data: Vec::new(),
        }
    }

    pub fn data_length(&self) -> usize {
        self.data.len()
    }
}
