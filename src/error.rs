//! ## Errors
//!
//! The error taxonomy used throughout the crate (§7).
//!

use crate::response::{ErrorStatus, Response};

#[allow(unused)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A command, argument, or configuration value is malformed or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The I3C Function is not the active controller, or lacks the capability
    /// flag required for the requested feature change.
    #[error("device does not support the requested feature")]
    UnsupportedFeature,

    /// `send_commands`/`submit_commands` was called with nothing queued.
    #[error("command queue is empty")]
    EmptyQueue,

    /// No device matched the connection filter.
    #[error("device not found")]
    DeviceNotFound,

    /// The enumerated device does not expose an I3C Function interface.
    #[error("device does not expose an I3C Function interface")]
    DeviceIncompatible,

    /// A required endpoint (bulk in/out, interrupt) was not present.
    #[error("required endpoint not found")]
    EndpointNotFound,

    /// A USB transport call returned a non-zero/failure result; surfaced verbatim.
    #[error("USB transport error: {0}")]
    Transport(#[from] rusb::Error),

    /// GET_BUFFER_AVAILABLE reported less free space than the encoded request needs.
    #[error("not enough buffer space available on the device: need {needed}, have {available}")]
    InsufficientBuffer { needed: u32, available: u32 },

    /// A bulk-in or notification buffer could not be parsed, or the response
    /// stream desynchronized (unknown or duplicate request ID).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A response carries a non-zero device error status.
    #[error("device reported an error: {0:?}")]
    Device(ErrorStatus),

    /// A synchronous send did not complete within the requested timeout.
    /// Carries whatever responses had already been matched, per §5's
    /// "responses already matched remain attached ... and will be delivered
    /// if the call is retried" — here surfaced directly instead, since the
    /// records were already detached from the tracker to collect them.
    #[error("timed out waiting for {} of {total} responses", total - .responses.len())]
    Timeout { responses: Vec<Response>, total: usize },

    /// The target device table, request tracker, or address-change tracker
    /// has no matching entry.
    #[error("no matching entry found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, Error>;
