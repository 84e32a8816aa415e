//! ## Bulk
//!
//! Bulk-out encoding glue and bulk-in parsing glue: turns queued commands
//! into a wire-format bulk request transfer and submits it (§4.1, §4.4), and
//! turns a raw bulk-in buffer into tracker updates (§4.1, §4.2, §4.5).
//!

use log::warn;

use crate::codec;
use crate::constants::response_kind;
use crate::error::{Error, Result};
use crate::tracker::RequestTracker;
use crate::types::{Endpoint, Handle, Timeout};

/// What kind of bulk-in transfer was just parsed, for the event loop to log
/// or act on beyond tracker matching (§4.5).
#[derive(Debug)]
pub enum ResponseTransferKind {
    Regular,
    /// No payload contract is established for this kind (§4.5): dropped gracefully.
    Interrupt,
    VendorSpecific(Vec<u8>),
}

/// Submit an already-encoded bulk request transfer (§4.1, §4.4). The caller
/// is responsible for having already checked `GET_BUFFER_AVAILABLE` and
/// inserted tracker records for the commands it encoded before calling this.
pub fn submit_buffer(handle: &Handle, bulk_out_ep: &Endpoint, buffer: &[u8], timeout: &Timeout) -> Result<()> {
    handle
        .borrow()
        .write_bulk(bulk_out_ep.address, buffer, timeout.get())?;
    Ok(())
}

/// Read one raw bulk-in transfer.
pub fn read_response_transfer(
    handle: &Handle,
    bulk_in_ep: &Endpoint,
    timeout: &Timeout,
) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; bulk_in_ep.max_packet_size as usize];
    let n = handle
        .borrow()
        .read_bulk(bulk_in_ep.address, &mut buffer, timeout.get())?;
    buffer.truncate(n);
    Ok(buffer)
}

/// Parse a bulk-in transfer and apply it to `tracker` (§4.5).
///
/// For regular responses, each descriptor is matched against the tracker by
/// request ID. An unknown or already-resolved ID desynchronizes the stream
/// (§4.5, §4.9): parsing of the remaining buffer stops there, logged rather
/// than propagated, and the caller moves on to the next buffer.
pub fn parse_response_transfer(
    buf: &[u8],
    tracker: &RequestTracker,
) -> Result<ResponseTransferKind> {
    let kind = codec::response::decode_header(buf)?;
    match kind {
        response_kind::REGULAR => {
            let mut offset = 4;
            while offset < buf.len() {
                let (response, consumed) = codec::response::decode_one(&buf[offset..])?;
                let request_id = response.request_id;
                if !tracker.attach_response(response) {
                    warn!(
                        "bulk-in stream desync at request id {request_id}, aborting parse of this transfer"
                    );
                    break;
                }
                offset += consumed;
            }
            Ok(ResponseTransferKind::Regular)
        }
        response_kind::INTERRUPT => Ok(ResponseTransferKind::Interrupt),
        response_kind::VENDOR_SPECIFIC => {
            Ok(ResponseTransferKind::VendorSpecific(buf[4..].to_vec()))
        }
        other => Err(Error::Protocol(format!(
            "unknown bulk response transfer kind {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::response::{encode_header, encode_one};
    use crate::response::{ErrorStatus, Response};
    use crate::tracker::{Delivery, RequestRecord, RequestTracker};

    fn tracker_with(ids: &[u16]) -> RequestTracker {
        let tracker = RequestTracker::new();
        for id in ids {
            tracker.append(RequestRecord {
                request_id: *id,
                total_commands: ids.len() as u16,
                dependent_on_previous: false,
                reattempt_count: 0,
                response: None,
                on_response_cb: None,
                delivery: Delivery::Async,
            });
        }
        tracker
    }

    fn response(id: u16) -> Response {
        Response {
            request_id: id,
            attempted: true,
            has_data: false,
            error_status: ErrorStatus::Succeeded,
            data: Vec::new(),
        }
    }

    #[test]
    fn parses_every_response_in_order() {
        let tracker = tracker_with(&[1, 2, 3]);
        let mut buf = encode_header(response_kind::REGULAR).to_vec();
        buf.extend(encode_one(&response(1)));
        buf.extend(encode_one(&response(2)));
        buf.extend(encode_one(&response(3)));

        parse_response_transfer(&buf, &tracker).unwrap();

        for id in [1u16, 2, 3] {
            assert!(matches!(
                tracker.take_response(id),
                crate::tracker::TakeResponse::Response(_)
            ));
        }
    }

    /// §4.5/§4.9: an unknown request ID desynchronizes the stream; parsing
    /// stops there and responses beyond the violation are not attached.
    #[test]
    fn unknown_request_id_aborts_remaining_parse() {
        let tracker = tracker_with(&[1, 3]);
        let mut buf = encode_header(response_kind::REGULAR).to_vec();
        buf.extend(encode_one(&response(1)));
        buf.extend(encode_one(&response(2))); // not in tracker
        buf.extend(encode_one(&response(3)));

        parse_response_transfer(&buf, &tracker).unwrap();

        assert!(matches!(
            tracker.take_response(1),
            crate::tracker::TakeResponse::Response(_)
        ));
        assert!(matches!(
            tracker.take_response(3),
            crate::tracker::TakeResponse::Pending
        ));
    }

    #[test]
    fn vendor_specific_payload_is_passed_through() {
        let tracker = tracker_with(&[]);
        let mut buf = encode_header(response_kind::VENDOR_SPECIFIC).to_vec();
        buf.extend_from_slice(&[1, 2, 3, 4]);

        match parse_response_transfer(&buf, &tracker).unwrap() {
            ResponseTransferKind::VendorSpecific(payload) => assert_eq!(payload, vec![1, 2, 3, 4]),
            other => panic!("expected vendor-specific, got {other:?}"),
        }
    }
}
