//! ## Request tracker
//!
//! A lock-protected ordered sequence of outstanding regular requests, plus a
//! single pending vendor-specific request slot (§4.2).
//!
//! Invariant (§8.1): for every request ID in the tracker there is exactly one
//! record; a response is attached at most once; a record is removed by
//! cancellation, a synchronous take, or completion of the async callback.

use std::sync::{Condvar, Mutex};

use crate::command::ResponseCallback;
use crate::constants::misc::DEFAULT_REATTEMPT_MAX;
use crate::response::Response;

/// Which entry point committed this record: it decides whether the event
/// loop is allowed to fire `on_response_cb` for it (§4.4 callback discipline:
/// the synchronous path never invokes callbacks, even if one is present).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Sync,
    Async,
}

/// One outstanding command, as recorded when a bulk request transfer is committed (§3).
pub(crate) struct RequestRecord {
    pub request_id: u16,
    pub total_commands: u16,
    pub dependent_on_previous: bool,
    pub reattempt_count: u8,
    pub response: Option<Response>,
    pub on_response_cb: Option<ResponseCallback>,
    pub delivery: Delivery,
}

/// The single outstanding vendor-specific request, if any.
pub(crate) struct VendorSlot {
    pub callback: Box<dyn FnMut(Vec<u8>) + Send>,
}

/// Outcome of `take_response` (§4.2): the tracker may have no record at all
/// for the ID, a record with no response attached yet, or a completed response.
pub(crate) enum TakeResponse {
    NoRecord,
    Pending,
    Response(Response),
}

struct Inner {
    records: Vec<RequestRecord>,
    vendor: Option<VendorSlot>,
    reattempt_max: u8,
}

pub struct RequestTracker {
    inner: Mutex<Inner>,
    /// Signalled every time a response is attached, so `send_commands` can
    /// block on responses for its own IDs without polling.
    ready: Condvar,
}

impl RequestTracker {
    pub fn new() -> RequestTracker {
        RequestTracker {
            inner: Mutex::new(Inner {
                records: Vec::new(),
                vendor: None,
                reattempt_max: DEFAULT_REATTEMPT_MAX,
            }),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn append(&self, record: RequestRecord) {
        self.inner.lock().unwrap().records.push(record);
    }

    pub(crate) fn remove(&self, request_id: u16) -> Option<RequestRecord> {
        let mut inner = self.inner.lock().unwrap();
        let pos = inner.records.iter().position(|r| r.request_id == request_id)?;
        Some(inner.records.remove(pos))
    }

    /// Attach a response to the matching record. Returns `false` if no
    /// record exists for `request_id`, or if it already has a response
    /// attached (§8.1: a response is attached at most once).
    pub(crate) fn attach_response(&self, response: Response) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let attached = match inner.records.iter_mut().find(|r| r.request_id == response.request_id) {
            Some(record) if record.response.is_none() => {
                record.response = Some(response);
                true
            }
            _ => false,
        };
        if attached {
            self.ready.notify_all();
        }
        attached
    }

    /// Delivery mode the record was committed with, or `None` if it is gone.
    pub(crate) fn delivery_of(&self, request_id: u16) -> Option<Delivery> {
        self.inner.lock().unwrap().records.iter().find(|r| r.request_id == request_id).map(|r| r.delivery)
    }

    /// Block until every one of `ids` either has a response attached or has
    /// left the tracker (cancelled), or until `deadline`. Returns `true` if
    /// all ids were resolved before the deadline.
    pub(crate) fn wait_until_ready(&self, ids: &[u16], deadline: std::time::Instant) -> bool {
        let mut inner = self.inner.lock().unwrap();
        loop {
            let all_ready = ids.iter().all(|id| {
                inner
                    .records
                    .iter()
                    .find(|r| r.request_id == *id)
                    .map(|r| r.response.is_some())
                    .unwrap_or(true)
            });
            if all_ready {
                return true;
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, timeout_result) = self
                .ready
                .wait_timeout(inner, deadline - now)
                .unwrap();
            inner = guard;
            if timeout_result.timed_out() {
                let all_ready = ids.iter().all(|id| {
                    inner
                        .records
                        .iter()
                        .find(|r| r.request_id == *id)
                        .map(|r| r.response.is_some())
                        .unwrap_or(true)
                });
                return all_ready;
            }
        }
    }

    /// Take the callback and the just-attached response snapshot for a
    /// record, without removing it. Used by the async response-delivery path
    /// so the dispatcher can fire the callback outside the lock (§9: "do not
    /// remove the record from the tracker inside the callback").
    pub(crate) fn take_ready(&self, request_id: u16) -> Option<(Response, Option<ResponseCallback>)> {
        let mut inner = self.inner.lock().unwrap();
        let pos = inner.records.iter().position(|r| r.request_id == request_id && r.response.is_some())?;
        let mut record = inner.records.remove(pos);
        let response = record.response.take()?;
        Some((response, record.on_response_cb.take()))
    }

    /// Remove and return every `Delivery::Async` record that now has a
    /// response attached, for the event loop to fire callbacks for outside
    /// the lock (§4.4 callback discipline: only the async path invokes
    /// `on_response_cb`).
    pub(crate) fn drain_async_ready(&self) -> Vec<(Response, Option<ResponseCallback>)> {
        let mut inner = self.inner.lock().unwrap();
        let mut ready = Vec::new();
        let mut i = 0;
        while i < inner.records.len() {
            if inner.records[i].delivery == Delivery::Async && inner.records[i].response.is_some() {
                let mut record = inner.records.remove(i);
                ready.push((record.response.take().unwrap(), record.on_response_cb.take()));
            } else {
                i += 1;
            }
        }
        ready
    }

    /// Look at the response attached to `request_id` without detaching the
    /// record, used to report partial progress on a synchronous-send timeout
    /// (§5) while leaving the record available for later resolution.
    pub(crate) fn peek_response(&self, request_id: u16) -> Option<Response> {
        self.inner
            .lock()
            .unwrap()
            .records
            .iter()
            .find(|r| r.request_id == request_id)
            .and_then(|r| r.response.clone())
    }

    /// Synchronous take (§4.2): detach the response for `request_id` from
    /// the tracker, removing the record. Returns `TakeResponse::Pending` if
    /// the record exists but has no response yet.
    pub(crate) fn take_response(&self, request_id: u16) -> TakeResponse {
        let mut inner = self.inner.lock().unwrap();
        let Some(pos) = inner.records.iter().position(|r| r.request_id == request_id) else {
            return TakeResponse::NoRecord;
        };
        if inner.records[pos].response.is_none() {
            return TakeResponse::Pending;
        }
        let mut record = inner.records.remove(pos);
        TakeResponse::Response(record.response.take().unwrap())
    }

    /// Cancel a stalled request and its dependent follow-ups (§4.2, §8.3/§8.4).
    ///
    /// Removes the record for `stalled_id`, then walks forward from the
    /// position right after it, removing every contiguous record with
    /// `dependent_on_previous == true`; stops at the first independent
    /// record (which, along with everything after it, survives).
    pub(crate) fn cancel_stalled(&self, stalled_id: u16) -> Vec<u16> {
        let mut inner = self.inner.lock().unwrap();
        let Some(pos) = inner.records.iter().position(|r| r.request_id == stalled_id) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        let removed_record = inner.records.remove(pos);
        removed.push(removed_record.request_id);
        while pos < inner.records.len() && inner.records[pos].dependent_on_previous {
            removed.push(inner.records.remove(pos).request_id);
        }
        removed
    }

    pub(crate) fn reattempt_count(&self, request_id: u16) -> Option<u8> {
        let inner = self.inner.lock().unwrap();
        inner.records.iter().find(|r| r.request_id == request_id).map(|r| r.reattempt_count)
    }

    /// Increment the reattempt counter for `request_id`; returns the new count.
    pub(crate) fn increment_reattempt(&self, request_id: u16) -> Option<u8> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.records.iter_mut().find(|r| r.request_id == request_id)?;
        record.reattempt_count += 1;
        Some(record.reattempt_count)
    }

    pub(crate) fn contains(&self, request_id: u16) -> bool {
        self.inner.lock().unwrap().records.iter().any(|r| r.request_id == request_id)
    }

    pub fn reattempt_max(&self) -> u8 {
        self.inner.lock().unwrap().reattempt_max
    }

    pub fn set_reattempt_max(&self, value: u8) {
        self.inner.lock().unwrap().reattempt_max = value;
    }

    pub(crate) fn set_vendor(&self, callback: Box<dyn FnMut(Vec<u8>) + Send>) {
        self.inner.lock().unwrap().vendor = Some(VendorSlot { callback });
    }

    pub(crate) fn take_vendor(&self) -> Option<VendorSlot> {
        self.inner.lock().unwrap().vendor.take()
    }

    /// Drop all pending records and the vendor slot. Used on teardown.
    pub(crate) fn reset_pending_responses(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.records.clear();
        inner.vendor = None;
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        RequestTracker::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(request_id: u16, dependent_on_previous: bool) -> RequestRecord {
        RequestRecord {
            request_id,
            total_commands: 1,
            dependent_on_previous,
            reattempt_count: 0,
            response: None,
            on_response_cb: None,
            delivery: Delivery::Async,
        }
    }

    fn seed(tracker: &RequestTracker, dependencies: &[(u16, bool)]) {
        for (id, dep) in dependencies {
            tracker.append(record(*id, *dep));
        }
    }

    /// S3: stall-on-nack at reattempt_max for ID 1, with ID 3 starting a new,
    /// independent bulk request; only 1 and 2 are cancelled.
    #[test]
    fn cancel_stalled_stops_at_independent_successor() {
        let tracker = RequestTracker::new();
        seed(
            &tracker,
            &[(0, false), (1, true), (2, true), (3, false), (4, true), (5, true)],
        );

        let removed = tracker.cancel_stalled(1);

        assert_eq!(removed, vec![1, 2]);
        for id in [0u16, 3, 4, 5] {
            assert!(tracker.contains(id), "id {id} should survive");
        }
        assert!(!tracker.contains(1));
        assert!(!tracker.contains(2));
    }

    /// S4: same tracker, but ID 3 is dependent on its predecessor too, so
    /// cancellation runs all the way to the end.
    #[test]
    fn cancel_stalled_removes_whole_dependent_chain() {
        let tracker = RequestTracker::new();
        seed(
            &tracker,
            &[(0, false), (1, true), (2, true), (3, true), (4, true), (5, true)],
        );

        let removed = tracker.cancel_stalled(1);

        assert_eq!(removed, vec![1, 2, 3, 4, 5]);
        assert!(tracker.contains(0));
        for id in [1u16, 2, 3, 4, 5] {
            assert!(!tracker.contains(id));
        }
    }

    #[test]
    fn cancel_stalled_unknown_id_is_a_no_op() {
        let tracker = RequestTracker::new();
        seed(&tracker, &[(0, false), (1, true)]);
        assert!(tracker.cancel_stalled(99).is_empty());
        assert!(tracker.contains(0));
        assert!(tracker.contains(1));
    }

    /// S6: two stall-on-nack notifications in sequence, reattempt_max = 2,
    /// starting from reattempt_count = 1.
    #[test]
    fn reattempt_then_cancel_at_max() {
        let tracker = RequestTracker::new();
        tracker.set_reattempt_max(2);
        let mut rec = record(1, false);
        rec.reattempt_count = 1;
        tracker.append(rec);

        let count = tracker.increment_reattempt(1).unwrap();
        assert_eq!(count, 2);
        assert!(tracker.contains(1));

        assert_eq!(tracker.reattempt_count(1).unwrap(), tracker.reattempt_max());
        let removed = tracker.cancel_stalled(1);
        assert_eq!(removed, vec![1]);
        assert!(!tracker.contains(1));
    }

    #[test]
    fn attach_response_rejects_unknown_and_duplicate_ids() {
        let tracker = RequestTracker::new();
        tracker.append(record(1, false));

        assert!(!tracker.attach_response(Response {
            request_id: 2,
            attempted: true,
            has_data: false,
            error_status: crate::response::ErrorStatus::Succeeded,
            data: Vec::new(),
        }));

        assert!(tracker.attach_response(Response {
            request_id: 1,
            attempted: true,
            has_data: false,
            error_status: crate::response::ErrorStatus::Succeeded,
            data: Vec::new(),
        }));

        assert!(!tracker.attach_response(Response {
            request_id: 1,
            attempted: true,
            has_data: false,
            error_status: crate::response::ErrorStatus::Succeeded,
            data: Vec::new(),
        }));
    }

    #[test]
    fn take_response_distinguishes_no_record_from_pending() {
        let tracker = RequestTracker::new();
        tracker.append(record(1, false));

        assert!(matches!(tracker.take_response(2), TakeResponse::NoRecord));
        assert!(matches!(tracker.take_response(1), TakeResponse::Pending));

        tracker.attach_response(Response {
            request_id: 1,
            attempted: true,
            has_data: false,
            error_status: crate::response::ErrorStatus::Succeeded,
            data: Vec::new(),
        });
        assert!(matches!(tracker.take_response(1), TakeResponse::Response(_)));
        assert!(!tracker.contains(1));
    }
}
