//! ## Notification dispatcher
//!
//! Interprets interrupt notifications (§4.6), issuing follow-up asynchronous
//! class-specific control transfers where required and mutating the tracker
//! or target table under their own locks.
//!

use std::sync::mpsc::Sender;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::codec::address_change::AddressChangeResult;
use crate::codec::notification::Notification;
use crate::communication::control;
use crate::constants::notification_type;
use crate::error::Result;
use crate::table::{AddressChangeOutcome, TargetDeviceTable};
use crate::target::{TargetDevice, TargetDeviceConfig, TargetDeviceType};
use crate::tracker::RequestTracker;
use crate::types::{Handle, Timeout};

/// Outcome of an asynchronous control transfer issued by a notification
/// handler, delivered back through the event loop's completion channel
/// (§C of the expanded design notes; resolves the §9 "async-but-blocking" flag).
pub(crate) enum AsyncCompletion {
    AddressChangeResult(Result<Vec<AddressChangeResult>>),
    BulkRequestAck(Result<()>),
}

/// One user-registered single-slot callback (§4.6: controller-event, bus-error).
pub(crate) struct EventCallback(Mutex<Option<Box<dyn FnMut(u8) + Send>>>);

impl EventCallback {
    pub fn new() -> EventCallback {
        EventCallback(Mutex::new(None))
    }

    pub fn set(&self, cb: Box<dyn FnMut(u8) + Send>) {
        *self.0.lock().unwrap() = Some(cb);
    }

    fn fire(&self, code: u8) {
        if let Some(cb) = self.0.lock().unwrap().as_mut() {
            cb(code);
        }
    }
}

impl Default for EventCallback {
    fn default() -> Self {
        EventCallback::new()
    }
}

/// Signals completion of the `uninitialized → bus_initialized` transition
/// (§4.8): `INITIALIZE_I3C_BUS` is a plain blocking control transfer, but the
/// state transition it starts only completes when the matching
/// bus-initialization-status notification arrives.
pub(crate) struct BusInitSignal {
    state: Mutex<Option<bool>>,
    ready: Condvar,
}

impl BusInitSignal {
    pub fn new() -> BusInitSignal {
        BusInitSignal {
            state: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    pub fn reset(&self) {
        *self.state.lock().unwrap() = None;
    }

    pub fn signal(&self, success: bool) {
        *self.state.lock().unwrap() = Some(success);
        self.ready.notify_all();
    }

    pub fn wait(&self, timeout: Duration) -> Option<bool> {
        let mut state = self.state.lock().unwrap();
        let deadline = Instant::now() + timeout;
        while state.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = self.ready.wait_timeout(state, deadline - now).unwrap();
            state = guard;
            if result.timed_out() && state.is_none() {
                return None;
            }
        }
        *state
    }
}

impl Default for BusInitSignal {
    fn default() -> Self {
        BusInitSignal::new()
    }
}

/// Everything a notification handler needs, bundled so `dispatch` stays a
/// single call from the event loop.
pub(crate) struct NotificationContext<'a> {
    pub handle: &'a Handle,
    pub interface_number: u8,
    pub timeout: &'a Timeout,
    pub tracker: &'a RequestTracker,
    pub table: &'a TargetDeviceTable,
    pub completions_tx: &'a Sender<AsyncCompletion>,
    pub bus_init: &'a BusInitSignal,
    pub controller_event: &'a EventCallback,
    pub bus_error: &'a EventCallback,
}

pub(crate) fn dispatch(notification: Notification, ctx: &NotificationContext) {
    match notification.notification_type {
        notification_type::I3C_BUS_INITIALIZATION_STATUS => handle_bus_init_status(notification, ctx),
        notification_type::STALL_ON_NACK => handle_stall_on_nack(notification, ctx),
        notification_type::ADDRESS_CHANGE_STATUS => handle_address_change_status(ctx),
        notification_type::ACTIVE_I3C_CONTROLLER_EVENT => ctx.controller_event.fire(notification.code),
        notification_type::I3C_BUS_ERROR => ctx.bus_error.fire(notification.code),
        other => warn!("unknown notification type {other}, dropped (§4.9)"),
    }
}

fn handle_bus_init_status(notification: Notification, ctx: &NotificationContext) {
    let success = notification.code == 0;
    debug!("bus initialization status: success={success}");
    ctx.bus_init.signal(success);
}

fn handle_stall_on_nack(notification: Notification, ctx: &NotificationContext) {
    let request_id = notification.value;

    if ctx.tracker.peek_response(request_id).is_some() {
        debug!("stall-on-nack for request {request_id} arrived after its response; dropped");
        return;
    }

    let Some(count) = ctx.tracker.reattempt_count(request_id) else {
        debug!("stall-on-nack for unknown request {request_id}, dropped");
        return;
    };

    if count < ctx.tracker.reattempt_max() {
        ctx.tracker.increment_reattempt(request_id);
        debug!("resuming stalled request {request_id} (reattempt {})", count + 1);
        spawn_bulk_request_ack(ctx, true);
    } else {
        let removed = ctx.tracker.cancel_stalled(request_id);
        debug!("stalled request {request_id} exceeded reattempt_max; cancelled {removed:?}");
        spawn_bulk_request_ack(ctx, false);
    }
}

fn spawn_bulk_request_ack(ctx: &NotificationContext, resume: bool) {
    let handle = ctx.handle.clone();
    let interface_number = ctx.interface_number;
    let timeout = ctx.timeout.clone();
    let tx = ctx.completions_tx.clone();
    std::thread::spawn(move || {
        let result = control::cancel_or_resume_bulk_request(&handle, interface_number, resume, &timeout);
        let _ = tx.send(AsyncCompletion::BulkRequestAck(result));
    });
}

fn handle_address_change_status(ctx: &NotificationContext) {
    let handle = ctx.handle.clone();
    let interface_number = ctx.interface_number;
    let timeout = ctx.timeout.clone();
    let tx = ctx.completions_tx.clone();
    std::thread::spawn(move || {
        let result = control::get_address_change_result(&handle, interface_number, &timeout);
        let _ = tx.send(AsyncCompletion::AddressChangeResult(result));
    });
}

/// Applied by the event loop when an `AddressChangeResult` completion is
/// drained from the channel (§4.6). A result whose `old_address` has no
/// existing table entry is treated as a fresh join (hot-join resolving
/// through the same completion path, since ENTDAA reports the joining
/// device's prior address as unassigned) rather than a move.
pub(crate) fn resolve_address_change_results(entries: Vec<AddressChangeResult>, table: &TargetDeviceTable) {
    for entry in entries {
        let outcome = if entry.succeeded {
            AddressChangeOutcome::Succeeded
        } else {
            AddressChangeOutcome::Failed
        };

        if entry.succeeded && !table.change_address(entry.old_address, entry.new_address) {
            table.insert(TargetDevice {
                current_dynamic_address: entry.new_address,
                static_address: None,
                bcr: 0,
                dcr: 0,
                pid_hi: 0,
                pid_lo: 0,
                device_type: TargetDeviceType::I3c,
                device_capability: 0,
                config: TargetDeviceConfig::default(),
            });
        }

        table.resolve_address_change(entry.old_address, entry.new_address, outcome);
    }
}
