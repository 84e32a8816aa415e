//! ## Event loop
//!
//! One long-lived reader thread per device (§4.5, §9: no general async
//! runtime — a single `std::thread` performing short-timeout blocking reads
//! in round robin over the bulk-in and interrupt endpoints, draining the
//! completion channel fed by the helper threads notification handlers spawn).
//!

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{trace, warn};

use crate::codec;
use crate::communication::bulk::{self, ResponseTransferKind};
use crate::constants::misc::EVENT_LOOP_POLL_TIMEOUT;
use crate::error::Error;
use crate::notifications::{self, AsyncCompletion, BusInitSignal, EventCallback, NotificationContext};
use crate::table::TargetDeviceTable;
use crate::tracker::RequestTracker;
use crate::types::{Endpoint, Handle};

fn read_interrupt(handle: &Handle, interrupt_ep: &Endpoint) -> crate::error::Result<Vec<u8>> {
    let mut buffer = vec![0u8; interrupt_ep.max_packet_size as usize];
    let n = handle
        .borrow()
        .read_interrupt(interrupt_ep.address, &mut buffer, EVENT_LOOP_POLL_TIMEOUT)?;
    buffer.truncate(n);
    Ok(buffer)
}

fn is_timeout(err: &Error) -> bool {
    matches!(err, Error::Transport(rusb::Error::Timeout))
}

pub struct EventLoop {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventLoop {
    /// Spawn the reader thread. `completions_tx` is cloned into every
    /// notification handler that issues an asynchronous follow-up transfer.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        handle: Handle,
        interface_number: u8,
        bulk_in_ep: Endpoint,
        interrupt_ep: Endpoint,
        timeout: crate::types::Timeout,
        tracker: Arc<RequestTracker>,
        table: Arc<TargetDeviceTable>,
        bus_init: Arc<BusInitSignal>,
        controller_event: Arc<EventCallback>,
        bus_error: Arc<EventCallback>,
    ) -> (EventLoop, Sender<AsyncCompletion>) {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let tx_for_thread = tx.clone();

        let thread_shutdown = shutdown.clone();
        let thread = std::thread::Builder::new()
            .name("usbi3c-event-loop".into())
            .spawn(move || {
                run(
                    handle,
                    interface_number,
                    bulk_in_ep,
                    interrupt_ep,
                    timeout,
                    tracker,
                    table,
                    bus_init,
                    controller_event,
                    bus_error,
                    tx_for_thread,
                    rx,
                    thread_shutdown,
                )
            })
            .expect("failed to spawn event loop thread");

        (
            EventLoop {
                shutdown,
                thread: Some(thread),
            },
            tx,
        )
    }

    /// Signal the loop to exit after its current pass and join the thread
    /// (§4.5 shutdown contract).
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    handle: Handle,
    interface_number: u8,
    bulk_in_ep: Endpoint,
    interrupt_ep: Endpoint,
    timeout: crate::types::Timeout,
    tracker: Arc<RequestTracker>,
    table: Arc<TargetDeviceTable>,
    bus_init: Arc<BusInitSignal>,
    controller_event: Arc<EventCallback>,
    bus_error: Arc<EventCallback>,
    completions_tx: Sender<AsyncCompletion>,
    completions_rx: Receiver<AsyncCompletion>,
    shutdown: Arc<AtomicBool>,
) {
    let poll_timeout = crate::types::Timeout::new(EVENT_LOOP_POLL_TIMEOUT);

    while !shutdown.load(Ordering::SeqCst) {
        poll_bulk_in(&handle, &bulk_in_ep, &poll_timeout, &tracker);
        poll_interrupt(
            &handle,
            interface_number,
            &interrupt_ep,
            &timeout,
            &tracker,
            &table,
            &bus_init,
            &controller_event,
            &bus_error,
            &completions_tx,
        );
        drain_completions(&completions_rx, &table);
    }
}

fn poll_bulk_in(handle: &Handle, bulk_in_ep: &Endpoint, poll_timeout: &crate::types::Timeout, tracker: &RequestTracker) {
    match bulk::read_response_transfer(handle, bulk_in_ep, poll_timeout) {
        Ok(buf) if !buf.is_empty() => match bulk::parse_response_transfer(&buf, tracker) {
            Ok(ResponseTransferKind::Regular) => {
                trace!("bulk-in: regular response transfer");
                for (response, cb) in tracker.drain_async_ready() {
                    if let Some(mut cb) = cb {
                        cb(response);
                    }
                }
            }
            Ok(ResponseTransferKind::Interrupt) => trace!("bulk-in: interrupt-kind transfer, no payload contract"),
            Ok(ResponseTransferKind::VendorSpecific(payload)) => {
                if let Some(mut vendor) = tracker.take_vendor() {
                    (vendor.callback)(payload);
                } else {
                    warn!("vendor-specific response with no outstanding vendor request, dropped");
                }
            }
            Err(err) => warn!("failed to parse bulk-in transfer: {err}"),
        },
        Ok(_) => {}
        Err(err) if is_timeout(&err) => {}
        Err(err) => warn!("bulk-in read failed: {err}"),
    }
}

#[allow(clippy::too_many_arguments)]
fn poll_interrupt(
    handle: &Handle,
    interface_number: &u8,
    interrupt_ep: &Endpoint,
    timeout: &crate::types::Timeout,
    tracker: &RequestTracker,
    table: &TargetDeviceTable,
    bus_init: &BusInitSignal,
    controller_event: &EventCallback,
    bus_error: &EventCallback,
    completions_tx: &Sender<AsyncCompletion>,
) {
    match read_interrupt(handle, interrupt_ep) {
        Ok(buf) if !buf.is_empty() => match codec::notification::decode(&buf) {
            Ok(notification) => {
                let ctx = NotificationContext {
                    handle,
                    interface_number: *interface_number,
                    timeout,
                    tracker,
                    table,
                    completions_tx,
                    bus_init,
                    controller_event,
                    bus_error,
                };
                notifications::dispatch(notification, &ctx);
            }
            Err(err) => warn!("failed to decode notification: {err}"),
        },
        Ok(_) => {}
        Err(err) if is_timeout(&err) => {}
        Err(err) => warn!("interrupt read failed: {err}"),
    }
}

fn drain_completions(rx: &Receiver<AsyncCompletion>, table: &TargetDeviceTable) {
    while let Ok(completion) = rx.try_recv() {
        match completion {
            AsyncCompletion::AddressChangeResult(Ok(entries)) => {
                notifications::resolve_address_change_results(entries, table)
            }
            AsyncCompletion::AddressChangeResult(Err(err)) => {
                warn!("GET_ADDRESS_CHANGE_RESULT failed: {err}");
            }
            AsyncCompletion::BulkRequestAck(Ok(())) => trace!("CANCEL_OR_RESUME_BULK_REQUEST acknowledged"),
            AsyncCompletion::BulkRequestAck(Err(err)) => {
                warn!("CANCEL_OR_RESUME_BULK_REQUEST failed: {err}");
            }
        }
    }
}
