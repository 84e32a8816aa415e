//! ## Command pipeline
//!
//! The three entry points applications drive: `enqueue`, `send_commands`,
//! `submit_commands` (§4.4). Encoding, the flow-control handshake, and
//! tracker bookkeeping live here; transport submission is delegated to
//! `communication::bulk`.
//!

use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::codec;
use crate::command::{Command, QueuedCommand};
use crate::communication::{bulk, control};
use crate::error::{Error, Result};
use crate::response::Response;
use crate::tracker::{Delivery, RequestRecord, RequestTracker};
use crate::types::{Endpoint, Handle, Timeout};

/// The per-device queue of not-yet-submitted commands, plus the
/// monotonically increasing request-ID counter (§3, §9: "device-scoped
/// monotonically increasing counter owned by the pipeline, not process-global").
pub(crate) struct CommandQueue {
    commands: Mutex<Vec<QueuedCommand>>,
    next_request_id: Mutex<u16>,
}

impl CommandQueue {
    pub fn new() -> CommandQueue {
        CommandQueue {
            commands: Mutex::new(Vec::new()),
            next_request_id: Mutex::new(0),
        }
    }

    /// Validate and append a command to the queue (§4.4 step 1).
    pub fn enqueue(&self, command: Command) -> Result<()> {
        command.validate()?;
        self.commands.lock().unwrap().push(command.into());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.commands.lock().unwrap().len()
    }

    fn drain(&self) -> Vec<QueuedCommand> {
        std::mem::take(&mut *self.commands.lock().unwrap())
    }

    fn next_ids(&self, count: u16) -> Vec<u16> {
        let mut next = self.next_request_id.lock().unwrap();
        (0..count)
            .map(|_| {
                let id = *next;
                *next = next.wrapping_add(1);
                id
            })
            .collect()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        CommandQueue::new()
    }
}

/// Shared pre-work for `send_commands`/`submit_commands` (§4.4 step 2/3):
/// drain the queue, run the flow-control handshake, insert tracker records,
/// submit, and roll back on submission failure. Returns the assigned IDs in
/// queue order.
fn commit_transfer(
    queue: &CommandQueue,
    tracker: &RequestTracker,
    handle: &Handle,
    interface_number: u8,
    bulk_out_ep: &Endpoint,
    dependent_on_previous: bool,
    timeout: &Timeout,
    delivery: Delivery,
) -> Result<Vec<u16>> {
    let mut commands = queue.drain();
    if commands.is_empty() {
        return Err(Error::EmptyQueue);
    }

    let ids = queue.next_ids(commands.len() as u16);
    let pairs: Vec<(u16, &QueuedCommand)> = ids.iter().copied().zip(commands.iter()).collect();
    let encoded_size = codec::request::encoded_transfer_size(&commands) as u32;
    let buffer = codec::request::encode_transfer(dependent_on_previous, &pairs);

    let available = control::get_buffer_available(handle, interface_number, timeout)?;
    if available < encoded_size {
        return Err(Error::InsufficientBuffer {
            needed: encoded_size,
            available,
        });
    }

    let total_commands = commands.len() as u16;
    for (i, (id, command)) in ids.iter().zip(commands.iter_mut()).enumerate() {
        tracker.append(RequestRecord {
            request_id: *id,
            total_commands,
            dependent_on_previous: if i == 0 { dependent_on_previous } else { true },
            reattempt_count: 0,
            response: None,
            on_response_cb: command.on_response_cb.take(),
            delivery,
        });
    }

    if let Err(err) = bulk::submit_buffer(handle, bulk_out_ep, &buffer, timeout) {
        for id in &ids {
            tracker.remove(*id);
        }
        return Err(err);
    }

    debug!("committed {total_commands} command(s), request ids {ids:?}");
    Ok(ids)
}

/// Synchronous send (§4.4 step 2). Blocks up to `timeout` for the event loop
/// to populate responses for the assigned IDs.
pub(crate) fn send_commands(
    queue: &CommandQueue,
    tracker: &RequestTracker,
    handle: &Handle,
    interface_number: u8,
    bulk_out_ep: &Endpoint,
    dependent_on_previous: bool,
    timeout: &Timeout,
    wait_timeout: Duration,
) -> Result<Vec<Response>> {
    let ids = commit_transfer(
        queue,
        tracker,
        handle,
        interface_number,
        bulk_out_ep,
        dependent_on_previous,
        timeout,
        Delivery::Sync,
    )?;

    let deadline = Instant::now() + wait_timeout;
    if tracker.wait_until_ready(&ids, deadline) {
        let responses = ids
            .iter()
            .filter_map(|id| match tracker.take_response(*id) {
                crate::tracker::TakeResponse::Response(r) => Some(r),
                _ => None,
            })
            .collect();
        Ok(responses)
    } else {
        let responses = ids
            .iter()
            .filter_map(|id| tracker.peek_response(*id))
            .collect::<Vec<_>>();
        warn!(
            "send_commands timed out with {}/{} responses collected",
            responses.len(),
            ids.len()
        );
        Err(Error::Timeout {
            responses,
            total: ids.len(),
        })
    }
}

/// Asynchronous submit (§4.4 step 3). Does not block; per-command callbacks
/// fire from the event loop.
pub(crate) fn submit_commands(
    queue: &CommandQueue,
    tracker: &RequestTracker,
    handle: &Handle,
    interface_number: u8,
    bulk_out_ep: &Endpoint,
    dependent_on_previous: bool,
    timeout: &Timeout,
) -> Result<()> {
    commit_transfer(
        queue,
        tracker,
        handle,
        interface_number,
        bulk_out_ep,
        dependent_on_previous,
        timeout,
        Delivery::Async,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;

    #[test]
    fn enqueue_rejects_malformed_write() {
        let queue = CommandQueue::new();
        let mut command = Command::write(1, &[1, 2, 3]);
        command.data_length = 4;
        assert!(queue.enqueue(command).is_err());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn enqueue_accepts_well_formed_commands() {
        let queue = CommandQueue::new();
        queue.enqueue(Command::write(1, &[1, 2, 3])).unwrap();
        queue.enqueue(Command::read(2, 16)).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn drain_empties_the_queue_and_assigns_contiguous_ids() {
        let queue = CommandQueue::new();
        queue.enqueue(Command::write(1, &[1])).unwrap();
        queue.enqueue(Command::write(1, &[2])).unwrap();
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(queue.len(), 0);
        let ids = queue.next_ids(3);
        assert_eq!(ids, vec![0, 1, 2]);
        let ids = queue.next_ids(2);
        assert_eq!(ids, vec![3, 4]);
    }
}
