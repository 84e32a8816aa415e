//! ## Target device table
//!
//! A lock-protected mirror of the I3C Function's view of the bus, plus the
//! address-change tracker it owns (§4.3).
//!

use std::collections::HashMap;
use std::sync::Mutex;

use crate::target::TargetDevice;

/// Outcome of a `CHANGE_DYNAMIC_ADDRESS` request, delivered to the caller's
/// address-change callback (§3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressChangeOutcome {
    Succeeded,
    Failed,
}

type AddressChangeCallback = Box<dyn FnOnce(AddressChangeOutcome) + Send>;

/// A pending `(old, new)` address change, searched on `GET_ADDRESS_CHANGE_RESULT` completion (§3).
struct AddressChangeEntry {
    old_address: u8,
    new_address: u8,
    callback: AddressChangeCallback,
}

struct Inner {
    devices: HashMap<u8, TargetDevice>,
    address_changes: Vec<AddressChangeEntry>,
}

pub struct TargetDeviceTable {
    inner: Mutex<Inner>,
}

impl TargetDeviceTable {
    pub fn new() -> TargetDeviceTable {
        TargetDeviceTable {
            inner: Mutex::new(Inner {
                devices: HashMap::new(),
                address_changes: Vec::new(),
            }),
        }
    }

    pub fn get(&self, address: u8) -> Option<TargetDevice> {
        self.inner.lock().unwrap().devices.get(&address).copied()
    }

    pub fn list(&self) -> Vec<TargetDevice> {
        self.inner.lock().unwrap().devices.values().copied().collect()
    }

    pub fn addresses(&self) -> Vec<u8> {
        self.inner.lock().unwrap().devices.keys().copied().collect()
    }

    pub(crate) fn insert(&self, device: TargetDevice) {
        let mut inner = self.inner.lock().unwrap();
        inner.devices.insert(device.current_dynamic_address, device);
    }

    pub(crate) fn remove(&self, address: u8) -> Option<TargetDevice> {
        self.inner.lock().unwrap().devices.remove(&address)
    }

    /// Replace the whole table atomically (§4.3 refresh contract: a failed
    /// refresh transfer leaves the table untouched; callers only call this
    /// once the transfer succeeded and was parsed).
    pub(crate) fn replace_all(&self, devices: Vec<TargetDevice>) {
        let mut inner = self.inner.lock().unwrap();
        inner.devices.clear();
        for device in devices {
            inner.devices.insert(device.current_dynamic_address, device);
        }
    }

    /// Move a device from `old` to `new` in one critical section (§4.3, §4.6).
    pub(crate) fn change_address(&self, old: u8, new: u8) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(mut device) = inner.devices.remove(&old) else {
            return false;
        };
        device.current_dynamic_address = new;
        inner.devices.insert(new, device);
        true
    }

    pub(crate) fn add_pending_address_change(&self, old_address: u8, new_address: u8, callback: AddressChangeCallback) {
        let mut inner = self.inner.lock().unwrap();
        inner.address_changes.push(AddressChangeEntry { old_address, new_address, callback });
    }

    /// Find and remove the matching pending entry (§3: unmatched result
    /// entries are ignored). Invokes the callback after releasing the lock.
    pub(crate) fn resolve_address_change(&self, old_address: u8, new_address: u8, outcome: AddressChangeOutcome) {
        let entry = {
            let mut inner = self.inner.lock().unwrap();
            let pos = inner
                .address_changes
                .iter()
                .position(|e| e.old_address == old_address && e.new_address == new_address);
            pos.map(|pos| inner.address_changes.remove(pos))
        };
        if let Some(entry) = entry {
            (entry.callback)(outcome);
        }
    }
}

impl Default for TargetDeviceTable {
    fn default() -> Self {
        TargetDeviceTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{TargetDeviceConfig, TargetDeviceType};
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Arc;

    fn device(address: u8) -> TargetDevice {
        TargetDevice {
            current_dynamic_address: address,
            static_address: None,
            bcr: address,
            dcr: address,
            pid_hi: 0,
            pid_lo: 0,
            device_type: TargetDeviceType::I3c,
            device_capability: 0,
            config: TargetDeviceConfig::default(),
        }
    }

    /// S1: enumeration with 3 targets at a contiguous address pool.
    #[test]
    fn replace_all_populates_three_devices() {
        let table = TargetDeviceTable::new();
        let pool = 0x08;
        table.replace_all(vec![device(pool), device(pool + 1), device(pool + 2)]);

        let mut addresses = table.addresses();
        addresses.sort();
        assert_eq!(addresses, vec![pool, pool + 1, pool + 2]);
        for i in 0..3 {
            let d = table.get(pool + i).unwrap();
            assert_eq!(d.bcr, pool + i);
            assert_eq!(d.dcr, pool + i);
        }
    }

    /// S5: address change success moves the device and fires the callback once.
    #[test]
    fn address_change_success_moves_device_and_fires_callback_once() {
        let table = TargetDeviceTable::new();
        table.insert(device(0x08));

        let fired = Arc::new(AtomicU8::new(0));
        let fired_clone = fired.clone();
        table.add_pending_address_change(
            0x08,
            0x09,
            Box::new(move |outcome| {
                assert_eq!(outcome, AddressChangeOutcome::Succeeded);
                fired_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(table.change_address(0x08, 0x09));
        table.resolve_address_change(0x08, 0x09, AddressChangeOutcome::Succeeded);

        assert!(table.get(0x08).is_none());
        assert!(table.get(0x09).is_some());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Resolving again (e.g. a duplicate completion) is a no-op: the
        // tracker entry was already consumed.
        table.resolve_address_change(0x08, 0x09, AddressChangeOutcome::Succeeded);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn address_change_failure_leaves_table_unchanged() {
        let table = TargetDeviceTable::new();
        table.insert(device(0x08));

        let fired = Arc::new(AtomicU8::new(0));
        let fired_clone = fired.clone();
        table.add_pending_address_change(
            0x08,
            0x09,
            Box::new(move |outcome| {
                assert_eq!(outcome, AddressChangeOutcome::Failed);
                fired_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        table.resolve_address_change(0x08, 0x09, AddressChangeOutcome::Failed);

        assert!(table.get(0x08).is_some());
        assert!(table.get(0x09).is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unmatched_result_entry_is_ignored() {
        let table = TargetDeviceTable::new();
        // No pending entry registered for (0x08, 0x09); should not panic.
        table.resolve_address_change(0x08, 0x09, AddressChangeOutcome::Succeeded);
    }
}
