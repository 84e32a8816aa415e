//! ## Types
//!
//! Small shared types used across the crate.
//!

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusb::{Context, DeviceHandle, Direction, TransferType};

/// ### Handle
///
/// Shared libusb device handle. The event-loop thread, the helper threads
/// backing asynchronous control transfers, and the caller's own thread
/// performing a synchronous send all need access to the same handle, so it
/// is wrapped in an `Arc<Mutex<..>>`.
#[derive(Debug, Clone)]
pub struct Handle(Arc<Mutex<DeviceHandle<Context>>>);

impl Handle {
    pub fn new(handle: DeviceHandle<Context>) -> Handle {
        Handle(Arc::new(Mutex::new(handle)))
    }

    pub fn borrow(&self) -> MutexGuard<'_, DeviceHandle<Context>> {
        self.0.lock().unwrap()
    }
}

/// ### Timeout
///
/// Shared, mutable transfer timeout.
#[derive(Debug, Clone)]
pub struct Timeout(Arc<Mutex<Duration>>);

impl Timeout {
    pub fn new(duration: Duration) -> Timeout {
        Timeout(Arc::new(Mutex::new(duration)))
    }

    pub fn get(&self) -> Duration {
        *self.0.lock().unwrap()
    }

    pub fn set(&self, duration: Duration) {
        *self.0.lock().unwrap() = duration;
    }
}

/// USB device address
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceAddr {
    /// USB bus number
    pub bus: u8,
    /// USB device number
    pub device: u8,
}

/// USB device identifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceId {
    /// USB Id Vendor
    pub vendor_id: u16,
    /// USB Id Product
    pub product_id: u16,
}

/// A discovered I3C Function, as returned by `DeviceContext::devices`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub id: DeviceId,
    pub address: DeviceAddr,
}

/// ### Device Mode
///
/// The configuration, interface and setting an I3C Function interface was
/// found at, plus whether a kernel driver had to be detached to claim it.
///
#[derive(Debug, Clone, Default)]
pub struct DeviceMode {
    /// The USB configuration number
    pub config_number: u8,
    /// The interface number specific to the configuration
    pub interface_number: u8,
    /// The setting number specific to the interface
    pub setting_number: u8,
    /// If the device has a kernel driver. Important for returning control to the OS (on Linux).
    pub has_kernel_driver: bool,
}

/// ### Endpoint
///
/// Properties of an endpoint.
///
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// Address of the endpoint on the interface
    pub address: u8,
    /// The maximal size a packet can have on this endpoint
    pub max_packet_size: u16,
    /// The transfer type of the endpoint (Bulk or Interrupt, for I3C)
    pub transfer_type: TransferType,
    /// The direction of the endpoint (In or Out)
    pub direction: Direction,
}

/// ### I3C Function Endpoints
///
/// Endpoints specific to the USB I3C device class (§6): the mandatory bulk
/// out/in endpoints, and the interrupt in endpoint used for notifications.
///
#[derive(Clone, Debug)]
pub struct UsbI3cEndpoints {
    pub bulk_out_ep: Endpoint,
    pub bulk_in_ep: Endpoint,
    pub interrupt_ep: Endpoint,
}
