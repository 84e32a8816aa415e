//! # USBI3C
//!
//! Host-side driver for the USB I3C device class: drives an I3C bus through a
//! USB-attached bridge ("the I3C Function"), mapping class-specific control
//! requests, bulk request/response transfers and interrupt notifications onto
//! a programmer-facing model of commands, responses and target devices.
//!
//! ## Usage
//!
//! To use, add the following line to your project's Cargo.toml dependencies:
//! ```toml
//! usbi3c = "0.1"
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use usbi3c::{Command, DeviceContext};
//!
//! const DEVICE_VID: u16 = 0x0000;
//! const DEVICE_PID: u16 = 0x0000;
//!
//! fn main() {
//!     let device = DeviceContext::connect((DEVICE_VID, DEVICE_PID)).expect("failed to connect");
//!
//!     device.enqueue(Command::write(0x08, b"hello")).expect("failed to enqueue");
//!     let responses = device
//!         .send_commands(false, std::time::Duration::from_secs(1))
//!         .expect("send failed");
//!     println!("{responses:?}");
//! }
//! ```
//!

mod codec;
mod command;
mod constants;
mod device_info;
mod error;
mod event_loop;
mod init;
mod notifications;
mod pipeline;
mod response;
mod table;
mod target;
mod tracker;
mod types;
mod communication {
    pub mod bulk;
    pub mod control;
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;
use rusb::{Context, DeviceDescriptor};

pub use command::{Command, CommandKind, Direction, ErrorHandling, ResponseCallback, TransferMode, TransferRate};
pub use device_info::{CapabilityFlags, DataType, DeviceInfo, DeviceRole, RuntimeState};
pub use error::{Error, Result};
pub use response::{ErrorStatus, Response};
pub use table::AddressChangeOutcome;
pub use target::{TargetDevice, TargetDeviceConfig, TargetDeviceType};
pub use types::{DeviceAddr, DeviceId, DeviceMode, UsbDeviceInfo};

use communication::control;
use constants::{bus_init_mode, feature_selector, misc::DEFAULT_TIMEOUT_DURATION};
use event_loop::EventLoop;
use notifications::{BusInitSignal, EventCallback};
use pipeline::CommandQueue;
use table::TargetDeviceTable;
use tracker::RequestTracker;
use types::{Handle, Timeout, UsbI3cEndpoints};

/// Device filter, used to pick which attached I3C Function `DeviceContext::connect` opens.
pub trait DeviceFilter {
    fn apply_filter<T: rusb::UsbContext>(
        &self,
        device: &rusb::Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool;
}

/// A target the caller already knows about when issuing `INITIALIZE_I3C_BUS`
/// (§4.7 mode selection rule): either it already has a static address, or
/// only its PID is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownTarget {
    Static(u8),
    PidOnly,
}

fn select_bus_init_mode(data_type: DataType, known_targets: &[KnownTarget]) -> u8 {
    if data_type == DataType::StaticData {
        return bus_init_mode::CONTROLLER_DECIDED;
    }
    if known_targets.is_empty() {
        return bus_init_mode::ENTER_DYNAMIC_ADDRESS_ASSIGNMENT;
    }
    let all_static = known_targets.iter().all(|t| matches!(t, KnownTarget::Static(_)));
    if all_static {
        return bus_init_mode::SET_STATIC_AS_DYNAMIC;
    }
    let all_pid_only = known_targets.iter().all(|t| matches!(t, KnownTarget::PidOnly));
    if all_pid_only {
        return bus_init_mode::ENTER_DYNAMIC_ADDRESS_ASSIGNMENT;
    }
    bus_init_mode::CONTROLLER_DECIDED
}

fn feature_enabled(info: &DeviceInfo, selector: u16) -> bool {
    match selector {
        s if s == feature_selector::I3C_CONTROLLER_ROLE_HANDOFF => info.state.handoff_enabled,
        s if s == feature_selector::HOT_JOIN => info.state.hot_join_enabled,
        s if s == feature_selector::REGULAR_IBI => info.state.ibi_enabled,
        _ => false,
    }
}

fn set_feature_enabled(info: &mut DeviceInfo, selector: u16, enabled: bool) {
    match selector {
        s if s == feature_selector::I3C_CONTROLLER_ROLE_HANDOFF => info.state.handoff_enabled = enabled,
        s if s == feature_selector::HOT_JOIN => info.state.hot_join_enabled = enabled,
        s if s == feature_selector::REGULAR_IBI => info.state.ibi_enabled = enabled,
        _ => {}
    }
}

#[cfg(test)]
mod bus_init_mode_tests {
    use super::*;

    #[test]
    fn static_data_type_always_uses_controller_decided() {
        assert_eq!(
            select_bus_init_mode(DataType::StaticData, &[]),
            bus_init_mode::CONTROLLER_DECIDED
        );
        assert_eq!(
            select_bus_init_mode(DataType::StaticData, &[KnownTarget::PidOnly]),
            bus_init_mode::CONTROLLER_DECIDED
        );
    }

    #[test]
    fn no_static_data_and_empty_table_uses_entdaa() {
        assert_eq!(
            select_bus_init_mode(DataType::NoStaticData, &[]),
            bus_init_mode::ENTER_DYNAMIC_ADDRESS_ASSIGNMENT
        );
    }

    #[test]
    fn only_static_targets_uses_set_static_as_dynamic() {
        let targets = [KnownTarget::Static(0x08), KnownTarget::Static(0x09)];
        assert_eq!(
            select_bus_init_mode(DataType::NoStaticData, &targets),
            bus_init_mode::SET_STATIC_AS_DYNAMIC
        );
    }

    #[test]
    fn only_pid_targets_uses_entdaa() {
        let targets = [KnownTarget::PidOnly, KnownTarget::PidOnly];
        assert_eq!(
            select_bus_init_mode(DataType::NoStaticData, &targets),
            bus_init_mode::ENTER_DYNAMIC_ADDRESS_ASSIGNMENT
        );
    }

    #[test]
    fn mixed_targets_uses_controller_decided() {
        let targets = [KnownTarget::Static(0x08), KnownTarget::PidOnly];
        assert_eq!(
            select_bus_init_mode(DataType::NoStaticData, &targets),
            bus_init_mode::CONTROLLER_DECIDED
        );
    }
}

/// ### DeviceContext
///
/// A live connection to an I3C Function: owns the USB handle, the command
/// pipeline, the request tracker, the target device table, and the
/// background event-loop thread that drives all three.
///
pub struct DeviceContext {
    handle: Handle,
    mode: DeviceMode,
    timeout: Timeout,
    interface_number: u8,
    endpoints: UsbI3cEndpoints,
    queue: CommandQueue,
    tracker: Arc<RequestTracker>,
    table: Arc<TargetDeviceTable>,
    device_info: Mutex<Option<DeviceInfo>>,
    bus_init: Arc<BusInitSignal>,
    controller_event: Arc<EventCallback>,
    bus_error: Arc<EventCallback>,
    event_loop: EventLoop,
}

impl DeviceContext {
    /// ### Devices
    ///
    /// List the I3C Functions currently attached.
    ///
    pub fn devices() -> Result<Vec<UsbDeviceInfo>> {
        let mut context = Context::new()?;
        init::list_devices(&mut context)
    }

    /// ### Connect
    ///
    /// Open an I3C Function and bring it to the `capabilities_known` state
    /// (§4.8): claims the interface, spawns the event loop, and fetches
    /// `GET_I3C_CAPABILITY` once.
    ///
    /// Use `filter` to select the device:
    /// - `()` - first found I3C Function
    /// - `(idVendor, idProduct)` or `DeviceId` - device by USB identifiers
    /// - `(bus, device)` or `DeviceAddr` - device by USB bus and device number
    /// - `UsbDeviceInfo` - device by both USB identifiers and address
    ///
    pub fn connect(filter: impl DeviceFilter) -> Result<DeviceContext> {
        let mut context = Context::new()?;
        let (device, mut handle) = init::open_device(&mut context, filter)?;

        let mut mode = init::get_i3c_mode(&device)?;
        init::detach_kernel_driver(&mut mode, &mut handle)?;
        let endpoints = init::get_endpoints(&mode, &device)?;

        handle.set_active_configuration(mode.config_number)?;
        handle.claim_interface(mode.interface_number)?;
        handle.set_alternate_setting(mode.interface_number, mode.setting_number)?;

        let handle = Handle::new(handle);
        let timeout = Timeout::new(DEFAULT_TIMEOUT_DURATION);
        let interface_number = mode.interface_number;

        let tracker = Arc::new(RequestTracker::new());
        let table = Arc::new(TargetDeviceTable::new());
        let bus_init = Arc::new(BusInitSignal::new());
        let controller_event = Arc::new(EventCallback::new());
        let bus_error = Arc::new(EventCallback::new());

        let (event_loop, _completions_tx) = EventLoop::spawn(
            handle.clone(),
            interface_number,
            endpoints.bulk_in_ep.clone(),
            endpoints.interrupt_ep.clone(),
            timeout.clone(),
            tracker.clone(),
            table.clone(),
            bus_init.clone(),
            controller_event.clone(),
            bus_error.clone(),
        );

        let capability = control::get_i3c_capability(&handle, interface_number, &timeout)?;
        let device_info = DeviceInfo::new(
            capability.device_role,
            capability.data_type,
            capability.capability,
            capability.max_ibi_payload_size,
        );
        debug!("connected: role={:?} data_type={:?}", device_info.role, device_info.data_type);

        Ok(DeviceContext {
            handle,
            mode,
            timeout,
            interface_number,
            endpoints,
            queue: CommandQueue::new(),
            tracker,
            table,
            device_info: Mutex::new(Some(device_info)),
            bus_init,
            controller_event,
            bus_error,
            event_loop,
        })
    }

    /// ### Set Timeout
    ///
    /// Set a new timeout for control and bulk transfers issued on this connection.
    ///
    pub fn set_timeout(&self, duration: Duration) {
        self.timeout.set(duration);
    }

    /// Snapshot of the device's capabilities and runtime state, as of the
    /// last successful `GET_I3C_CAPABILITY`/`SET_FEATURE`/`CLEAR_FEATURE` (§3).
    pub fn device_info(&self) -> Option<DeviceInfo> {
        *self.device_info.lock().unwrap()
    }

    /// ### Enqueue
    ///
    /// Validate and append a command to this device's queue (§4.4 step 1).
    ///
    pub fn enqueue(&self, command: Command) -> Result<()> {
        self.queue.enqueue(command)
    }

    /// ### Send Commands
    ///
    /// Drain the queue, submit a bulk request transfer, and block up to
    /// `wait_timeout` for every response (§4.4 step 2).
    ///
    pub fn send_commands(&self, dependent_on_previous: bool, wait_timeout: Duration) -> Result<Vec<Response>> {
        pipeline::send_commands(
            &self.queue,
            &self.tracker,
            &self.handle,
            self.interface_number,
            &self.endpoints.bulk_out_ep,
            dependent_on_previous,
            &self.timeout,
            wait_timeout,
        )
    }

    /// ### Submit Commands
    ///
    /// Drain the queue and submit a bulk request transfer without blocking;
    /// per-command callbacks fire from the event loop (§4.4 step 3).
    ///
    pub fn submit_commands(&self, dependent_on_previous: bool) -> Result<()> {
        pipeline::submit_commands(
            &self.queue,
            &self.tracker,
            &self.handle,
            self.interface_number,
            &self.endpoints.bulk_out_ep,
            dependent_on_previous,
            &self.timeout,
        )
    }

    /// ### Submit Vendor-Specific Request
    ///
    /// Submit a raw bulk-out payload outside the command pipeline's framing,
    /// registering `callback` against the single vendor-response slot (§4.2,
    /// §D): the event loop hands the next vendor-specific bulk-in payload to
    /// it.
    ///
    pub fn submit_vendor_specific_request(
        &self,
        payload: &[u8],
        callback: impl FnMut(Vec<u8>) + Send + 'static,
    ) -> Result<()> {
        self.tracker.set_vendor(Box::new(callback));
        communication::bulk::submit_buffer(&self.handle, &self.endpoints.bulk_out_ep, payload, &self.timeout)
    }

    /// ### Change I3C Device Address
    ///
    /// Issue `CHANGE_DYNAMIC_ADDRESS(current, new)` and register `callback`
    /// against the address-change tracker (§3, §4.3, §4.6); it fires once
    /// the matching `GET_ADDRESS_CHANGE_RESULT` completion resolves.
    ///
    pub fn change_i3c_device_address(
        &self,
        current_address: u8,
        new_address: u8,
        callback: impl FnOnce(AddressChangeOutcome) + Send + 'static,
    ) -> Result<()> {
        use codec::address_change::AddressChangeRequest;

        control::change_dynamic_address(
            &self.handle,
            self.interface_number,
            &[AddressChangeRequest {
                current_address,
                new_address,
            }],
            &self.timeout,
        )?;
        self.table
            .add_pending_address_change(current_address, new_address, Box::new(callback));
        Ok(())
    }

    fn validate_feature_change(&self, selector: u16) -> Result<()> {
        let info = self.device_info.lock().unwrap();
        let info = info.as_ref().ok_or(Error::UnsupportedFeature)?;

        if selector == feature_selector::I3C_CONTROLLER_ROLE_HANDOFF && !info.state.active_controller {
            return Err(Error::UnsupportedFeature);
        }

        let capability_ok = match selector {
            s if s == feature_selector::I3C_CONTROLLER_ROLE_HANDOFF => info.capability.handoff_controller_role,
            s if s == feature_selector::HOT_JOIN || s == feature_selector::HOT_JOIN_WAKE => info.capability.hot_join,
            s if s == feature_selector::REGULAR_IBI || s == feature_selector::REGULAR_IBI_WAKE => {
                info.capability.in_band_interrupt
            }
            _ => true,
        };
        if !capability_ok {
            return Err(Error::UnsupportedFeature);
        }
        Ok(())
    }

    /// ### Enable Feature
    ///
    /// `SET_FEATURE(selector)`, gated by the §4.7 validation policy. Already
    /// enabled succeeds without issuing a transfer (§8 invariant 6).
    ///
    pub fn enable_feature(&self, selector: u16) -> Result<()> {
        self.validate_feature_change(selector)?;
        let mut info = self.device_info.lock().unwrap();
        let state = info.as_mut().ok_or(Error::UnsupportedFeature)?;
        if feature_enabled(state, selector) {
            return Ok(());
        }
        control::set_feature(&self.handle, self.interface_number, selector, &self.timeout)?;
        set_feature_enabled(state, selector, true);
        Ok(())
    }

    /// ### Disable Feature
    ///
    /// `CLEAR_FEATURE(selector)`, gated by the same validation policy (§4.7).
    /// Already-disabled succeeds without issuing a transfer, symmetric with `enable_feature`.
    ///
    pub fn disable_feature(&self, selector: u16) -> Result<()> {
        self.validate_feature_change(selector)?;
        let mut info = self.device_info.lock().unwrap();
        let state = info.as_mut().ok_or(Error::UnsupportedFeature)?;
        if !feature_enabled(state, selector) {
            return Ok(());
        }
        control::clear_feature(&self.handle, self.interface_number, selector, &self.timeout)?;
        set_feature_enabled(state, selector, false);
        Ok(())
    }

    pub fn get_request_reattempt_max(&self) -> u8 {
        self.tracker.reattempt_max()
    }

    pub fn set_request_reattempt_max(&self, value: u8) {
        self.tracker.set_reattempt_max(value);
    }

    /// Addresses currently present in the target device table (§4.3, §D).
    pub fn addresses(&self) -> Vec<u8> {
        self.table.addresses()
    }

    /// All target devices currently in the table (§4.3, §D).
    pub fn target_devices(&self) -> Vec<TargetDevice> {
        self.table.list()
    }

    /// A single target device's table entry, if present (§4.3, §D).
    pub fn target_info(&self, address: u8) -> Option<TargetDevice> {
        self.table.get(address)
    }

    /// Max IBI payload size configured for a target (§D).
    pub fn target_max_ibi_payload_size(&self, address: u8) -> Result<u32> {
        self.table
            .get(address)
            .map(|d| d.config.max_ibi_payload_size)
            .ok_or(Error::NotFound)
    }

    /// Push a new max IBI payload size down to a single target via
    /// `SET_TARGET_DEVICE_CONFIG`, then mirror it into the local table (§D).
    pub fn set_target_max_ibi_payload_size(&self, address: u8, max_ibi_payload_size: u32) -> Result<()> {
        use codec::target_config::TargetConfigEntry;

        let mut device = self.table.get(address).ok_or(Error::NotFound)?;
        device.config.max_ibi_payload_size = max_ibi_payload_size;
        control::set_target_device_config(
            &self.handle,
            self.interface_number,
            &[TargetConfigEntry {
                target_address: address,
                config: device.config,
            }],
            &self.timeout,
        )?;
        self.table.insert(device);
        Ok(())
    }

    /// Register the single controller-event notification callback (§4.6).
    pub fn on_controller_event(&self, callback: impl FnMut(u8) + Send + 'static) {
        self.controller_event.set(Box::new(callback));
    }

    /// Register the single bus-error notification callback (§4.6).
    pub fn on_bus_error(&self, callback: impl FnMut(u8) + Send + 'static) {
        self.bus_error.set(Box::new(callback));
    }

    /// ### Initialize Bus
    ///
    /// Select a mode per §4.7's rule, issue `INITIALIZE_I3C_BUS`, then block
    /// for the matching bus-initialization-status notification before
    /// completing the `capabilities_known → bus_initialized` transition (§4.8).
    /// On success, refreshes the target device table to reach `operational`.
    ///
    pub fn initialize_bus(&self, known_targets: &[KnownTarget]) -> Result<()> {
        let data_type = {
            let info = self.device_info.lock().unwrap();
            info.as_ref().ok_or(Error::UnsupportedFeature)?.data_type
        };
        let mode = select_bus_init_mode(data_type, known_targets);

        self.bus_init.reset();
        control::initialize_i3c_bus(&self.handle, self.interface_number, mode, &self.timeout)?;

        match self.bus_init.wait(self.timeout.get()) {
            Some(true) => {}
            Some(false) => return Err(Error::Protocol("bus initialization reported failure".into())),
            None => return Err(Error::Protocol("timed out waiting for bus initialization status".into())),
        }

        self.refresh_target_devices()
    }

    /// ### Refresh Target Devices
    ///
    /// Re-fetch the target device table via `GET_TARGET_DEVICE_TABLE` and
    /// replace the local mirror atomically (§4.3).
    ///
    pub fn refresh_target_devices(&self) -> Result<()> {
        let devices = control::get_target_device_table(&self.handle, self.interface_number, &self.timeout)?;
        self.table.replace_all(devices);
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        self.event_loop.shutdown();
        self.tracker.reset_pending_responses();

        if self.handle.borrow().release_interface(self.mode.interface_number).is_err() {
            debug!("failed to release interface {} on drop", self.mode.interface_number);
        }
        if self.mode.has_kernel_driver {
            if self.handle.borrow().attach_kernel_driver(self.mode.interface_number).is_err() {
                debug!("failed to reattach kernel driver on drop");
            }
        }
    }
}
