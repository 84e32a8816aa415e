//! ## Initialization
//!
//! A set of functions to help discover and claim a connection to the I3C Function.
//!

use crate::{
    constants::usb::*,
    error::Error,
    types::{DeviceAddr, DeviceId, DeviceMode, Endpoint, UsbDeviceInfo, UsbI3cEndpoints},
    DeviceFilter,
};

use crate::error::Result;
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Direction, TransferType, UsbContext};

/// Get first found I3C Function
impl DeviceFilter for () {
    fn apply_filter<T: UsbContext>(
        &self,
        _device: &Device<T>,
        _device_desc: &DeviceDescriptor,
    ) -> bool {
        true
    }
}

/// Get I3C Function by USB device address
impl DeviceFilter for DeviceAddr {
    fn apply_filter<T: UsbContext>(
        &self,
        device: &Device<T>,
        _device_desc: &DeviceDescriptor,
    ) -> bool {
        self.bus == device.bus_number() && self.device == device.address()
    }
}

/// Get I3C Function by USB device address (bus, address)
impl DeviceFilter for (u8, u8) {
    fn apply_filter<T: UsbContext>(
        &self,
        device: &Device<T>,
        _device_desc: &DeviceDescriptor,
    ) -> bool {
        self.0 == device.bus_number() && self.1 == device.address()
    }
}

/// Get I3C Function by USB device address [bus, address]
impl DeviceFilter for [u8; 2] {
    fn apply_filter<T: UsbContext>(
        &self,
        device: &Device<T>,
        _device_desc: &DeviceDescriptor,
    ) -> bool {
        self[0] == device.bus_number() && self[1] == device.address()
    }
}

/// Get I3C Function by USB identifiers
impl DeviceFilter for DeviceId {
    fn apply_filter<T: UsbContext>(
        &self,
        _device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        self.vendor_id == device_desc.vendor_id() && self.product_id == device_desc.product_id()
    }
}

/// Get I3C Function by USB identifiers (idVendor, idProduct)
impl DeviceFilter for (u16, u16) {
    fn apply_filter<T: UsbContext>(
        &self,
        _device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        self.0 == device_desc.vendor_id() && self.1 == device_desc.product_id()
    }
}

/// Get I3C Function by USB identifiers [idVendor, idProduct]
impl DeviceFilter for [u16; 2] {
    fn apply_filter<T: UsbContext>(
        &self,
        _device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        self[0] == device_desc.vendor_id() && self[1] == device_desc.product_id()
    }
}

/// Get I3C Function by info (both USB identifiers and address)
impl DeviceFilter for UsbDeviceInfo {
    fn apply_filter<T: UsbContext>(
        &self,
        device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        self.id.apply_filter(device, device_desc) && self.address.apply_filter(device, device_desc)
    }
}

/// Allow apply filter by reference
impl<T: DeviceFilter> DeviceFilter for &T {
    fn apply_filter<X: UsbContext>(
        &self,
        device: &Device<X>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        (**self).apply_filter(device, device_desc)
    }
}

/// Allow apply filter by Rc
impl<T: DeviceFilter> DeviceFilter for std::rc::Rc<T> {
    fn apply_filter<X: UsbContext>(
        &self,
        device: &Device<X>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        (**self).apply_filter(device, device_desc)
    }
}

/// Allow apply filter by Arc
impl<T: DeviceFilter> DeviceFilter for std::sync::Arc<T> {
    fn apply_filter<X: UsbContext>(
        &self,
        device: &Device<X>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        (**self).apply_filter(device, device_desc)
    }
}

fn is_i3c_function<T: UsbContext>(device: &Device<T>, device_desc: &DeviceDescriptor) -> bool {
    (0..device_desc.num_configurations()).any(move |config_no| {
        if let Ok(config_desc) = device.config_descriptor(config_no) {
            config_desc.interfaces().any(|interface| {
                interface.descriptors().any(|interface_desc| {
                    interface_desc.class_code() == I3C_CLASS_CODE
                        && interface_desc.sub_class_code() == I3C_SUBCLASS_CODE
                        && interface_desc.protocol_code() == I3C_PROTOCOL_CODE
                })
            })
        } else {
            false
        }
    })
}

/// ### List Devices
///
/// List all I3C Functions visible through a libusb context.
///
pub fn list_devices<T: UsbContext>(context: &mut T) -> Result<Vec<UsbDeviceInfo>> {
    Ok(context
        .devices()?
        .iter()
        .filter_map(|device| {
            let device_desc = device.device_descriptor().ok()?;
            if is_i3c_function(&device, &device_desc) {
                Some(UsbDeviceInfo {
                    id: DeviceId {
                        vendor_id: device_desc.vendor_id(),
                        product_id: device_desc.product_id(),
                    },
                    address: DeviceAddr {
                        bus: device.bus_number(),
                        device: device.address(),
                    },
                })
            } else {
                None
            }
        })
        .collect())
}

/// ### Open Device
///
/// Open the device matching `filter` and exposing an I3C Function interface.
///
pub fn open_device<T: UsbContext>(
    context: &mut T,
    filter: impl DeviceFilter,
) -> Result<(Device<T>, DeviceHandle<T>)> {
    let devices = context.devices()?;

    for device in devices.iter() {
        if let Ok(device_desc) = device.device_descriptor() {
            if is_i3c_function(&device, &device_desc) && filter.apply_filter(&device, &device_desc) {
                if let Ok(handle) = device.open() {
                    return Ok((device, handle));
                }
            }
        }
    }

    Err(Error::DeviceNotFound)
}

/// ### Get I3C Mode
///
/// Get the device mode (configuration, interface and interface setting) that
/// exposes the I3C Function interface.
///
pub fn get_i3c_mode(device: &Device<Context>) -> Result<DeviceMode> {
    let mut modes: Vec<DeviceMode> = Vec::new();

    let device_desc = device.device_descriptor()?;

    for n in 0..device_desc.num_configurations() {
        let config_desc = device.config_descriptor(n)?;
        for interface in config_desc.interfaces() {
            for interface_desc in interface.descriptors() {
                if interface_desc.class_code() == I3C_CLASS_CODE
                    && interface_desc.sub_class_code() == I3C_SUBCLASS_CODE
                    && interface_desc.protocol_code() == I3C_PROTOCOL_CODE
                {
                    modes.push(DeviceMode {
                        config_number: config_desc.number(),
                        interface_number: interface_desc.interface_number(),
                        setting_number: interface_desc.setting_number(),
                        has_kernel_driver: false,
                    })
                }
            }
        }
    }

    match modes.first() {
        Some(m) => Ok(m.clone()),
        None => Err(Error::DeviceIncompatible),
    }
}

/// ### Detach Kernel Driver
///
/// If the interface uses a kernel driver, detach it for the duration of the program.
///
pub fn detach_kernel_driver(
    mode: &mut DeviceMode,
    handle: &mut DeviceHandle<Context>,
) -> Result<()> {
    mode.has_kernel_driver = match handle.kernel_driver_active(mode.interface_number) {
        Ok(true) => {
            handle.detach_kernel_driver(mode.interface_number)?;
            true
        }
        _ => false,
    };

    Ok(())
}

/// ### Get Endpoints
///
/// Enumerate the bulk in/out and interrupt in endpoints of the I3C Function
/// interface. The interrupt endpoint is mandatory (§6: it carries every
/// notification), unlike the optional one `rs-usbtmc` allows.
///
pub fn get_endpoints(mode: &DeviceMode, device: &Device<Context>) -> Result<UsbI3cEndpoints> {
    let mut endpoints_list: Vec<Endpoint> = Vec::new();

    let config_desc = device.config_descriptor(mode.config_number - 1)?;
    let interface = config_desc
        .interfaces()
        .find(|inter| inter.number() == mode.interface_number)
        .ok_or(Error::DeviceIncompatible)?;
    let interface_desc = interface
        .descriptors()
        .find(|d| d.setting_number() == mode.setting_number)
        .ok_or(Error::DeviceIncompatible)?;

    for endpoint in interface_desc.endpoint_descriptors() {
        endpoints_list.push(Endpoint {
            address: endpoint.address(),
            max_packet_size: endpoint.max_packet_size(),
            transfer_type: endpoint.transfer_type(),
            direction: endpoint.direction(),
        })
    }

    let bulk_out_ep = endpoints_list
        .iter()
        .find(|ep| ep.transfer_type == TransferType::Bulk && ep.direction == Direction::Out)
        .cloned()
        .ok_or(Error::EndpointNotFound)?;
    let bulk_in_ep = endpoints_list
        .iter()
        .find(|ep| ep.transfer_type == TransferType::Bulk && ep.direction == Direction::In)
        .cloned()
        .ok_or(Error::EndpointNotFound)?;
    let interrupt_ep = endpoints_list
        .iter()
        .find(|ep| ep.transfer_type == TransferType::Interrupt && ep.direction == Direction::In)
        .cloned()
        .ok_or(Error::EndpointNotFound)?;

    Ok(UsbI3cEndpoints {
        bulk_out_ep,
        bulk_in_ep,
        interrupt_ep,
    })
}
