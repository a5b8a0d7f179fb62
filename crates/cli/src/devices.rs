//! Host USB enumeration

use common::UsbDeviceDescriptor;
use rusb::{Context, Device, UsbContext};
use tracing::{debug, warn};

/// Enumerate the USB devices currently connected to this host
pub fn list_devices() -> anyhow::Result<Vec<UsbDeviceDescriptor>> {
    let context = Context::new()?;
    let mut devices = Vec::new();

    for device in context.devices()?.iter() {
        match describe(&device) {
            Ok(descriptor) => devices.push(descriptor),
            Err(e) => warn!(
                "Failed to read descriptor for bus={} addr={}: {}",
                device.bus_number(),
                device.address(),
                e
            ),
        }
    }

    debug!("Enumerated {} devices", devices.len());
    Ok(devices)
}

fn describe(device: &Device<Context>) -> Result<UsbDeviceDescriptor, rusb::Error> {
    let descriptor = device.device_descriptor()?;
    let mut info = UsbDeviceDescriptor::new(descriptor.vendor_id(), descriptor.product_id());
    info.device_name = format!(
        "/dev/bus/usb/{:03}/{:03}",
        device.bus_number(),
        device.address()
    );

    // String descriptors need the device opened; without permission we keep the IDs only
    if let Ok(handle) = device.open() {
        let read = |idx: Option<u8>| idx.and_then(|i| handle.read_string_descriptor_ascii(i).ok());
        info.manufacturer = read(descriptor.manufacturer_string_index());
        info.product = read(descriptor.product_string_index());
        info.serial_number = read(descriptor.serial_number_string_index());
    }

    Ok(info)
}
