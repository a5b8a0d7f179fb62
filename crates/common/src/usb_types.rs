//! USB device identity types
//!
//! A connected device is identified by vendor id, product id and, when the
//! device exposes one, its serial number. The resulting identity string is
//! what the whitelist stores.

use serde::{Deserialize, Serialize};

/// Descriptor of an attached USB device as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    /// Platform device path (e.g. `/dev/bus/usb/001/004`)
    #[serde(default)]
    pub device_name: String,
}

impl UsbDeviceDescriptor {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            serial_number: None,
            manufacturer: None,
            product: None,
            device_name: String::new(),
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    pub fn with_strings(mut self, manufacturer: impl Into<String>, product: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self.product = Some(product.into());
        self
    }

    /// Stable identity used for whitelisting: `vid:pid:serial`
    ///
    /// IDs are decimal. The trailing colon is kept when there is no serial
    /// number so identities stay comparable with ones stored earlier.
    pub fn device_id(&self) -> String {
        format!(
            "{}:{}:{}",
            self.vendor_id,
            self.product_id,
            self.serial_number.as_deref().unwrap_or("")
        )
    }

    /// Human-readable name shown in prompts and whitelist listings
    pub fn display_name(&self) -> String {
        match (&self.manufacturer, &self.product) {
            (Some(manufacturer), Some(product)) => format!("{} {}", manufacturer, product),
            _ => format!("Device {}:{}", self.vendor_id, self.product_id),
        }
    }
}

/// Parse a `vid:pid[:serial]` device spec
///
/// VID and PID accept decimal (`1234`) or hex with a `0x` prefix (`0x04d2`).
pub fn parse_device_spec(spec: &str) -> crate::Result<UsbDeviceDescriptor> {
    let mut parts = spec.splitn(3, ':');
    let vid = parts.next().unwrap_or_default();
    let pid = parts
        .next()
        .ok_or_else(|| crate::Error::Usb(format!("Invalid device spec '{}', expected VID:PID[:SERIAL]", spec)))?;

    let mut descriptor = UsbDeviceDescriptor::new(parse_id(vid, "VID")?, parse_id(pid, "PID")?);
    if let Some(serial) = parts.next().filter(|s| !s.is_empty()) {
        descriptor.serial_number = Some(serial.to_string());
    }
    Ok(descriptor)
}

fn parse_id(id: &str, name: &str) -> crate::Result<u16> {
    let id = id.trim();
    let parsed = if let Some(hex) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        id.parse::<u16>()
    };
    parsed.map_err(|_| crate::Error::Usb(format!("Invalid {} '{}'", name, id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_with_serial() {
        let device = UsbDeviceDescriptor::new(1234, 5678).with_serial("ABC123");
        assert_eq!(device.device_id(), "1234:5678:ABC123");
    }

    #[test]
    fn test_device_id_without_serial_keeps_separator() {
        let device = UsbDeviceDescriptor::new(0x04f9, 0x0042);
        assert_eq!(device.device_id(), "1273:66:");
    }

    #[test]
    fn test_display_name() {
        let device = UsbDeviceDescriptor::new(1, 2).with_strings("SanDisk", "Cruzer Blade");
        assert_eq!(device.display_name(), "SanDisk Cruzer Blade");

        let mut partial = UsbDeviceDescriptor::new(1, 2);
        partial.product = Some("Cruzer Blade".to_string());
        assert_eq!(partial.display_name(), "Device 1:2");
    }

    #[test]
    fn test_parse_device_spec() {
        let device = parse_device_spec("0x0781:0x5567:4C530001").unwrap();
        assert_eq!(device.vendor_id, 0x0781);
        assert_eq!(device.product_id, 0x5567);
        assert_eq!(device.serial_number.as_deref(), Some("4C530001"));

        let device = parse_device_spec("1921:21863").unwrap();
        assert_eq!(device.vendor_id, 1921);
        assert_eq!(device.serial_number, None);

        // Serial numbers may themselves contain colons
        let device = parse_device_spec("1:2:AA:BB").unwrap();
        assert_eq!(device.serial_number.as_deref(), Some("AA:BB"));
    }

    #[test]
    fn test_parse_device_spec_invalid() {
        assert!(parse_device_spec("1234").is_err());
        assert!(parse_device_spec("0xZZZZ:1").is_err());
        assert!(parse_device_spec("70000:1").is_err());
        assert!(parse_device_spec("").is_err());
    }
}
