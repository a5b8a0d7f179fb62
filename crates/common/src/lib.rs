//! Common utilities for usb-auth
//!
//! This crate provides functionality shared between the guard library, the
//! JNI bridge and the host CLI: error handling, logging setup and USB device
//! identity types.

pub mod error;
pub mod logging;
pub mod usb_types;

pub use error::{Error, Result};
pub use logging::{setup_android_logging, setup_logging};
pub use usb_types::{UsbDeviceDescriptor, parse_device_spec};
