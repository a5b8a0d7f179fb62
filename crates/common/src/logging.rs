//! Logging setup and configuration

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log tag used on Android (visible in `adb logcat -s UsbAuthNative`)
pub const ANDROID_LOG_TAG: &str = "UsbAuthNative";

/// Setup tracing subscriber for the application
pub fn setup_logging(default_level: &str) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| crate::Error::Config(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .map_err(|e| crate::Error::Config(format!("Logging already initialized: {}", e)))?;

    Ok(())
}

/// Route tracing events to logcat
///
/// No subscriber is installed on Android; `tracing` falls back to the `log`
/// facade, which `android_logger` forwards to logcat. Safe to call more than once.
#[cfg(target_os = "android")]
pub fn setup_android_logging(level: &str) {
    let filter = level
        .parse::<log::LevelFilter>()
        .unwrap_or(log::LevelFilter::Debug);

    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(filter)
            .with_tag(ANDROID_LOG_TAG),
    );
}

/// Host builds log through [`setup_logging`]; this is a no-op there.
#[cfg(not(target_os = "android"))]
pub fn setup_android_logging(_level: &str) {}
