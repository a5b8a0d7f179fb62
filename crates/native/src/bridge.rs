//! Process-global state behind the JNI entry points
//!
//! Java calls the native methods from whichever thread it likes, so the bridge
//! keeps a single [`TransferController`] for the whole process. Until
//! [`init_from_dir`] runs, a simulated backend is used.

use anyhow::{Context, Result};
use guard::{GuardConfig, TransferController};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::{error, info};

static CONTROLLER: OnceLock<RwLock<Arc<TransferController>>> = OnceLock::new();

fn slot() -> &'static RwLock<Arc<TransferController>> {
    CONTROLLER.get_or_init(|| {
        common::setup_android_logging("debug");
        RwLock::new(Arc::new(TransferController::simulated()))
    })
}

/// Controller currently serving the entry points
pub fn controller() -> Arc<TransferController> {
    let lock = slot();
    match lock.read() {
        Ok(current) => Arc::clone(&*current),
        Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
    }
}

/// Replace the process-wide controller
pub fn install(controller: TransferController) {
    let lock = slot();
    let mut current = match lock.write() {
        Ok(current) => current,
        Err(poisoned) => poisoned.into_inner(),
    };
    *current = Arc::new(controller);
}

/// Load `settings.toml` from the app files directory and install its backend
pub fn init_from_dir(dir: &Path) -> Result<()> {
    let config = GuardConfig::load_from_dir(dir)
        .with_context(|| format!("Failed to load settings from {}", dir.display()))?;

    common::setup_android_logging(&config.guard.log_level);

    let controller = TransferController::from_settings(&config.control);
    info!("Native bridge using {} backend", controller.backend_name());
    install(controller);
    Ok(())
}

/// Block USB data transfer
pub fn block_usb_data_transfer() -> bool {
    controller().block()
}

/// Allow USB data transfer
pub fn allow_usb_data_transfer() -> bool {
    controller().allow()
}

/// Run `f`, turning a panic into `false` so it never unwinds into the JVM
pub fn catch_panic(name: &str, f: impl FnOnce() -> bool) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            error!("Panic in native call {}", name);
            false
        }
    }
}
