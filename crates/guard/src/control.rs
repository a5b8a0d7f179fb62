//! USB data-transfer control
//!
//! A [`DataTransferControl`] backend does the actual blocking or allowing. The
//! [`TransferController`] wraps one backend, serializes toggle requests coming
//! from several threads and turns the outcome into the boolean the JNI layer
//! returns.

use crate::config::{ControlBackend, ControlSettings};
use common::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

/// Whether data can flow over USB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Allowed,
    Blocked,
}

/// A requested change of [`TransferState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAction {
    Block,
    Allow,
}

impl TransferAction {
    /// State the device should be in after the action
    pub fn target_state(self) -> TransferState {
        match self {
            TransferAction::Block => TransferState::Blocked,
            TransferAction::Allow => TransferState::Allowed,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            TransferAction::Block => "block",
            TransferAction::Allow => "allow",
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            TransferAction::Block => "blocked",
            TransferAction::Allow => "allowed",
        }
    }
}

/// Backend able to toggle USB data transfer on the running platform
pub trait DataTransferControl: Send {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Apply the action; an `Ok` return means the platform is now in the target state
    fn apply(&mut self, action: TransferAction) -> Result<()>;

    /// Read back the current state, `None` when the backend cannot tell
    fn current(&self) -> Result<Option<TransferState>>;
}

/// Backend that records the requested state and always succeeds
#[derive(Debug, Default)]
pub struct SimulatedControl {
    state: Option<TransferState>,
}

impl SimulatedControl {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataTransferControl for SimulatedControl {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn apply(&mut self, action: TransferAction) -> Result<()> {
        self.state = Some(action.target_state());
        Ok(())
    }

    fn current(&self) -> Result<Option<TransferState>> {
        Ok(self.state)
    }
}

/// Backend writing the USB gadget enable attribute
///
/// `0` disables the gadget (no data transfer, charging only), `1` enables it.
/// The attribute is read back after every write.
#[derive(Debug)]
pub struct SysfsControl {
    path: PathBuf,
}

impl SysfsControl {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_state(&self) -> Result<TransferState> {
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            Error::Control(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        match raw.trim() {
            "0" => Ok(TransferState::Blocked),
            "1" => Ok(TransferState::Allowed),
            other => Err(Error::Control(format!(
                "Unexpected value '{}' in {}",
                other,
                self.path.display()
            ))),
        }
    }
}

impl DataTransferControl for SysfsControl {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn apply(&mut self, action: TransferAction) -> Result<()> {
        let value = match action {
            TransferAction::Block => "0",
            TransferAction::Allow => "1",
        };

        fs::write(&self.path, value).map_err(|e| {
            Error::Control(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        let actual = self.read_state()?;
        if actual != action.target_state() {
            return Err(Error::Control(format!(
                "State mismatch after write: expected {:?}, read {:?}",
                action.target_state(),
                actual
            )));
        }
        Ok(())
    }

    fn current(&self) -> Result<Option<TransferState>> {
        self.read_state().map(Some)
    }
}

/// Build the backend selected in configuration
pub fn backend_from_settings(settings: &ControlSettings) -> Box<dyn DataTransferControl> {
    match settings.backend {
        ControlBackend::Simulated => Box::new(SimulatedControl::new()),
        ControlBackend::Sysfs => Box::new(SysfsControl::new(settings.sysfs_path.clone())),
    }
}

/// Toggle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlStats {
    pub blocks: u64,
    pub allows: u64,
    pub failures: u64,
}

struct ControlInner {
    backend: Box<dyn DataTransferControl>,
    last_state: Option<TransferState>,
}

/// Serializes toggle requests onto a single backend
pub struct TransferController {
    inner: Mutex<ControlInner>,
    blocks: AtomicU64,
    allows: AtomicU64,
    failures: AtomicU64,
}

impl TransferController {
    pub fn new(backend: Box<dyn DataTransferControl>) -> Self {
        Self {
            inner: Mutex::new(ControlInner {
                backend,
                last_state: None,
            }),
            blocks: AtomicU64::new(0),
            allows: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn simulated() -> Self {
        Self::new(Box::new(SimulatedControl::new()))
    }

    pub fn from_settings(settings: &ControlSettings) -> Self {
        Self::new(backend_from_settings(settings))
    }

    /// Block USB data transfer, `true` on success
    pub fn block(&self) -> bool {
        self.toggle(TransferAction::Block)
    }

    /// Allow USB data transfer, `true` on success
    pub fn allow(&self) -> bool {
        self.toggle(TransferAction::Allow)
    }

    /// Run one toggle and log its outcome
    pub fn toggle(&self, action: TransferAction) -> bool {
        debug!("Attempting to {} USB data transfer", action.verb());

        match self.apply(action) {
            Ok(()) => {
                match action {
                    TransferAction::Block => self.blocks.fetch_add(1, Ordering::Relaxed),
                    TransferAction::Allow => self.allows.fetch_add(1, Ordering::Relaxed),
                };
                debug!("USB data transfer {} successfully", action.past_tense());
                true
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                error!("Failed to {} USB data transfer: {}", action.verb(), e);
                false
            }
        }
    }

    fn apply(&self, action: TransferAction) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::Control("controller lock poisoned".to_string()))?;

        inner.backend.apply(action)?;
        inner.last_state = Some(action.target_state());
        Ok(())
    }

    /// Last state successfully applied through this controller
    pub fn last_state(&self) -> Option<TransferState> {
        self.inner.lock().ok().and_then(|inner| inner.last_state)
    }

    /// State reported by the backend itself
    pub fn query_state(&self) -> Result<Option<TransferState>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| Error::Control("controller lock poisoned".to_string()))?;
        inner.backend.current()
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner
            .lock()
            .map(|inner| inner.backend.name())
            .unwrap_or("unavailable")
    }

    pub fn stats(&self) -> ControlStats {
        ControlStats {
            blocks: self.blocks.load(Ordering::Relaxed),
            allows: self.allows.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for TransferController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferController")
            .field("backend", &self.backend_name())
            .field("last_state", &self.last_state())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Backend that fails every request
    struct FailingControl;

    impl DataTransferControl for FailingControl {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn apply(&mut self, _action: TransferAction) -> Result<()> {
            Err(Error::Control("permission denied".to_string()))
        }

        fn current(&self) -> Result<Option<TransferState>> {
            Ok(None)
        }
    }

    #[test]
    fn test_simulated_always_succeeds() {
        let controller = TransferController::simulated();
        for _ in 0..3 {
            assert!(controller.block());
            assert!(controller.allow());
        }
        assert_eq!(
            controller.stats(),
            ControlStats {
                blocks: 3,
                allows: 3,
                failures: 0
            }
        );
    }

    #[test]
    fn test_repeated_block_still_succeeds() {
        let controller = TransferController::simulated();
        assert!(controller.block());
        assert!(controller.block());
        assert_eq!(controller.last_state(), Some(TransferState::Blocked));
    }

    #[test]
    fn test_last_state_tracks_toggles() {
        let controller = TransferController::simulated();
        assert_eq!(controller.last_state(), None);

        controller.block();
        assert_eq!(controller.last_state(), Some(TransferState::Blocked));
        assert_eq!(
            controller.query_state().unwrap(),
            Some(TransferState::Blocked)
        );

        controller.allow();
        assert_eq!(controller.last_state(), Some(TransferState::Allowed));
    }

    #[test]
    fn test_failure_returns_false() {
        let controller = TransferController::new(Box::new(FailingControl));
        assert!(!controller.block());
        assert!(!controller.allow());
        assert_eq!(controller.last_state(), None);
        assert_eq!(controller.stats().failures, 2);
        assert_eq!(controller.backend_name(), "failing");
    }

    #[test]
    fn test_sysfs_toggle_and_readback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enable");
        fs::write(&path, "1\n").unwrap();

        let controller = TransferController::new(Box::new(SysfsControl::new(&path)));
        assert_eq!(controller.query_state().unwrap(), Some(TransferState::Allowed));

        assert!(controller.block());
        assert_eq!(fs::read_to_string(&path).unwrap(), "0");
        assert_eq!(controller.query_state().unwrap(), Some(TransferState::Blocked));

        assert!(controller.allow());
        assert_eq!(fs::read_to_string(&path).unwrap(), "1");
    }

    #[test]
    fn test_sysfs_missing_attribute_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("enable");

        let controller = TransferController::new(Box::new(SysfsControl::new(&path)));
        assert!(!controller.block());
        assert!(controller.query_state().is_err());
    }

    #[test]
    fn test_sysfs_unexpected_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enable");
        fs::write(&path, "maybe").unwrap();

        let control = SysfsControl::new(&path);
        assert!(matches!(control.current(), Err(Error::Control(_))));
    }

    #[test]
    fn test_backend_from_settings() {
        let mut settings = ControlSettings::default();
        assert_eq!(backend_from_settings(&settings).name(), "simulated");

        settings.backend = ControlBackend::Sysfs;
        assert_eq!(backend_from_settings(&settings).name(), "sysfs");
    }

    #[test]
    fn test_concurrent_toggles_are_counted() {
        let controller = Arc::new(TransferController::simulated());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let controller = Arc::clone(&controller);
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        controller.block()
                    } else {
                        controller.allow()
                    }
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }

        let stats = controller.stats();
        assert_eq!(stats.blocks, 4);
        assert_eq!(stats.allows, 4);
        assert!(controller.last_state().is_some());
    }
}
