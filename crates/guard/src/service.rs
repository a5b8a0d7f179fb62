//! Attach handling
//!
//! [`UsbGuard`] decides what happens when a device is plugged in:
//!
//! 1. Protection disabled: nothing, the device is left alone.
//! 2. Device whitelisted: data transfer is allowed straight away.
//! 3. Otherwise transfer is blocked and a [`PendingAuth`] challenge is
//!    returned. Answering it correctly allows transfer (and optionally
//!    remembers the device); cancelling or letting it expire keeps it blocked.

use crate::audit::{AuditEntry, AuditEventType, AuditLogger, AuditResult};
use crate::auth::{AuthOutcome, PendingAuth, validate_new_password};
use crate::config::GuardConfig;
use crate::control::{TransferAction, TransferController};
use crate::whitelist::{Whitelist, WhitelistedDevice};
use common::{Result, UsbDeviceDescriptor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What the guard did with a newly attached device
#[derive(Debug)]
pub enum AttachOutcome {
    /// Protection is off
    Ignored,
    /// Device is whitelisted; `transfer_ok` is the controller result
    Allowed { transfer_ok: bool },
    /// Transfer blocked until the challenge is answered
    ChallengeRequired(PendingAuth),
}

pub struct UsbGuard {
    config: GuardConfig,
    /// Where `config` is persisted on changes; `None` keeps changes in memory
    config_path: Option<PathBuf>,
    controller: Arc<TransferController>,
    whitelist: Whitelist,
    audit: Option<AuditLogger>,
}

impl UsbGuard {
    /// Create a guard with a controller built from the config
    pub fn new(config: GuardConfig, config_path: Option<PathBuf>) -> Self {
        let controller = Arc::new(TransferController::from_settings(&config.control));
        Self::with_controller(config, config_path, controller)
    }

    /// Create a guard sharing an existing controller
    pub fn with_controller(
        config: GuardConfig,
        config_path: Option<PathBuf>,
        controller: Arc<TransferController>,
    ) -> Self {
        let whitelist = Whitelist::load(config.storage.whitelist_path.clone());
        let audit = AuditLogger::new(&config.audit);

        info!(
            "USB guard ready (protection {}, backend {}, {} whitelisted)",
            if config.guard.protection_enabled { "on" } else { "off" },
            controller.backend_name(),
            whitelist.len()
        );

        Self {
            config,
            config_path,
            controller,
            whitelist,
            audit,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn controller(&self) -> &Arc<TransferController> {
        &self.controller
    }

    pub fn protection_enabled(&self) -> bool {
        self.config.guard.protection_enabled
    }

    pub fn whitelisted_devices(&self) -> &[WhitelistedDevice] {
        self.whitelist.devices()
    }

    fn audit(&self, entry: AuditEntry) {
        if let Some(audit) = &self.audit {
            audit.log(entry);
        }
    }

    /// Save `config` and adopt it; on failure the current settings stay
    fn commit_config(&mut self, config: GuardConfig) -> Result<()> {
        if let Some(path) = &self.config_path {
            config
                .save(path)
                .map_err(|e| common::Error::Config(format!("{:#}", e)))?;
        }
        self.config = config;
        Ok(())
    }

    /// Run a toggle through the controller and audit it
    fn transfer(&self, action: TransferAction, device_id: Option<&str>) -> bool {
        let ok = self.controller.toggle(action);

        let event = match action {
            TransferAction::Block => AuditEventType::TransferBlocked,
            TransferAction::Allow => AuditEventType::TransferAllowed,
        };
        let result = if ok {
            AuditResult::Success
        } else {
            AuditResult::Failure
        };
        let mut entry = AuditEntry::new(event, result);
        if let Some(id) = device_id {
            entry = entry.with_device_id(id);
        }
        self.audit(entry);

        ok
    }

    /// Block USB data transfer
    pub fn block(&self) -> bool {
        self.transfer(TransferAction::Block, None)
    }

    /// Allow USB data transfer
    pub fn allow(&self) -> bool {
        self.transfer(TransferAction::Allow, None)
    }

    /// Turn protection on or off
    ///
    /// Turning it off allows data transfer again.
    pub fn set_protection(&mut self, enabled: bool) -> Result<()> {
        let previous = self.config.guard.protection_enabled;
        let mut config = self.config.clone();
        config.guard.protection_enabled = enabled;
        self.commit_config(config)?;

        info!("Protection {}", if enabled { "enabled" } else { "disabled" });
        self.audit(
            AuditEntry::new(AuditEventType::ProtectionChanged, AuditResult::Success)
                .with_detail(format!("{} -> {}", previous, enabled)),
        );

        if !enabled {
            self.allow();
        }
        Ok(())
    }

    /// Set the unlock password after checking the confirmation
    pub fn set_password(&mut self, password: &str, confirm: &str) -> Result<()> {
        validate_new_password(password, confirm)?;

        let mut config = self.config.clone();
        config.auth.password = password.to_string();
        self.commit_config(config)?;

        info!("Password updated");
        self.audit(AuditEntry::new(
            AuditEventType::PasswordChanged,
            AuditResult::Success,
        ));
        Ok(())
    }

    /// Handle a device attach event
    pub fn on_device_attached(&self, device: &UsbDeviceDescriptor) -> AttachOutcome {
        self.on_device_attached_at(device, Instant::now())
    }

    pub fn on_device_attached_at(&self, device: &UsbDeviceDescriptor, now: Instant) -> AttachOutcome {
        let device_id = device.device_id();
        let device_name = device.display_name();
        debug!("Device detected: {} ({})", device_id, device_name);

        if !self.config.guard.protection_enabled {
            debug!("Protection disabled, ignoring {}", device_id);
            return AttachOutcome::Ignored;
        }

        if self.whitelist.contains(&device_id) {
            debug!("Device {} is whitelisted, allowing access", device_id);
            self.audit(
                AuditEntry::new(AuditEventType::DeviceAttached, AuditResult::Success)
                    .with_device_id(&device_id)
                    .with_detail("whitelisted"),
            );
            let transfer_ok = self.transfer(TransferAction::Allow, Some(&device_id));
            return AttachOutcome::Allowed { transfer_ok };
        }

        info!("Unknown device {} ({}), authentication required", device_id, device_name);
        self.audit(
            AuditEntry::new(AuditEventType::DeviceAttached, AuditResult::Denied)
                .with_device_id(&device_id)
                .with_detail("challenge"),
        );
        self.transfer(TransferAction::Block, Some(&device_id));

        AttachOutcome::ChallengeRequired(PendingAuth::starting_at(
            device_id,
            device_name,
            self.config.auth.timeout(),
            now,
        ))
    }

    /// Answer a pending challenge
    pub fn complete_challenge(
        &mut self,
        pending: &mut PendingAuth,
        entered: &str,
        remember: bool,
    ) -> Result<AuthOutcome> {
        self.complete_challenge_at(pending, entered, remember, Instant::now())
    }

    pub fn complete_challenge_at(
        &mut self,
        pending: &mut PendingAuth,
        entered: &str,
        remember: bool,
        now: Instant,
    ) -> Result<AuthOutcome> {
        let outcome = pending.verify(entered, &self.config.auth.password, now);
        let device_id = pending.device_id().to_string();

        match outcome {
            AuthOutcome::Granted => {
                info!("Access granted for {}", device_id);
                self.audit(
                    AuditEntry::new(AuditEventType::AuthGranted, AuditResult::Success)
                        .with_device_id(&device_id),
                );
                self.transfer(TransferAction::Allow, Some(&device_id));

                if remember {
                    self.remember(&device_id, pending.device_name());
                }
            }
            AuthOutcome::WrongPassword => {
                warn!("Wrong password for {} (attempt {})", device_id, pending.attempts());
                self.audit(
                    AuditEntry::new(AuditEventType::AuthFailed, AuditResult::Denied)
                        .with_device_id(&device_id)
                        .with_detail(format!("attempt {}", pending.attempts())),
                );
            }
            AuthOutcome::Expired => {
                warn!("Authentication for {} timed out", device_id);
                self.audit(
                    AuditEntry::new(AuditEventType::AuthExpired, AuditResult::Denied)
                        .with_device_id(&device_id),
                );
                self.transfer(TransferAction::Block, Some(&device_id));
            }
        }

        Ok(outcome)
    }

    /// Whitelist a device after a granted challenge
    ///
    /// A storage failure is logged and audited, not returned.
    fn remember(&mut self, device_id: &str, device_name: &str) {
        match self.whitelist.add(device_id, device_name) {
            Ok(true) => self.audit(
                AuditEntry::new(AuditEventType::WhitelistAdded, AuditResult::Success)
                    .with_device_id(device_id),
            ),
            Ok(false) => {}
            Err(e) => {
                warn!("Failed to remember {}: {}", device_id, e);
                self.audit(
                    AuditEntry::new(AuditEventType::WhitelistAdded, AuditResult::Failure)
                        .with_device_id(device_id)
                        .with_detail(e.to_string()),
                );
            }
        }
    }

    /// Abandon a challenge, keeping transfer blocked
    pub fn cancel_challenge(&self, pending: &PendingAuth) -> bool {
        info!("Authentication cancelled for {}", pending.device_id());
        self.audit(
            AuditEntry::new(AuditEventType::AuthCancelled, AuditResult::Denied)
                .with_device_id(pending.device_id()),
        );
        self.transfer(TransferAction::Block, Some(pending.device_id()))
    }

    /// Forget a whitelisted device
    pub fn remove_from_whitelist(&mut self, device_id: &str) -> Result<bool> {
        let removed = self.whitelist.remove(device_id)?;
        if removed {
            self.audit(
                AuditEntry::new(AuditEventType::WhitelistRemoved, AuditResult::Success)
                    .with_device_id(device_id),
            );
        }
        Ok(removed)
    }
}
