//! Guard configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up inside an app data directory
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default)]
    pub guard: GuardSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub control: ControlSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    /// Audit logging configuration
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardSettings {
    /// Require a password before data transfer is allowed for unknown devices
    #[serde(default)]
    pub protection_enabled: bool,
    #[serde(default = "GuardSettings::default_log_level")]
    pub log_level: String,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            protection_enabled: false,
            log_level: Self::default_log_level(),
        }
    }
}

impl GuardSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Unlock password (empty = not set, every challenge fails)
    #[serde(default)]
    pub password: String,
    /// Seconds the user has to answer a challenge
    #[serde(default = "AuthSettings::default_timeout")]
    pub timeout_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            password: String::new(),
            timeout_secs: Self::default_timeout(),
        }
    }
}

impl AuthSettings {
    fn default_timeout() -> u64 {
        30
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }
}

/// Which backend toggles USB data transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ControlBackend {
    /// Record the requested state without touching hardware
    #[default]
    Simulated,
    /// Write the USB gadget enable attribute (requires root)
    Sysfs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSettings {
    #[serde(default)]
    pub backend: ControlBackend,
    #[serde(default = "ControlSettings::default_sysfs_path")]
    pub sysfs_path: PathBuf,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            backend: ControlBackend::default(),
            sysfs_path: Self::default_sysfs_path(),
        }
    }
}

impl ControlSettings {
    fn default_sysfs_path() -> PathBuf {
        PathBuf::from("/sys/class/android_usb/android0/enable")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "StorageSettings::default_whitelist_path")]
    pub whitelist_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            whitelist_path: Self::default_whitelist_path(),
        }
    }
}

impl StorageSettings {
    fn default_whitelist_path() -> PathBuf {
        data_dir().join("whitelist.json")
    }
}

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Enable audit logging
    #[serde(default)]
    pub enabled: bool,
    /// Path to audit log file
    #[serde(default = "AuditConfig::default_path")]
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: Self::default_path(),
        }
    }
}

impl AuditConfig {
    fn default_path() -> PathBuf {
        data_dir().join("audit.log")
    }
}

fn data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        data_dir.join("usb-auth")
    } else {
        PathBuf::from("/var/lib/usb-auth")
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            guard: GuardSettings::default(),
            auth: AuthSettings::default(),
            control: ControlSettings::default(),
            storage: StorageSettings::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-auth").join(SETTINGS_FILE_NAME),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: GuardConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Load `settings.toml` from an app data directory
    ///
    /// Storage paths that are not set in the file are placed next to it, so an
    /// Android app only has to hand over its files directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE_NAME);
        let mut config = if path.exists() {
            Self::load(Some(path))?
        } else {
            tracing::debug!("No {} in {}, using defaults", SETTINGS_FILE_NAME, dir.display());
            Self::default()
        };

        if config.storage.whitelist_path == StorageSettings::default_whitelist_path() {
            config.storage.whitelist_path = dir.join("whitelist.json");
        }
        if config.audit.path == AuditConfig::default_path() {
            config.audit.path = dir.join("audit.log");
        }
        Ok(config)
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-auth").join(SETTINGS_FILE_NAME)
        } else {
            PathBuf::from(".config/usb-auth").join(SETTINGS_FILE_NAME)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.guard.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.guard.log_level,
                valid_levels.join(", ")
            ));
        }

        let max_timeout = crate::auth::MAX_TIMEOUT.as_secs();
        if self.auth.timeout_secs == 0 || self.auth.timeout_secs > max_timeout {
            return Err(anyhow!(
                "auth.timeout_secs must be between 1 and {}, got {}",
                max_timeout,
                self.auth.timeout_secs
            ));
        }

        if self.control.backend == ControlBackend::Sysfs
            && self.control.sysfs_path.as_os_str().is_empty()
        {
            return Err(anyhow!("control.sysfs_path is required for the sysfs backend"));
        }

        Ok(())
    }
}

/// Expand a leading `~` to the home directory
pub fn resolve_config_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Load configuration from a path that may start with `~`
///
/// Returns the expanded path alongside the config so later saves go to the
/// same file.
pub fn load_config(path: &str) -> Result<(GuardConfig, PathBuf)> {
    let path_buf = resolve_config_path(path);
    let config = GuardConfig::load(Some(path_buf.clone()))?;
    Ok((config, path_buf))
}
