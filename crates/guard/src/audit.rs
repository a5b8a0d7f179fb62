//! Security audit log
//!
//! Appends one JSON object per line for every security-relevant decision the
//! guard takes. Write failures are logged and otherwise ignored; auditing must
//! never change whether a device gets blocked.

use crate::config::AuditConfig;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::warn;

/// Types of audit events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    DeviceAttached,
    TransferBlocked,
    TransferAllowed,
    AuthGranted,
    AuthFailed,
    AuthExpired,
    AuthCancelled,
    WhitelistAdded,
    WhitelistRemoved,
    ProtectionChanged,
    PasswordChanged,
}

/// Result of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Success,
    Failure,
    Denied,
}

/// A structured audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp
    pub timestamp: String,
    pub event_type: AuditEventType,
    pub result: AuditResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEntry {
    /// Create a new audit entry with the current timestamp
    pub fn new(event_type: AuditEventType, result: AuditResult) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| time_to_iso8601(d.as_secs()))
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());

        Self {
            timestamp,
            event_type,
            result,
            device_id: None,
            detail: None,
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Convert Unix timestamp to ISO 8601 format
fn time_to_iso8601(secs: u64) -> String {
    const SECONDS_PER_DAY: u64 = 86400;

    let days = secs / SECONDS_PER_DAY;
    let remaining = secs % SECONDS_PER_DAY;
    let (year, month, day) = days_to_ymd(days);

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        remaining / 3600,
        (remaining % 3600) / 60,
        remaining % 60
    )
}

/// Convert days since Unix epoch to year, month, day
fn days_to_ymd(days: u64) -> (u32, u32, u32) {
    let mut remaining_days = days;
    let mut year = 1970u32;

    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining_days < days_in_year {
            break;
        }
        remaining_days -= days_in_year;
        year += 1;
    }

    let february = if is_leap_year(year) { 29 } else { 28 };
    let days_in_months = [31, february, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

    let mut month = 1u32;
    for days_in_month in days_in_months {
        if remaining_days < days_in_month {
            break;
        }
        remaining_days -= days_in_month;
        month += 1;
    }

    (year, month, remaining_days as u32 + 1)
}

fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// Synchronous JSON-lines audit writer
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Open the audit log, `None` when disabled or the file cannot be opened
    pub fn new(config: &AuditConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        if let Some(parent) = config.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create audit log directory {}: {}", parent.display(), e);
                return None;
            }
        }

        match OpenOptions::new().create(true).append(true).open(&config.path) {
            Ok(file) => Some(Self {
                writer: Mutex::new(BufWriter::new(file)),
            }),
            Err(e) => {
                warn!("Failed to open audit log {}: {}", config.path.display(), e);
                None
            }
        }
    }

    pub fn log(&self, entry: AuditEntry) {
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize audit entry: {}", e);
                return;
            }
        };

        let Ok(mut writer) = self.writer.lock() else {
            warn!("Audit log lock poisoned, dropping entry");
            return;
        };

        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!("Failed to write audit entry: {}", e);
        }
    }
}
