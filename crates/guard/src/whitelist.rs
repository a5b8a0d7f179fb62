//! Whitelist of remembered USB devices
//!
//! Persisted as a JSON array of `{ "id", "name", "addedTimestamp" }` objects.
//! A missing or unreadable file loads as an empty whitelist.

use common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// A device the user chose to remember
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistedDevice {
    /// Identity as produced by `UsbDeviceDescriptor::device_id`
    pub id: String,
    pub name: String,
    /// Milliseconds since the Unix epoch
    pub added_timestamp: u64,
}

impl WhitelistedDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            added_timestamp: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// File-backed whitelist
#[derive(Debug)]
pub struct Whitelist {
    path: PathBuf,
    devices: Vec<WhitelistedDevice>,
}

impl Whitelist {
    /// Open the whitelist stored at `path`
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let devices = match Self::read_devices(&path) {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Failed to read whitelist {}: {}", path.display(), e);
                Vec::new()
            }
        };

        debug!("Loaded {} whitelisted devices", devices.len());
        Self { path, devices }
    }

    fn read_devices(path: &Path) -> Result<Vec<WhitelistedDevice>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_str(&content)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn devices(&self) -> &[WhitelistedDevice] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.iter().any(|d| d.id == device_id)
    }

    pub fn get(&self, device_id: &str) -> Option<&WhitelistedDevice> {
        self.devices.iter().find(|d| d.id == device_id)
    }

    /// Remember a device; returns `false` if it was already whitelisted
    pub fn add(&mut self, device_id: &str, name: &str) -> Result<bool> {
        if self.contains(device_id) {
            debug!("Device {} already whitelisted", device_id);
            return Ok(false);
        }

        self.devices.push(WhitelistedDevice::new(device_id, name));
        if let Err(e) = self.save() {
            self.devices.pop();
            return Err(e);
        }
        info!("Added {} ({}) to whitelist", name, device_id);
        Ok(true)
    }

    /// Forget a device; returns `false` if it was not whitelisted
    pub fn remove(&mut self, device_id: &str) -> Result<bool> {
        let Some(index) = self.devices.iter().position(|d| d.id == device_id) else {
            return Ok(false);
        };

        let removed = self.devices.remove(index);
        if let Err(e) = self.save() {
            self.devices.insert(index, removed);
            return Err(e);
        }
        info!("Removed {} from whitelist", device_id);
        Ok(true)
    }

    /// Write the list to disk (temp file then rename)
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(&self.devices)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            Error::Storage(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let whitelist = Whitelist::load(dir.path().join("whitelist.json"));
        assert!(whitelist.is_empty());
    }

    #[test]
    fn test_add_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut whitelist = Whitelist::load(dir.path().join("whitelist.json"));

        assert!(whitelist.add("1921:21863:4C53", "SanDisk Cruzer").unwrap());
        assert!(!whitelist.add("1921:21863:4C53", "Renamed").unwrap());
        assert_eq!(whitelist.len(), 1);
        assert_eq!(whitelist.get("1921:21863:4C53").unwrap().name, "SanDisk Cruzer");
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut whitelist = Whitelist::load(dir.path().join("whitelist.json"));
        whitelist.add("1:2:", "Device 1:2").unwrap();

        assert!(whitelist.remove("1:2:").unwrap());
        assert!(!whitelist.remove("1:2:").unwrap());
        assert!(!whitelist.contains("1:2:"));
    }

    #[test]
    fn test_persisted_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("whitelist.json");

        let mut whitelist = Whitelist::load(&path);
        whitelist.add("1:2:A", "First").unwrap();
        whitelist.add("3:4:", "Second").unwrap();

        let reloaded = Whitelist::load(&path);
        assert_eq!(reloaded.devices(), whitelist.devices());
    }

    #[test]
    fn test_json_field_names() {
        let device = WhitelistedDevice {
            id: "1:2:".to_string(),
            name: "Device 1:2".to_string(),
            added_timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&device).unwrap();
        assert_eq!(
            json,
            r#"{"id":"1:2:","name":"Device 1:2","addedTimestamp":1700000000000}"#
        );
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.json");
        fs::write(&path, "{not json").unwrap();

        let whitelist = Whitelist::load(&path);
        assert!(whitelist.is_empty());
    }

    #[test]
    fn test_failed_save_leaves_list_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let mut whitelist = Whitelist::load(blocker.join("whitelist.json"));
        assert!(whitelist.add("1:2:", "Device 1:2").is_err());
        assert!(whitelist.is_empty());
        assert!(!whitelist.contains("1:2:"));
    }

    #[test]
    fn test_failed_remove_keeps_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.json");
        let mut whitelist = Whitelist::load(&path);
        whitelist.add("1:2:", "Device 1:2").unwrap();

        // A directory at the temp path makes the write fail
        fs::create_dir(path.with_extension("json.tmp")).unwrap();
        assert!(whitelist.remove("1:2:").is_err());
        assert!(whitelist.contains("1:2:"));
    }
}
