//! Runtime configuration and the on-disk config store
//!
//! The config file is a flat JSON string map at the platform's user
//! application-support directory. Readers tolerate anything: a missing or
//! corrupt file is simply an empty map.

use crate::error::{BridgeError, BridgeResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const KEY_RESTAURANT_ID: &str = "restaurantId";
pub const KEY_DEVICE_NAME: &str = "deviceName";
pub const KEY_FIREBASE_PROJECT_ID: &str = "firebaseProjectId";
pub const KEY_UPDATED_AT: &str = "updatedAt";

/// Directory override, used by tests to keep config writes out of $HOME
pub const CONFIG_DIR_ENV: &str = "PRINT_BRIDGE_CONFIG_DIR";

/// Snapshot of the bridge's mutable runtime configuration
///
/// Cloud pollers receive a clone at construction time and never observe
/// later changes; the supervisor swaps the poller instead.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub restaurant_id: String,
    pub device_name: String,
    pub cloud_project_id: String,
}

impl RuntimeConfig {
    /// Merge CLI/env values over what the config file holds
    pub fn from_sources(
        saved: &BTreeMap<String, String>,
        restaurant_id: Option<String>,
        device_name: Option<String>,
        cloud_project_id: Option<String>,
    ) -> Self {
        let from_file = |key: &str| saved.get(key).cloned().unwrap_or_default();
        Self {
            restaurant_id: restaurant_id.unwrap_or_else(|| from_file(KEY_RESTAURANT_ID)),
            device_name: device_name.unwrap_or_else(|| from_file(KEY_DEVICE_NAME)),
            cloud_project_id: cloud_project_id
                .unwrap_or_else(|| from_file(KEY_FIREBASE_PROJECT_ID)),
        }
    }
}

/// Persistent key/value store backing `RuntimeConfig` across restarts
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform's application-support directory
    pub fn from_default_location() -> Self {
        let dir = std::env::var(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .ok()
            .or_else(dirs::config_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir.join("print-bridge").join("config.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored map; missing or undecodable files yield an empty map
    pub fn load(&self) -> BTreeMap<String, String> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_slice(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Config file unreadable, treating as empty");
                BTreeMap::new()
            }
        }
    }

    /// Persist the map, stamping `updatedAt`
    pub fn save(&self, map: &BTreeMap<String, String>) -> BridgeResult<()> {
        let mut map = map.clone();
        map.insert(
            KEY_UPDATED_AT.to_string(),
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        );

        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_vec_pretty(&map)?;
            std::fs::write(&self.path, json)
        };

        write().map_err(|e| BridgeError::ConfigWrite(e.to_string()))?;
        debug!(path = %self.path.display(), "Config saved");
        Ok(())
    }

    /// Best-effort removal of the config file
    pub fn clear(&self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "Failed to remove config file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("nested").join("config.json"))
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_in(&dir).load().is_empty());
    }

    #[test]
    fn round_trip_preserves_keys_and_stamps_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut map = BTreeMap::new();
        map.insert(KEY_RESTAURANT_ID.to_string(), "rest-42".to_string());
        map.insert(KEY_DEVICE_NAME.to_string(), "Front Counter".to_string());
        store.save(&map).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.get(KEY_RESTAURANT_ID).unwrap(), "rest-42");
        assert_eq!(loaded.get(KEY_DEVICE_NAME).unwrap(), "Front Counter");
        // updatedAt is stamped on every save
        let stamp = loaded.get(KEY_UPDATED_AT).unwrap();
        assert!(stamp.ends_with('Z'), "not an ISO-8601 UTC stamp: {stamp}");
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), b"{not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn clear_removes_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .save(&BTreeMap::from([(
                KEY_RESTAURANT_ID.to_string(),
                "rest-42".to_string(),
            )]))
            .unwrap();
        store.clear();
        assert!(store.load().is_empty());
        store.clear();
    }

    #[test]
    fn runtime_config_prefers_explicit_values() {
        let saved = BTreeMap::from([
            (KEY_RESTAURANT_ID.to_string(), "from-file".to_string()),
            (KEY_DEVICE_NAME.to_string(), "File Device".to_string()),
        ]);
        let cfg = RuntimeConfig::from_sources(&saved, Some("from-flag".into()), None, None);
        assert_eq!(cfg.restaurant_id, "from-flag");
        assert_eq!(cfg.device_name, "File Device");
        assert_eq!(cfg.cloud_project_id, "");
    }
}
