//! Persisted user settings (`settings.json` in the data directory).

use anyhow::{Context, Result};
use log::error;
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::CoreError;
use crate::runtime::Runtime;

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_STREAM_URL: &str = "pstream.mov";

pub const DISCORD_RPC_ENABLED: &str = "discordRPCEnabled";
pub const STREAM_URL: &str = "streamUrl";
pub const WARP_LAUNCH_ENABLED: &str = "warpLaunchEnabled";
pub const HARDWARE_ACCELERATION: &str = "hardwareAcceleration";

pub fn default_settings() -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert(DISCORD_RPC_ENABLED.into(), json!(true));
    defaults.insert(STREAM_URL.into(), json!(DEFAULT_STREAM_URL));
    defaults.insert(WARP_LAUNCH_ENABLED.into(), json!(false));
    defaults.insert(HARDWARE_ACCELERATION.into(), json!(true));
    defaults
}

/// Full page URL for a stored stream address (`https://host/` if no scheme).
pub fn stream_page_url(stream_url: &str) -> String {
    if stream_url.starts_with("http://") || stream_url.starts_with("https://") {
        stream_url.to_string()
    } else {
        format!("https://{}/", stream_url)
    }
}

/// Flat JSON key/value store with defaults merged under stored values.
pub struct SettingsStore<R: Runtime> {
    runtime: Arc<R>,
    path: PathBuf,
    defaults: Map<String, Value>,
    data: RwLock<Map<String, Value>>,
}

impl<R: Runtime> SettingsStore<R> {
    /// Loads `path`; unreadable or malformed files fall back to `defaults`.
    #[tracing::instrument(skip(runtime, defaults))]
    pub fn load(runtime: Arc<R>, path: &Path, defaults: Map<String, Value>) -> Self {
        let mut data = defaults.clone();

        if runtime.exists(path) {
            let stored = runtime.read_to_string(path).and_then(|content| {
                serde_json::from_str::<Map<String, Value>>(&content)
                    .context("Settings file is not a JSON object")
            });
            match stored {
                Ok(stored) => data.extend(stored),
                Err(e) => error!("Error loading settings: {:#}", e),
            }
        }

        Self {
            runtime,
            path: path.to_path_buf(),
            defaults,
            data: RwLock::new(data),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, Map<String, Value>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Map<String, Value>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, data: &Map<String, Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        self.runtime
            .write(&self.path, json.as_bytes())
            .context("Error saving settings")
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    pub fn all(&self) -> Map<String, Value> {
        self.read().clone()
    }

    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut data = self.write();
        data.insert(key.to_string(), value);
        self.save(&data)
    }

    pub fn has(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let mut data = self.write();
        data.remove(key);
        self.save(&data)
    }

    /// Resets to the defaults and persists them.
    pub fn clear(&self) -> Result<()> {
        let mut data = self.write();
        *data = self.defaults.clone();
        self.save(&data)
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn discord_rpc_enabled(&self) -> bool {
        self.get_bool(DISCORD_RPC_ENABLED, true)
    }

    pub fn set_discord_rpc_enabled(&self, enabled: bool) -> Result<()> {
        self.set(DISCORD_RPC_ENABLED, Value::Bool(enabled))
    }

    pub fn warp_launch_enabled(&self) -> bool {
        self.get_bool(WARP_LAUNCH_ENABLED, false)
    }

    pub fn set_warp_launch_enabled(&self, enabled: bool) -> Result<()> {
        self.set(WARP_LAUNCH_ENABLED, Value::Bool(enabled))
    }

    pub fn hardware_acceleration(&self) -> bool {
        self.get_bool(HARDWARE_ACCELERATION, true)
    }

    pub fn set_hardware_acceleration(&self, enabled: bool) -> Result<()> {
        self.set(HARDWARE_ACCELERATION, Value::Bool(enabled))
    }

    pub fn stream_url(&self) -> String {
        self.get(STREAM_URL)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string())
    }

    /// Trims, drops one trailing `/` and stores the address.
    ///
    /// Returns the normalized value.
    pub fn set_stream_url(&self, url: &str) -> Result<String> {
        let trimmed = url.trim();
        let normalized = trimmed.strip_suffix('/').unwrap_or(trimmed);
        if normalized.is_empty() {
            return Err(CoreError::Validation("URL cannot be empty".into()).into());
        }

        self.set(STREAM_URL, Value::String(normalized.to_string()))?;
        Ok(normalized.to_string())
    }

    pub fn stream_page_url(&self) -> String {
        stream_page_url(&self.stream_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> SettingsStore<RealRuntime> {
        SettingsStore::load(
            Arc::new(RealRuntime),
            &dir.join(SETTINGS_FILE),
            default_settings(),
        )
    }

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        assert!(store.discord_rpc_enabled());
        assert!(!store.warp_launch_enabled());
        assert!(store.hardware_acceleration());
        assert_eq!(store.stream_url(), "pstream.mov");
        assert_eq!(store.stream_page_url(), "https://pstream.mov/");
    }

    #[test]
    fn test_stored_values_override_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"discordRPCEnabled": false, "custom": 3}"#,
        )
        .unwrap();

        let store = store_in(dir.path());
        assert!(!store.discord_rpc_enabled());
        assert_eq!(store.get("custom"), Some(json!(3)));
        assert_eq!(store.stream_url(), DEFAULT_STREAM_URL);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "[1, 2").unwrap();

        let store = store_in(dir.path());
        assert_eq!(store.all(), default_settings());
    }

    #[test]
    fn test_set_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.set_warp_launch_enabled(true).unwrap();
        store.set("volume", json!(0.5)).unwrap();

        let reloaded = store_in(dir.path());
        assert!(reloaded.warp_launch_enabled());
        assert!(reloaded.has("volume"));

        reloaded.delete("volume").unwrap();
        assert!(!store_in(dir.path()).has("volume"));
    }

    #[test]
    fn test_clear_restores_defaults() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.set_stream_url("example.org").unwrap();
        store.set("extra", json!("x")).unwrap();

        store.clear().unwrap();

        assert_eq!(store.stream_url(), DEFAULT_STREAM_URL);
        assert!(!store.has("extra"));
        assert_eq!(store_in(dir.path()).all(), default_settings());
    }

    #[test]
    fn test_set_stream_url_normalizes() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        assert_eq!(
            store.set_stream_url("  https://my.host/path/ ").unwrap(),
            "https://my.host/path"
        );
        assert_eq!(store.stream_page_url(), "https://my.host/path");

        assert_eq!(store.set_stream_url("mirror.tv//").unwrap(), "mirror.tv/");

        let err = store.set_stream_url("  / ").unwrap_err();
        assert!(matches!(CoreError::find(&err), Some(CoreError::Validation(_))));
        assert_eq!(store.stream_url(), "mirror.tv/");
    }

    #[test]
    fn test_save_failure_is_reported() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| false);
        runtime
            .expect_write()
            .returning(|_, _| Err(anyhow::anyhow!("disk full")));

        let store = SettingsStore::load(
            Arc::new(runtime),
            Path::new("/data/settings.json"),
            default_settings(),
        );

        assert!(store.set_discord_rpc_enabled(false).is_err());
    }
}
