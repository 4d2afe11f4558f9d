//! IPC dispatchers for the embedded page and the settings window.
//!
//! Both bridges take a channel name plus a JSON payload and always answer
//! with JSON: failures become `{"success": false, "error": "..."}` instead of
//! crossing the boundary as errors. Channels outside the allow-lists are
//! rejected.
//!
//! Side effects that belong to the window shell go through [`Host`].

mod page;
mod settings;

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use serde_json::{Value, json};
use std::path::PathBuf;

pub use page::{BRIDGE_VERSION, MediaUpdate, PAGE_CHANNELS, PageBridge};
pub use settings::{SETTINGS_CHANNELS, SettingsBridge};

/// Shell capabilities the core cannot perform itself.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Host: Send + Sync {
    /// Navigates the embedded view.
    fn load_url(&self, url: &str) -> Result<()>;
    fn set_discord_rpc_enabled(&self, enabled: bool);
    fn update_download_progress(&self, percent: u8);
    fn open_offline_app(&self) -> Result<()>;
    /// Installed app bundle or executable, when it can be located.
    fn install_location(&self) -> Option<PathBuf>;
    /// `None` clears the proxy.
    async fn set_proxy(&self, proxy: Option<String>) -> Result<()>;
    /// Cookies, local storage, caches.
    async fn clear_browsing_data(&self) -> Result<()>;
    fn relaunch(&self);
    fn quit(&self);
}

/// Host for running the core without a window; every action is only logged.
#[derive(Debug, Default)]
pub struct HeadlessHost;

#[async_trait]
impl Host for HeadlessHost {
    fn load_url(&self, url: &str) -> Result<()> {
        info!("Would load {}", url);
        Ok(())
    }

    fn set_discord_rpc_enabled(&self, enabled: bool) {
        info!("Discord RPC enabled: {}", enabled);
    }

    fn update_download_progress(&self, percent: u8) {
        info!("Update download: {}%", percent);
    }

    fn open_offline_app(&self) -> Result<()> {
        info!("Would open the offline app");
        Ok(())
    }

    fn install_location(&self) -> Option<PathBuf> {
        None
    }

    async fn set_proxy(&self, proxy: Option<String>) -> Result<()> {
        info!("Proxy: {:?}", proxy);
        Ok(())
    }

    async fn clear_browsing_data(&self) -> Result<()> {
        Ok(())
    }

    fn relaunch(&self) {
        info!("Relaunch requested");
    }

    fn quit(&self) {
        info!("Quit requested");
    }
}

pub(crate) fn success() -> Value {
    json!({ "success": true })
}

pub(crate) fn failure(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

pub(crate) fn unknown_channel(channel: &str) -> Value {
    failure(format!("Unknown channel: {}", channel))
}
