use log::{error, info, warn};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Host, failure, success, unknown_channel};
use crate::download::Downloader;
use crate::github::GetLatestRelease;
use crate::platform::InstallOutcome;
use crate::runtime::Runtime;
use crate::settings::{SettingsStore, stream_page_url};
use crate::update::{AutoUpdateOutcome, Updater};

pub const SETTINGS_CHANNELS: [&str; 20] = [
    "get-discord-rpc-enabled",
    "set-discord-rpc-enabled",
    "get-stream-url",
    "set-stream-url",
    "get-app-version",
    "check-for-updates",
    "download-update",
    "is-update-downloaded",
    "install-update",
    "reset-app",
    "uninstall-app",
    "get-warp-enabled",
    "get-warp-status",
    "set-warp-enabled",
    "get-warp-launch-enabled",
    "set-warp-launch-enabled",
    "get-hardware-acceleration",
    "set-hardware-acceleration",
    "restart-app",
    "reload-stream-page",
];

const MANUAL_REMOVAL_MESSAGE: &str =
    "App data cleared. Please manually remove the app using your system's standard method.";

/// Dispatcher for the settings window.
pub struct SettingsBridge<R: Runtime, G: GetLatestRelease, D: Downloader> {
    settings: Arc<SettingsStore<R>>,
    updater: Arc<Updater<G, D>>,
    host: Arc<dyn Host>,
    warp_proxy: String,
    warp_enabled: AtomicBool,
}

impl<R: Runtime, G: GetLatestRelease, D: Downloader> SettingsBridge<R, G, D> {
    pub fn new(
        settings: Arc<SettingsStore<R>>,
        updater: Arc<Updater<G, D>>,
        host: Arc<dyn Host>,
        warp_proxy: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            updater,
            host,
            warp_proxy: warp_proxy.into(),
            warp_enabled: AtomicBool::new(false),
        }
    }

    pub fn is_allowed(channel: &str) -> bool {
        SETTINGS_CHANNELS.contains(&channel)
    }

    pub fn warp_enabled(&self) -> bool {
        self.warp_enabled.load(Ordering::SeqCst)
    }

    /// Applies settings that act at startup (currently the WARP proxy).
    pub async fn apply_launch_settings(&self) {
        if self.settings.warp_launch_enabled() {
            let reply = self.set_warp_enabled(true).await;
            if reply["success"] != true {
                warn!("WARP auto-enable failed: {}", reply["error"]);
            }
        }
    }

    #[tracing::instrument(skip(self, arg))]
    pub async fn handle(&self, channel: &str, arg: Value) -> Value {
        match channel {
            "get-discord-rpc-enabled" => json!(self.settings.discord_rpc_enabled()),
            "set-discord-rpc-enabled" => {
                let enabled = arg.as_bool().unwrap_or(false);
                self.persist(self.settings.set_discord_rpc_enabled(enabled), || {
                    self.host.set_discord_rpc_enabled(enabled)
                })
            }
            "get-stream-url" => json!(self.settings.stream_url()),
            "set-stream-url" => self.set_stream_url(&arg),
            "get-app-version" => json!(self.updater.current_version()),
            "check-for-updates" => json!(self.updater.check().await),
            "download-update" => self.download_update().await,
            "is-update-downloaded" => json!(self.updater.is_update_downloaded().await),
            "install-update" => self.install_update().await,
            "reset-app" => self.reset_app().await,
            "uninstall-app" => self.uninstall_app().await,
            "get-warp-enabled" => json!(self.warp_enabled()),
            "get-warp-status" => self.warp_status(),
            "set-warp-enabled" => self.set_warp_enabled(arg.as_bool().unwrap_or(false)).await,
            "get-warp-launch-enabled" => json!(self.settings.warp_launch_enabled()),
            "set-warp-launch-enabled" => self.persist(
                self.settings
                    .set_warp_launch_enabled(arg.as_bool().unwrap_or(false)),
                || {},
            ),
            "get-hardware-acceleration" => json!(self.settings.hardware_acceleration()),
            "set-hardware-acceleration" => self.persist(
                self.settings
                    .set_hardware_acceleration(arg.as_bool().unwrap_or(true)),
                || {},
            ),
            "restart-app" => {
                info!("Restarting application...");
                self.host.relaunch();
                success()
            }
            "reload-stream-page" => self.reload_stream_page(),
            other => {
                warn!("Rejected settings message on {}", other);
                unknown_channel(other)
            }
        }
    }

    /// `true` once saved, `false` (logged) when the write failed.
    fn persist(&self, saved: anyhow::Result<()>, then: impl FnOnce()) -> Value {
        match saved {
            Ok(()) => {
                then();
                json!(true)
            }
            Err(e) => {
                error!("Failed to save setting: {:#}", e);
                json!(false)
            }
        }
    }

    fn set_stream_url(&self, arg: &Value) -> Value {
        let Some(url) = arg.as_str() else {
            return failure("URL cannot be empty");
        };

        match self.settings.set_stream_url(url) {
            Ok(normalized) => {
                if let Err(e) = self.host.load_url(&stream_page_url(&normalized)) {
                    warn!("Failed to load the new stream URL: {:#}", e);
                }
                json!(true)
            }
            Err(e) => failure(e),
        }
    }

    async fn download_update(&self) -> Value {
        let host = self.host.clone();
        let on_progress = Box::new(move |percent: u8| host.update_download_progress(percent));

        match self.updater.download_update(on_progress).await {
            Ok(path) => json!({ "success": true, "path": path }),
            Err(e) => {
                error!("Update download failed: {:#}", e);
                failure(e)
            }
        }
    }

    async fn install_update(&self) -> Value {
        if self.updater.is_update_downloaded().await {
            return match self.updater.install_update().await {
                Ok(InstallOutcome::QuitHost) => {
                    self.host.quit();
                    json!({ "updateInstalling": true })
                }
                Ok(InstallOutcome::ManualActionRequired) => json!({ "updateInstalling": true }),
                Err(e) => json!({ "updateInstalling": false, "error": e.to_string() }),
            };
        }

        let host = self.host.clone();
        let on_progress = Box::new(move |percent: u8| host.update_download_progress(percent));
        match self.updater.auto_update(on_progress).await {
            AutoUpdateOutcome::QuitForInstall => {
                self.host.quit();
                json!({ "updateInstalling": true })
            }
            AutoUpdateOutcome::ManualInstall(_) => json!({ "updateInstalling": true }),
            AutoUpdateOutcome::Skipped => json!({
                "updateInstalling": false,
                "error": "Update is not available in development mode"
            }),
            AutoUpdateOutcome::Offline(message) | AutoUpdateOutcome::Failed(message) => {
                json!({ "updateInstalling": false, "error": message })
            }
            AutoUpdateOutcome::UpToDate | AutoUpdateOutcome::NoInstaller => {
                json!({ "updateInstalling": false })
            }
        }
    }

    async fn clear_app_data(&self) -> anyhow::Result<()> {
        self.settings.clear()?;
        self.host.clear_browsing_data().await
    }

    async fn reset_app(&self) -> Value {
        if let Err(e) = self.clear_app_data().await {
            error!("Error resetting app: {:#}", e);
            return failure(e);
        }

        if let Err(e) = self.host.load_url(&self.settings.stream_page_url()) {
            warn!("Failed to reload the stream page: {:#}", e);
        }
        success()
    }

    /// Loads the configured stream page again, e.g. after WARP was turned on.
    fn reload_stream_page(&self) -> Value {
        match self.host.load_url(&self.settings.stream_page_url()) {
            Ok(()) => success(),
            Err(e) => {
                warn!("Failed to reload the stream page: {:#}", e);
                failure(e)
            }
        }
    }

    async fn uninstall_app(&self) -> Value {
        if let Err(e) = self.clear_app_data().await {
            // Keep going; the app itself can still be removed
            error!("Error clearing app data during uninstall: {:#}", e);
        }

        let message = match self.host.install_location() {
            Some(location) => match self.updater.shell().move_to_trash(&location) {
                Ok(()) => {
                    info!("Moved {:?} to trash", location);
                    "App moved to trash.".to_string()
                }
                Err(e) => {
                    warn!("Failed to move {:?} to trash: {:#}", location, e);
                    MANUAL_REMOVAL_MESSAGE.to_string()
                }
            },
            None => MANUAL_REMOVAL_MESSAGE.to_string(),
        };

        self.host.quit();
        json!({ "success": true, "message": message })
    }

    fn warp_status(&self) -> Value {
        if self.warp_enabled() {
            json!({ "enabled": true, "proxy": self.warp_proxy })
        } else {
            json!({ "enabled": false })
        }
    }

    async fn set_warp_enabled(&self, enabled: bool) -> Value {
        let proxy = enabled.then(|| self.warp_proxy.clone());

        match self.host.set_proxy(proxy).await {
            Ok(()) => {
                self.warp_enabled.store(enabled, Ordering::SeqCst);
                if enabled {
                    json!({ "success": true, "proxy": self.warp_proxy })
                } else {
                    success()
                }
            }
            Err(e) => {
                error!("Failed to toggle WARP proxy: {:#}", e);
                failure(e)
            }
        }
    }
}
