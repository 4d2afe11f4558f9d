use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::checker::{ReleaseChecker, UpdateCheck};
use crate::asset::AssetPicker;
use crate::download::{Downloader, ProgressFn};
use crate::error::CoreError;
use crate::github::{GetLatestRelease, Release, ReleaseAsset};
use crate::platform::{InstallOutcome, PlatformShell};

/// What the startup update pass did.
#[derive(Debug, Clone, PartialEq)]
pub enum AutoUpdateOutcome {
    /// Development build; nothing was checked.
    Skipped,
    /// No newer release (or none published).
    UpToDate,
    /// A newer release exists but has no installer for this platform.
    NoInstaller,
    /// The installer is running unattended; the host must quit now.
    QuitForInstall,
    /// The installer was opened for the user to finish by hand.
    ManualInstall(PathBuf),
    /// The update server could not be reached; the host should tell the user.
    Offline(String),
    /// Any other failure, already logged.
    Failed(String),
}

/// Update status reported to the settings UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReport {
    pub update_available: bool,
    pub current_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_development: bool,
}

/// Check → download → install pipeline for the desktop app itself.
pub struct Updater<G: GetLatestRelease, D: Downloader> {
    checker: ReleaseChecker<G>,
    downloader: D,
    picker: Box<dyn AssetPicker>,
    shell: Box<dyn PlatformShell>,
    download_dir: PathBuf,
    current_version: String,
    packaged: bool,
    downloaded: Mutex<Option<PathBuf>>,
}

impl<G: GetLatestRelease, D: Downloader> Updater<G, D> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        github: G,
        downloader: D,
        picker: Box<dyn AssetPicker>,
        shell: Box<dyn PlatformShell>,
        download_dir: PathBuf,
        current_version: impl Into<String>,
        packaged: bool,
    ) -> Self {
        Self {
            checker: ReleaseChecker::new(github),
            downloader,
            picker,
            shell,
            download_dir,
            current_version: current_version.into(),
            packaged,
            downloaded: Mutex::new(None),
        }
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn shell(&self) -> &dyn PlatformShell {
        self.shell.as_ref()
    }

    /// Manual check from the settings UI; failures become a user-facing message.
    #[tracing::instrument(skip(self))]
    pub async fn check(&self) -> UpdateReport {
        let mut report = UpdateReport {
            current_version: self.current_version.clone(),
            ..Default::default()
        };

        if !self.packaged {
            report.is_development = true;
            report.message =
                Some("Update checking is not available in development mode".to_string());
            return report;
        }

        match self.checker.check_for_update(&self.current_version).await {
            Ok(UpdateCheck::NoRelease) => {
                report.message = Some("No releases have been published yet.".to_string());
            }
            Ok(UpdateCheck::UpToDate { latest }) => {
                report.latest_version = Some(latest);
                report.message = Some("Already up to date".to_string());
            }
            Ok(UpdateCheck::Available { latest, release }) => {
                report.update_available = true;
                report.latest_version = Some(latest);
                report.release_url = release.html_url;
                report.release_name = release.name;
                report.release_notes = release.body;
            }
            Err(e) => {
                error!("Manual update check failed: {:#}", e);
                report.error = Some(CoreError::user_message(&e));
            }
        }

        report
    }

    /// Downloads the installer of the newer release to the download dir.
    #[tracing::instrument(skip(self, on_progress))]
    pub async fn download_update(&self, on_progress: ProgressFn) -> Result<PathBuf> {
        let release = match self.checker.check_for_update(&self.current_version).await? {
            UpdateCheck::Available { release, .. } => release,
            _ => {
                return Err(CoreError::NotFound("No newer release is available".into()).into());
            }
        };

        let asset = self.pick_installer(&release)?.clone();
        let path = self.fetch_installer(&asset, on_progress).await?;

        *self.downloaded.lock().await = Some(path.clone());
        Ok(path)
    }

    pub async fn is_update_downloaded(&self) -> bool {
        self.downloaded.lock().await.is_some()
    }

    /// Launches the installer fetched by [`Updater::download_update`].
    #[tracing::instrument(skip(self))]
    pub async fn install_update(&self) -> Result<InstallOutcome> {
        let path = self
            .downloaded
            .lock()
            .await
            .clone()
            .ok_or_else(|| CoreError::NotFound("No update has been downloaded".into()))?;

        self.shell.run_installer(&path)
    }

    /// Startup pass: install a newer release if one exists.
    ///
    /// Errors are logged and folded into the outcome; only connectivity
    /// failures are reported as [`AutoUpdateOutcome::Offline`].
    #[tracing::instrument(skip(self, on_progress))]
    pub async fn auto_update(&self, on_progress: ProgressFn) -> AutoUpdateOutcome {
        if !self.packaged {
            info!("Skipping update check in development mode");
            return AutoUpdateOutcome::Skipped;
        }

        match self.try_auto_update(on_progress).await {
            Ok(outcome) => outcome,
            Err(e) if CoreError::is_connectivity_failure(&e) => {
                warn!("Update server unreachable: {:#}", e);
                AutoUpdateOutcome::Offline(CoreError::user_message(&e))
            }
            Err(e) => {
                error!("Automatic update failed: {:#}", e);
                AutoUpdateOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_auto_update(&self, on_progress: ProgressFn) -> Result<AutoUpdateOutcome> {
        info!("Checking for updates...");

        let release = match self.checker.check_for_update(&self.current_version).await? {
            UpdateCheck::Available { release, .. } => release,
            UpdateCheck::NoRelease | UpdateCheck::UpToDate { .. } => {
                info!("Already up to date");
                return Ok(AutoUpdateOutcome::UpToDate);
            }
        };

        let Some(asset) = self.picker.pick(&release.assets) else {
            info!("No suitable installer found for this platform");
            return Ok(AutoUpdateOutcome::NoInstaller);
        };

        let path = self.fetch_installer(asset, on_progress).await?;
        *self.downloaded.lock().await = Some(path.clone());

        match self.shell.run_installer(&path)? {
            InstallOutcome::QuitHost => {
                info!("Installer launched, quitting app...");
                Ok(AutoUpdateOutcome::QuitForInstall)
            }
            InstallOutcome::ManualActionRequired => Ok(AutoUpdateOutcome::ManualInstall(path)),
        }
    }

    fn pick_installer<'a>(&self, release: &'a Release) -> Result<&'a ReleaseAsset> {
        self.picker.pick(&release.assets).ok_or_else(|| {
            CoreError::NotFound("No installer for this platform in the latest release".into())
                .into()
        })
    }

    async fn fetch_installer(&self, asset: &ReleaseAsset, on_progress: ProgressFn) -> Result<PathBuf> {
        // Asset names come from the network; never let them escape the download dir
        let file_name = Path::new(&asset.name)
            .file_name()
            .ok_or_else(|| CoreError::Validation(format!("Bad asset name '{}'", asset.name)))?;
        let destination = self.download_dir.join(file_name);

        info!("Downloading: {}", asset.name);
        self.downloader
            .download(&asset.browser_download_url, &destination, on_progress)
            .await
            .with_context(|| format!("Failed to download {}", asset.name))
    }
}
