use anyhow::{Context, Result};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::runtime::Runtime;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading,
    Completed,
    Error,
}

/// One locally saved video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEntry {
    pub id: String,
    pub title: String,
    pub poster: Option<String>,
    pub file_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle_path: Option<PathBuf>,
    pub url: String,
    pub status: DownloadStatus,
    pub progress: f64,
    pub error: Option<String>,
    pub created_at: u64,
}

/// `manifest.json` inside the downloads directory.
pub struct Manifest<R: Runtime> {
    runtime: Arc<R>,
    path: PathBuf,
}

impl<R: Runtime> Manifest<R> {
    pub fn new(runtime: Arc<R>, dir: &Path) -> Self {
        Self {
            runtime,
            path: dir.join(MANIFEST_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the entries; a missing file is an empty list.
    ///
    /// A file that does not parse is copied aside to
    /// `manifest.json.corrupt-<epoch ms>` and treated as empty.
    pub fn load(&self) -> Vec<DownloadEntry> {
        if !self.runtime.exists(&self.path) {
            return Vec::new();
        }

        let parsed = self
            .runtime
            .read_to_string(&self.path)
            .and_then(|content| {
                serde_json::from_str::<Vec<DownloadEntry>>(&content)
                    .context("Failed to parse download manifest")
            });

        match parsed {
            Ok(entries) => entries,
            Err(e) => {
                error!("{:#}", e);
                self.back_up_corrupt();
                Vec::new()
            }
        }
    }

    pub fn save(&self, entries: &[DownloadEntry]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        self.runtime
            .write(&self.path, json.as_bytes())
            .with_context(|| format!("Failed to write {:?}", self.path))
    }

    fn back_up_corrupt(&self) {
        let mut name: OsString = self.path.clone().into_os_string();
        name.push(format!(".corrupt-{}", now_millis()));
        let backup = PathBuf::from(name);

        match self.runtime.copy(&self.path, &backup) {
            Ok(_) => warn!("Corrupted manifest backed up to {:?}", backup),
            Err(e) => error!("Failed to back up corrupted manifest: {:#}", e),
        }
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
