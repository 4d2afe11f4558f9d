use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot};

use super::manifest::{DownloadEntry, DownloadStatus, Manifest, now_millis};
use super::transcoder::{TranscodeJob, Transcoder};
use crate::error::CoreError;
use crate::runtime::Runtime;

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_SUBTITLE_BYTES: usize = 5 * 1024 * 1024;

/// Message the page sees for any failed download; details stay in the manifest.
pub const PAGE_ERROR_MESSAGE: &str = "Download failed. Please try again.";

const INVALID_REQUEST: &str = "Invalid download request.";
const EVENT_CAPACITY: usize = 64;

/// Payload of the page's `startDownload` call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub subtitle_text: Option<String>,
    #[serde(default, deserialize_with = "finite_number")]
    pub duration: Option<f64>,
    #[serde(default, rename = "type")]
    pub stream_type: Option<String>,
}

/// Anything that is not a finite number becomes `None`.
fn finite_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().filter(|n| n.is_finite()))
}

/// Pushed to the page while downloads run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DownloadEvent {
    Progress { id: String, progress: f64 },
    Complete { id: String },
    Error { id: String, error: String },
}

impl DownloadEvent {
    /// Page-side channel name.
    pub fn channel(&self) -> &'static str {
        match self {
            DownloadEvent::Progress { .. } => "download-progress",
            DownloadEvent::Complete { .. } => "download-complete",
            DownloadEvent::Error { .. } => "download-error",
        }
    }
}

/// `<title>_<id prefix>.mp4` with the title reduced to `[a-z0-9_]`.
pub fn output_file_name(title: &str, id: &str) -> String {
    let safe: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(50)
        .collect();
    let prefix: String = id.chars().take(8).collect();
    format!("{}_{}.mp4", safe, prefix)
}

fn is_http_url(value: &str) -> bool {
    reqwest::Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

fn is_hls(request: &DownloadRequest) -> bool {
    request.url.contains(".m3u8")
        || request.url.contains("m3u8-proxy")
        || request.stream_type.as_deref() == Some("hls")
}

struct Shared<R: Runtime> {
    manifest: Manifest<R>,
    entries: Mutex<Vec<DownloadEntry>>,
    active: Mutex<HashMap<String, oneshot::Sender<()>>>,
    events: broadcast::Sender<DownloadEvent>,
}

impl<R: Runtime> Shared<R> {
    fn entries(&self) -> MutexGuard<'_, Vec<DownloadEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<()>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, entries: &[DownloadEntry]) {
        if let Err(e) = self.manifest.save(entries) {
            error!("Failed to save download manifest: {:#}", e);
        }
    }

    fn emit(&self, event: DownloadEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_progress(&self, id: &str, percent: f64) {
        let progress = percent.min(100.0);
        let mut entries = self.entries();
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.progress = progress;
            drop(entries);
            self.emit(DownloadEvent::Progress {
                id: id.to_string(),
                progress,
            });
        }
    }

    /// Returns false when the entry was deleted while running.
    fn finish(&self, id: &str, result: Result<()>) -> bool {
        self.active().remove(id);

        let mut entries = self.entries();
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            return false;
        };

        let event = match result {
            Ok(()) => {
                info!("Download {} completed", id);
                entry.status = DownloadStatus::Completed;
                entry.progress = 100.0;
                DownloadEvent::Complete { id: id.to_string() }
            }
            Err(e) => {
                error!("Download error for {}: {:#}", id, e);
                entry.status = DownloadStatus::Error;
                entry.error = Some(format!("{:#}", e));
                DownloadEvent::Error {
                    id: id.to_string(),
                    error: PAGE_ERROR_MESSAGE.to_string(),
                }
            }
        };

        self.save(&entries);
        drop(entries);
        self.emit(event);
        true
    }
}

fn remove_files<R: Runtime>(runtime: &R, entry: &DownloadEntry) {
    for path in std::iter::once(&entry.file_path).chain(entry.subtitle_path.as_ref()) {
        if runtime.exists(path) {
            if let Err(e) = runtime.remove_file(path) {
                warn!("Failed to delete {:?}: {:#}", path, e);
            }
        }
    }
}

/// Saves remote streams as local MP4 files and tracks them in the manifest.
pub struct DownloadManager<R: Runtime, T: Transcoder> {
    runtime: Arc<R>,
    dir: PathBuf,
    transcoder: Arc<T>,
    shared: Arc<Shared<R>>,
}

impl<R: Runtime + 'static, T: Transcoder + 'static> DownloadManager<R, T> {
    /// Creates `dir` if needed and loads its manifest.
    ///
    /// Entries left in `downloading` by a previous run are marked as failed.
    pub fn open(runtime: Arc<R>, dir: &Path, transcoder: T) -> Result<Self> {
        runtime
            .create_dir_all(dir)
            .with_context(|| format!("Failed to create downloads directory {:?}", dir))?;

        let manifest = Manifest::new(runtime.clone(), dir);
        let mut entries = manifest.load();

        let mut interrupted = 0;
        for entry in entries
            .iter_mut()
            .filter(|e| e.status == DownloadStatus::Downloading)
        {
            entry.status = DownloadStatus::Error;
            entry.error = Some("Interrupted before completion".to_string());
            interrupted += 1;
        }
        if interrupted > 0 {
            warn!("Marked {} interrupted download(s) as failed", interrupted);
            if let Err(e) = manifest.save(&entries) {
                error!("Failed to save download manifest: {:#}", e);
            }
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            runtime,
            dir: dir.to_path_buf(),
            transcoder: Arc::new(transcoder),
            shared: Arc::new(Shared {
                manifest,
                entries: Mutex::new(entries),
                active: Mutex::new(HashMap::new()),
                events,
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.shared.events.subscribe()
    }

    /// Newest first.
    pub fn list(&self) -> Vec<DownloadEntry> {
        self.shared.entries().clone()
    }

    /// Validates the request, records it and starts the transcoder.
    ///
    /// Must be called inside a tokio runtime. Returns the new entry's id.
    #[tracing::instrument(skip(self, request), fields(url = %request.url))]
    pub fn start(&self, mut request: DownloadRequest) -> Result<String> {
        self.validate(&mut request)?;

        let id = uuid::Uuid::new_v4().to_string();
        // Absent titles read "Video"; an empty one is shown as "Unknown Title"
        let title = match request.title.as_deref() {
            Some(t) => t.chars().take(MAX_TITLE_LENGTH).collect::<String>(),
            None => "Video".to_string(),
        };
        let file_name_title = if title.is_empty() { "Video" } else { title.as_str() };
        let file_path = self.dir.join(output_file_name(file_name_title, &id));

        let subtitle_path = match request.subtitle_text.as_deref() {
            Some(text) if !text.is_empty() => {
                let path = self.dir.join(format!("{}.srt", id));
                self.runtime
                    .write(&path, text.as_bytes())
                    .context("Failed to write subtitles")?;
                Some(path)
            }
            _ => None,
        };

        let entry = DownloadEntry {
            id: id.clone(),
            title: if title.is_empty() {
                "Unknown Title".to_string()
            } else {
                title
            },
            poster: request.poster.clone(),
            file_path: file_path.clone(),
            subtitle_path,
            url: request.url.clone(),
            status: DownloadStatus::Downloading,
            progress: 0.0,
            error: None,
            created_at: now_millis(),
        };

        {
            let mut entries = self.shared.entries();
            entries.insert(0, entry.clone());
            self.shared.save(&entries);
        }

        let job = TranscodeJob {
            url: request.url.clone(),
            output: file_path,
            hls: is_hls(&request),
            duration: request.duration,
        };
        self.spawn(entry, job);

        info!("Started download {}", id);
        Ok(id)
    }

    fn validate(&self, request: &mut DownloadRequest) -> Result<()> {
        if request.url.is_empty() || !is_http_url(&request.url) {
            return Err(CoreError::Validation(INVALID_REQUEST.into()).into());
        }

        if let Some(poster) = &request.poster {
            if !is_http_url(poster) && !poster.starts_with("data:image/") {
                debug!("Dropping poster with unsupported scheme");
                request.poster = None;
            }
        }
        if request.poster.as_deref() == Some("") {
            request.poster = None;
        }

        if request
            .subtitle_text
            .as_ref()
            .is_some_and(|text| text.len() > MAX_SUBTITLE_BYTES)
        {
            return Err(CoreError::Validation(INVALID_REQUEST.into()).into());
        }

        Ok(())
    }

    fn spawn(&self, entry: DownloadEntry, job: TranscodeJob) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.shared.active().insert(entry.id.clone(), cancel_tx);

        let shared = self.shared.clone();
        let runtime = self.runtime.clone();
        let transcoder = self.transcoder.clone();
        tokio::spawn(async move {
            let progress_shared = shared.clone();
            let progress_id = entry.id.clone();
            let on_progress = Box::new(move |percent: f64| {
                progress_shared.set_progress(&progress_id, percent);
            });

            let result = transcoder.transcode(job, on_progress, cancel_rx).await;
            // ffmpeg has exited, so files of a deleted entry stay deleted
            if !shared.finish(&entry.id, result) {
                debug!("Removing files of deleted download {}", entry.id);
                remove_files(runtime.as_ref(), &entry);
            }
        });
    }

    /// Stops a running transcode, removes its files and forgets the entry.
    ///
    /// Files of a running transcode are removed by its task once ffmpeg has
    /// stopped. Returns false when no entry has this id.
    #[tracing::instrument(skip(self))]
    pub fn delete(&self, id: &str) -> bool {
        let mut entries = self.shared.entries();
        let Some(index) = entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = entries.remove(index);

        match self.shared.active().remove(id) {
            Some(cancel) => {
                let _ = cancel.send(());
            }
            None => remove_files(self.runtime.as_ref(), &entry),
        }

        self.shared.save(&entries);
        true
    }
}
