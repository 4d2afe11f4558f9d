use crate::http::HttpClient;
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Progress callback receiving a 0..=100 percentage.
pub type ProgressFn = Box<dyn FnMut(u8) + Send>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Streams `url` to `destination` and returns the written path.
    ///
    /// On any failure the partially written destination is removed.
    async fn download(&self, url: &str, destination: &Path, on_progress: ProgressFn)
    -> Result<PathBuf>;
}

/// Downloader writing through the [`Runtime`] file abstraction.
pub struct HttpDownloader<R: Runtime> {
    runtime: Arc<R>,
    http_client: HttpClient,
}

impl<R: Runtime> HttpDownloader<R> {
    pub fn new(runtime: Arc<R>, http_client: HttpClient) -> Self {
        Self {
            runtime,
            http_client,
        }
    }

    pub fn http_client(&self) -> &HttpClient {
        &self.http_client
    }

    fn discard_partial(&self, destination: &Path) {
        if self.runtime.exists(destination) {
            if let Err(e) = self.runtime.remove_file(destination) {
                warn!(
                    "Failed to remove partial download {:?}: {}",
                    destination, e
                );
            }
        }
    }
}

#[async_trait]
impl<R: Runtime> Downloader for HttpDownloader<R> {
    #[tracing::instrument(skip(self, destination, on_progress))]
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        on_progress: ProgressFn,
    ) -> Result<PathBuf> {
        info!("Downloading {} to {:?}...", url, destination);

        let mut writer = self
            .runtime
            .create_file(destination)
            .with_context(|| format!("Failed to create download file at {:?}", destination))?;

        let result = self
            .http_client
            .download_file(url, &mut writer, on_progress)
            .await;

        // Close the handle before touching the file again
        drop(writer);

        match result {
            Ok(bytes) => {
                info!("Download complete ({} bytes).", bytes);
                Ok(destination.to_path_buf())
            }
            Err(e) => {
                self.discard_partial(destination);
                Err(e)
            }
        }
    }
}
