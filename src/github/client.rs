use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use std::time::Duration;

use super::repo::GitHubRepo;
use super::types::Release;
use crate::http::HttpClient;

/// Default GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Timeout for each release metadata request.
///
/// A stalled server is reported after `MAX_RETRIES` timeouts and the pauses
/// between them, about 17 s with the defaults.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GetLatestRelease: Send + Sync {
    /// Fetches the latest published release.
    async fn latest_release(&self) -> Result<Release>;
}

pub struct GitHub {
    http: HttpClient,
    api_url: String,
    repo: GitHubRepo,
    token: Option<String>,
    timeout: Duration,
}

impl GitHub {
    #[tracing::instrument(skip(http, api_url, token))]
    pub fn new(
        http: HttpClient,
        repo: GitHubRepo,
        api_url: Option<String>,
        token: Option<String>,
    ) -> Self {
        let api_url = api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self {
            http,
            api_url,
            repo,
            token,
            timeout: METADATA_TIMEOUT,
        }
    }

    /// Overrides [`METADATA_TIMEOUT`] for each attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));

        if let Some(token) = &self.token {
            let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("GITHUB_TOKEN contains invalid header characters")?;
            auth_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth_value);
        }

        Ok(headers)
    }
}

#[async_trait]
impl GetLatestRelease for GitHub {
    #[tracing::instrument(skip(self))]
    async fn latest_release(&self) -> Result<Release> {
        let url = self.repo.latest_release_url(&self.api_url);
        debug!("Fetching latest release from {}...", url);

        self.http
            .get_json::<Release>(&url, self.headers()?, self.timeout)
            .await
            .with_context(|| format!("Failed to fetch the latest release of {}", self.repo))
    }
}
