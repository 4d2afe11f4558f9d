//! HTTP client with bounded redirects, retry logic and streaming downloads.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use log::debug;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::{Client, cookie::Jar};
use serde::de::DeserializeOwned;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use super::retry::{check_retryable, with_retry};
use crate::error::CoreError;

/// Maximum number of redirect hops followed before a request fails.
pub const MAX_REDIRECTS: usize = 5;

/// Connect timeout for every request made by the host.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client shared by the updater and the request relay.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client with the redirect cap and an optional session cookie jar.
    pub fn build(user_agent: &str, cookie_jar: Option<Arc<Jar>>) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(jar) = cookie_jar {
            builder = builder.cookie_provider(jar);
        }

        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Performs a GET request and deserializes the JSON response.
    /// Transient errors are retried; each attempt is bounded by `timeout`.
    #[tracing::instrument(skip(self, headers))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<T> {
        debug!("GET JSON from {}...", url);

        with_retry("GET JSON", || {
            let request = self
                .client
                .get(url)
                .headers(headers.clone())
                .timeout(timeout);
            async move {
                let response = request.send().await.map_err(check_retryable)?;
                let response = response.error_for_status().map_err(check_retryable)?;

                let text = response
                    .text()
                    .await
                    .context("Failed to read response body")?;

                serde_json::from_str::<T>(&text)
                    .map_err(|e| anyhow::Error::from(CoreError::Parse(e.to_string())))
            }
        })
        .await
    }

    /// Streams the body at `url` into `writer`.
    ///
    /// `on_progress` receives a rounded percentage after every chunk, but only
    /// when the server sent a positive `Content-Length`.
    #[tracing::instrument(skip(self, writer, on_progress))]
    pub async fn download_file<W, P>(&self, url: &str, writer: &mut W, mut on_progress: P) -> Result<u64>
    where
        W: Write + ?Sized,
        P: FnMut(u8),
    {
        debug!("Downloading file from {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(check_retryable)
            .context("Failed to start download request")?;

        let response = response.error_for_status().map_err(check_retryable)?;

        let total = response.content_length().filter(|len| *len > 0);
        let mut downloaded_bytes: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read chunk from download stream")?;
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;

            if let Some(total) = total {
                on_progress(percent(downloaded_bytes, total));
            }
        }

        writer.flush().context("Failed to flush downloaded file")?;

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(downloaded_bytes)
    }
}

fn percent(received: u64, total: u64) -> u8 {
    let value = (received as f64 / total as f64 * 100.0).round();
    value.clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> HttpClient {
        HttpClient::build("pstream-test", None).unwrap()
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent(0, 200), 0);
        assert_eq!(percent(1, 200), 1); // 0.5 rounds away from zero
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(200, 200), 100);
        assert_eq!(percent(300, 200), 100);
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "test", "value": 42}"#)
            .create_async()
            .await;

        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct TestResponse {
            name: String,
            value: i32,
        }

        let result: TestResponse = test_client()
            .get_json(
                &format!("{}/test", url),
                HeaderMap::new(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            result,
            TestResponse {
                name: "test".into(),
                value: 42
            }
        );
    }

    #[tokio::test]
    async fn test_get_json_not_found_is_classified() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/test")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let result: Result<serde_json::Value> = test_client()
            .get_json(
                &format!("{}/test", url),
                HeaderMap::new(),
                Duration::from_secs(5),
            )
            .await;

        mock.assert_async().await;
        let err = result.unwrap_err();
        assert!(matches!(CoreError::find(&err), Some(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_json_malformed_body_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let _mock = server
            .mock("GET", "/test")
            .with_status(200)
            .with_body("{not json")
            .create_async()
            .await;

        let result: Result<serde_json::Value> = test_client()
            .get_json(
                &format!("{}/test", url),
                HeaderMap::new(),
                Duration::from_secs(5),
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(CoreError::find(&err), Some(CoreError::Parse(_))));
    }

    #[tokio::test]
    async fn test_get_json_follows_redirect() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let _redirect = server
            .mock("GET", "/old")
            .with_status(302)
            .with_header("location", &format!("{}/new", url))
            .create_async()
            .await;
        let _target = server
            .mock("GET", "/new")
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let value: serde_json::Value = test_client()
            .get_json(
                &format!("{}/old", url),
                HeaderMap::new(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_redirect_loop_is_capped() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let _loop = server
            .mock("GET", "/loop")
            .with_status(302)
            .with_header("location", &format!("{}/loop", url))
            .create_async()
            .await;

        let result: Result<serde_json::Value> = test_client()
            .get_json(
                &format!("{}/loop", url),
                HeaderMap::new(),
                Duration::from_secs(5),
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(CoreError::find(&err), Some(CoreError::Network(_))));
    }

    #[tokio::test]
    async fn test_download_file_reports_progress() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/file.bin")
            .with_status(200)
            .with_body("test content")
            .create_async()
            .await;

        let mut sink = Vec::new();
        let mut reports = Vec::new();
        let bytes = test_client()
            .download_file(&format!("{}/file.bin", url), &mut sink, |p| {
                reports.push(p)
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bytes, 12);
        assert_eq!(sink, b"test content");
        assert_eq!(reports.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_download_file_not_found() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/file.bin")
            .with_status(404)
            .create_async()
            .await;

        let mut sink = Vec::new();
        let result = test_client()
            .download_file(&format!("{}/file.bin", url), &mut sink, |_| {})
            .await;

        mock.assert_async().await;
        assert!(result.is_err());
        assert!(sink.is_empty());
    }
}
