//! Retry logic for network operations with error classification.

use log::{debug, warn};
use reqwest::StatusCode;

use crate::error::CoreError;

/// Maximum number of attempts for retryable network operations.
pub const MAX_RETRIES: usize = 3;

/// Delay between retry attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Classifies a reqwest error.
/// Returns Ok(()) if the error is worth retrying, Err with the classified failure if not.
pub fn classify_error(error: &reqwest::Error) -> Result<(), CoreError> {
    if error.is_redirect() {
        return Err(CoreError::Network(format!(
            "Too many redirects while fetching {}",
            error.url().map(|u| u.as_str()).unwrap_or("<unknown>")
        )));
    }

    if let Some(status) = error.status() {
        match status {
            StatusCode::UNAUTHORIZED => {
                return Err(CoreError::Forbidden(
                    "Invalid or missing authentication token".to_string(),
                ));
            }
            StatusCode::FORBIDDEN => {
                return Err(CoreError::Forbidden(
                    "Access to this resource is forbidden".to_string(),
                ));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(CoreError::Forbidden("Too many requests".to_string()));
            }
            StatusCode::NOT_FOUND => {
                return Err(CoreError::NotFound(
                    "The requested resource was not found".to_string(),
                ));
            }
            // Other 4xx client errors are generally not retryable
            s if s.is_client_error() => {
                return Err(CoreError::ClientError(format!("HTTP {} error", s.as_u16())));
            }
            // 5xx server errors are retryable
            _ => {}
        }
    }

    // Connection errors, timeouts, etc. are retryable
    Ok(())
}

/// Converts an error from `error_for_status()` or `send()` into an anyhow error,
/// attaching a [`CoreError`] when it must not be retried.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(classified) => anyhow::Error::from(classified),
    }
}

/// Returns true unless the error was already classified as permanent.
pub fn is_retryable_error(e: &anyhow::Error) -> bool {
    CoreError::find(e).is_none()
}

/// Executes an async operation, retrying transient failures.
pub async fn with_retry<F, Fut, T>(operation_name: &str, operation: F) -> anyhow::Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let mut last_error = None;

    for attempt in 1..=MAX_RETRIES {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_retryable_error(&e) {
                    debug!("{}: non-retryable error: {}", operation_name, e);
                    return Err(e);
                }

                if attempt < MAX_RETRIES {
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                        operation_name, attempt, MAX_RETRIES, e, RETRY_DELAY_MS
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        anyhow::anyhow!("{}: failed after {} attempts", operation_name, MAX_RETRIES)
    }))
}
