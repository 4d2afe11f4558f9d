//! HTTP client module with bounded redirects, retry logic and error classification.

mod client;
mod retry;

pub use client::{CONNECT_TIMEOUT, HttpClient, MAX_REDIRECTS};
pub use retry::{MAX_RETRIES, RETRY_DELAY_MS, check_retryable, classify_error, with_retry};
