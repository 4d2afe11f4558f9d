//! Performs HTTP requests on behalf of the embedded page.
//!
//! The page cannot read cross-origin responses itself, so it hands a
//! [`RelayRequest`] over IPC and gets back status, headers, final URL and a
//! decoded body. Session cookies are only exposed for a fixed set of
//! streaming hosts.

use anyhow::{Context, Result};
use log::debug;
use reqwest::cookie::CookieStore;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::multipart::Form;
use reqwest::{Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreError;
use crate::http::{HttpClient, check_retryable};

/// Upper bound for one relayed request, including the body.
pub const RELAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Hosts (and their subdomains) whose session cookies may be reflected.
const COOKIE_HOSTS: [&str; 11] = [
    "ee3.me",
    "rips.cc",
    "m4ufree.tv",
    "m4ufree.to",
    "m4ufree.pw",
    "goojara.to",
    "levidia.ch",
    "wootly.ch",
    "multimovies.sbs",
    "multimovies.online",
    "multimovies.cloud",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum BodyType {
    FormData,
    URLSearchParams,
    #[serde(rename = "object")]
    Object,
    #[serde(rename = "string")]
    String,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub query: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_type: Option<BodyType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub final_url: String,
    pub body: Value,
}

pub struct RequestRelay {
    http: HttpClient,
    cookies: Arc<dyn CookieStore>,
}

impl RequestRelay {
    /// `cookies` must be the jar the client was built with.
    pub fn new(http: HttpClient, cookies: Arc<dyn CookieStore>) -> Self {
        Self { http, cookies }
    }

    #[tracing::instrument(skip(self, request), fields(url = %request.url))]
    pub async fn relay(&self, request: RelayRequest) -> Result<RelayResponse> {
        let url = build_url(&request)?;
        let method = parse_method(request.method.as_deref())?;
        debug!("Relaying {} {}", method, url);

        let mut builder = self
            .http
            .inner()
            .request(method.clone(), url)
            .timeout(RELAY_TIMEOUT)
            .headers(request_headers(&request.headers)?);

        if method != Method::GET && method != Method::HEAD {
            if let Some(body) = &request.body {
                builder = attach_body(builder, body, request.body_type)?;
            }
        }

        let response = builder
            .send()
            .await
            .map_err(check_retryable)
            .context("Relay request failed")?;

        let status_code = response.status().as_u16();
        let final_url = response.url().clone();
        let mut headers = collect_headers(response.headers());

        let is_json = headers
            .get("content-type")
            .is_some_and(|ct| ct.contains("application/json"));

        let body = if is_json {
            let text = response.text().await.context("Failed to read relay body")?;
            serde_json::from_str(&text).map_err(|e| CoreError::Parse(e.to_string()))?
        } else {
            Value::String(response.text().await.context("Failed to read relay body")?)
        };

        reflect_cookies(&mut headers, &final_url, self.cookies.as_ref());

        Ok(RelayResponse {
            status_code,
            headers,
            final_url: final_url.to_string(),
            body,
        })
    }
}

/// Joins `baseUrl` and `url` with exactly one `/` and appends the query pairs.
pub fn build_url(request: &RelayRequest) -> Result<Url> {
    if request.url.is_empty() {
        return Err(CoreError::Validation("No url".into()).into());
    }

    let mut left = request.base_url.clone().unwrap_or_default();
    if !left.is_empty() && !left.ends_with('/') {
        left.push('/');
    }
    let right = request.url.strip_prefix('/').unwrap_or(&request.url);
    let full = format!("{}{}", left, right);

    let mut url = Url::parse(&full)
        .map_err(|e| CoreError::Validation(format!("Invalid url '{}': {}", full, e)))?;

    if !request.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &request.query {
            pairs.append_pair(key, &value_to_string(value));
        }
    }

    Ok(url)
}

fn parse_method(method: Option<&str>) -> Result<Method> {
    let method = method.unwrap_or("GET").to_ascii_uppercase();
    Method::from_bytes(method.as_bytes())
        .map_err(|_| CoreError::Validation(format!("Invalid method '{}'", method)).into())
}

fn request_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| CoreError::Validation(format!("Invalid header name '{}'", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| CoreError::Validation(format!("Invalid value for header {}", name)))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn attach_body(
    builder: RequestBuilder,
    body: &Value,
    body_type: Option<BodyType>,
) -> Result<RequestBuilder> {
    Ok(match body_type {
        Some(BodyType::FormData) => {
            let form = form_pairs(body)
                .into_iter()
                .fold(Form::new(), |form, (key, value)| form.text(key, value));
            builder.multipart(form)
        }
        Some(BodyType::URLSearchParams) => match body {
            Value::String(raw) => builder
                .header(
                    CONTENT_TYPE,
                    "application/x-www-form-urlencoded;charset=UTF-8",
                )
                .body(raw.strip_prefix('?').unwrap_or(raw).to_string()),
            other => builder.form(&form_pairs(other)),
        },
        Some(BodyType::Object) => builder.body(serde_json::to_string(body)?),
        Some(BodyType::String) | Some(BodyType::Unknown) | None => match body {
            Value::Null => builder,
            Value::String(raw) => builder.body(raw.clone()),
            other => builder.body(other.to_string()),
        },
    })
}

/// Key/value pairs from an object or an array of `[key, value]` pairs.
fn form_pairs(body: &Value) -> Vec<(String, String)> {
    match body {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item.as_array()?.as_slice() {
                [key, value, ..] => Some((value_to_string(key), value_to_string(value))),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Lower-cased names; repeated headers are joined with `, `.
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    collected
}

pub fn is_cookie_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    COOKIE_HOSTS.iter().any(|allowed| {
        host == *allowed
            || host
                .strip_suffix(allowed)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Adds `Set-Cookie` and credential headers for trusted hosts only.
pub fn reflect_cookies(
    headers: &mut BTreeMap<String, String>,
    final_url: &Url,
    cookies: &dyn CookieStore,
) {
    if !final_url.host_str().is_some_and(is_cookie_host) {
        return;
    }

    // The jar yields a Cookie header: "a=1; b=2"
    let joined = cookies
        .cookies(final_url)
        .map(|value| {
            String::from_utf8_lossy(value.as_bytes())
                .split(';')
                .map(str::trim)
                .filter(|pair| !pair.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    headers.insert("Set-Cookie".to_string(), joined);
    headers.insert(
        "Access-Control-Allow-Credentials".to_string(),
        "true".to_string(),
    );
}
