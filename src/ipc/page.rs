use anyhow::Result;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};

use super::{Host, failure, success, unknown_channel};
use crate::downloads::{DownloadManager, DownloadRequest, Transcoder};
use crate::error::CoreError;
use crate::relay::{RelayRequest, RequestRelay};
use crate::rules::{ActiveRule, HeaderRule, SharedRules};
use crate::runtime::Runtime;

/// Version the page expects from the browser-extension protocol.
pub const BRIDGE_VERSION: &str = "1.3.7";

pub const PAGE_CHANNELS: [&str; 9] = [
    "hello",
    "makeRequest",
    "prepareStream",
    "openPage",
    "updateMediaMetadata",
    "startDownload",
    "getDownloads",
    "deleteDownload",
    "openOfflineApp",
];

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub poster: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackProgress {
    #[serde(default)]
    pub current_time: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub playback_state: Option<String>,
}

/// What the page is currently playing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MediaUpdate {
    #[serde(default)]
    pub metadata: Option<MediaMetadata>,
    #[serde(default)]
    pub progress: Option<PlaybackProgress>,
}

/// Dispatcher for messages posted by the embedded page.
pub struct PageBridge<R: Runtime, T: Transcoder> {
    relay: RequestRelay,
    rules: SharedRules,
    downloads: Arc<DownloadManager<R, T>>,
    host: Arc<dyn Host>,
    media: Mutex<Option<MediaUpdate>>,
}

impl<R: Runtime + 'static, T: Transcoder + 'static> PageBridge<R, T> {
    pub fn new(
        relay: RequestRelay,
        rules: SharedRules,
        downloads: Arc<DownloadManager<R, T>>,
        host: Arc<dyn Host>,
    ) -> Self {
        Self {
            relay,
            rules,
            downloads,
            host,
            media: Mutex::new(None),
        }
    }

    pub fn is_allowed(channel: &str) -> bool {
        PAGE_CHANNELS.contains(&channel)
    }

    /// Last metadata reported by `updateMediaMetadata`.
    pub fn media(&self) -> Option<MediaUpdate> {
        self.media
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[tracing::instrument(skip(self, body))]
    pub async fn handle(&self, channel: &str, body: Value) -> Value {
        match channel {
            "hello" => json!({
                "success": true,
                "version": BRIDGE_VERSION,
                "type": "desktop",
                "allowed": true,
                "hasPermission": true,
            }),
            "makeRequest" => self.make_request(body).await,
            "prepareStream" => match self.prepare_stream(body) {
                Ok(()) => success(),
                Err(e) => {
                    error!("prepareStream error: {:#}", e);
                    failure(e)
                }
            },
            "openPage" => {
                debug!("Request to openPage: {}", body);
                success()
            }
            "updateMediaMetadata" => {
                self.update_media(body);
                success()
            }
            "startDownload" => self.start_download(body),
            "getDownloads" => json!(self.downloads.list()),
            "deleteDownload" => {
                let id = body
                    .as_str()
                    .or_else(|| body.get("id").and_then(Value::as_str))
                    .unwrap_or_default();
                json!({ "success": self.downloads.delete(id) })
            }
            "openOfflineApp" => match self.host.open_offline_app() {
                Ok(()) => success(),
                Err(e) => failure(e),
            },
            other => {
                warn!("Rejected page message on {}", other);
                unknown_channel(other)
            }
        }
    }

    async fn make_request(&self, body: Value) -> Value {
        let request = match serde_json::from_value::<RelayRequest>(body) {
            Ok(request) => request,
            Err(e) => return failure(CoreError::Validation(e.to_string())),
        };

        match self.relay.relay(request).await {
            Ok(response) => json!({ "success": true, "response": response }),
            Err(e) => {
                error!("makeRequest error: {:#}", e);
                failure(e)
            }
        }
    }

    /// Upserts the rule in `body`, after removing any `removeRuleIds`.
    ///
    /// An invalid rule leaves the store untouched.
    fn prepare_stream(&self, body: Value) -> Result<()> {
        if !body.is_object() {
            return Err(CoreError::Validation("No body".into()).into());
        }

        let removals: Vec<String> = body
            .get("removeRuleIds")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .map(|id| match id {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let rule = if body.get("ruleId").is_some() {
            let rule: HeaderRule = serde_json::from_value(body)
                .map_err(|e| CoreError::Validation(format!("Invalid rule: {}", e)))?;
            Some(ActiveRule::new(rule)?)
        } else if removals.is_empty() {
            return Err(CoreError::Validation("Missing ruleId".into()).into());
        } else {
            None
        };

        let mut store = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        for id in &removals {
            store.remove(id);
        }
        if let Some(rule) = rule {
            store.insert(rule);
        }
        Ok(())
    }

    fn update_media(&self, body: Value) {
        match serde_json::from_value::<MediaUpdate>(body) {
            Ok(update) => {
                *self.media.lock().unwrap_or_else(PoisonError::into_inner) = Some(update);
            }
            Err(e) => debug!("Ignoring malformed media update: {}", e),
        }
    }

    fn start_download(&self, body: Value) -> Value {
        let request = match serde_json::from_value::<DownloadRequest>(body) {
            Ok(request) => request,
            Err(_) => return failure("Invalid download request."),
        };

        match self.downloads.start(request) {
            Ok(id) => json!({ "success": true, "id": id }),
            Err(e) => {
                warn!("startDownload rejected: {:#}", e);
                let message = match CoreError::find(&e) {
                    Some(CoreError::Validation(msg)) => msg.clone(),
                    _ => e.to_string(),
                };
                failure(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloads::MockTranscoder;
    use crate::http::HttpClient;
    use crate::ipc::MockHost;
    use crate::rules::RuleStore;
    use crate::runtime::RealRuntime;
    use reqwest::cookie::Jar;
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        bridge: PageBridge<RealRuntime, MockTranscoder>,
        rules: SharedRules,
        _dir: TempDir,
    }

    fn fixture(host: MockHost, transcoder: MockTranscoder) -> Fixture {
        let dir = tempdir().unwrap();
        let jar = Arc::new(Jar::default());
        let relay = RequestRelay::new(HttpClient::build("test", Some(jar.clone())).unwrap(), jar);
        let rules = RuleStore::shared();
        let downloads = Arc::new(
            DownloadManager::open(Arc::new(RealRuntime), dir.path(), transcoder).unwrap(),
        );
        Fixture {
            bridge: PageBridge::new(relay, rules.clone(), downloads, Arc::new(host)),
            rules,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_hello() {
        let f = fixture(MockHost::new(), MockTranscoder::new());
        let reply = f.bridge.handle("hello", Value::Null).await;

        assert_eq!(
            reply,
            json!({
                "success": true,
                "version": "1.3.7",
                "type": "desktop",
                "allowed": true,
                "hasPermission": true
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_channel_is_rejected() {
        let f = fixture(MockHost::new(), MockTranscoder::new());
        let reply = f.bridge.handle("get-stream-url", Value::Null).await;

        assert_eq!(reply["success"], false);
        assert_eq!(reply["error"], "Unknown channel: get-stream-url");
        assert!(!PageBridge::<RealRuntime, MockTranscoder>::is_allowed("get-stream-url"));
    }

    #[tokio::test]
    async fn test_prepare_stream_stores_filtered_rule() {
        let f = fixture(MockHost::new(), MockTranscoder::new());
        let reply = f
            .bridge
            .handle(
                "prepareStream",
                json!({
                    "ruleId": 3,
                    "targetDomains": ["cdn.example.com"],
                    "responseHeaders": {"Access-Control-Allow-Origin": "*", "Server": "x"}
                }),
            )
            .await;

        assert_eq!(reply, json!({"success": true}));
        let store = f.rules.read().unwrap();
        let rule = store.get("3").unwrap();
        assert_eq!(rule.response_headers.len(), 1);
    }

    #[tokio::test]
    async fn test_prepare_stream_remove_rule_ids() {
        let f = fixture(MockHost::new(), MockTranscoder::new());
        f.bridge
            .handle("prepareStream", json!({"ruleId": 1, "targetDomains": ["a"]}))
            .await;
        f.bridge
            .handle("prepareStream", json!({"ruleId": "2", "targetDomains": ["b"]}))
            .await;

        let reply = f
            .bridge
            .handle("prepareStream", json!({"removeRuleIds": [1, "2"]}))
            .await;

        assert_eq!(reply["success"], true);
        assert!(f.rules.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_stream_failures() {
        let f = fixture(MockHost::new(), MockTranscoder::new());

        for body in [Value::Null, json!({"targetDomains": ["a"]}), json!({"ruleId": 1, "targetRegex": "["})] {
            let reply = f.bridge.handle("prepareStream", body).await;
            assert_eq!(reply["success"], false);
        }
        assert!(f.rules.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_stream_invalid_rule_keeps_existing_rules() {
        let f = fixture(MockHost::new(), MockTranscoder::new());
        f.bridge
            .handle("prepareStream", json!({"ruleId": "old", "targetDomains": ["a"]}))
            .await;

        let reply = f
            .bridge
            .handle(
                "prepareStream",
                json!({"ruleId": "new", "targetRegex": "(", "removeRuleIds": ["old"]}),
            )
            .await;

        assert_eq!(reply["success"], false);
        let store = f.rules.read().unwrap();
        assert!(store.get("old").is_some());
        assert!(store.get("new").is_none());
    }

    #[tokio::test]
    async fn test_prepare_stream_accepts_null_fields() {
        let f = fixture(MockHost::new(), MockTranscoder::new());
        let reply = f
            .bridge
            .handle(
                "prepareStream",
                json!({
                    "ruleId": 9,
                    "targetDomains": ["example.com"],
                    "requestHeaders": null,
                    "responseHeaders": {"Access-Control-Allow-Origin": null}
                }),
            )
            .await;

        assert_eq!(reply, json!({"success": true}));
        assert!(f.rules.read().unwrap().get("9").is_some());
    }

    #[tokio::test]
    async fn test_make_request_failure_is_structured() {
        let f = fixture(MockHost::new(), MockTranscoder::new());
        let reply = f
            .bridge
            .handle("makeRequest", json!({"url": "/no-base"}))
            .await;

        assert_eq!(reply["success"], false);
        assert!(reply["error"].as_str().unwrap().contains("Invalid"));
    }

    #[tokio::test]
    async fn test_make_request_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ping")
            .with_header("content-type", "application/json")
            .with_body(r#"{"pong":true}"#)
            .create_async()
            .await;

        let f = fixture(MockHost::new(), MockTranscoder::new());
        let reply = f
            .bridge
            .handle("makeRequest", json!({"url": "/ping", "baseUrl": server.url()}))
            .await;

        assert_eq!(reply["success"], true);
        assert_eq!(reply["response"]["statusCode"], 200);
        assert_eq!(reply["response"]["body"], json!({"pong": true}));
        assert!(reply["response"]["finalUrl"].as_str().unwrap().ends_with("/ping"));
    }

    #[tokio::test]
    async fn test_download_channels() {
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_transcode().returning(|_, _, _| Ok(()));
        let f = fixture(MockHost::new(), transcoder);

        let reply = f
            .bridge
            .handle("startDownload", json!({"url": "ftp://nope"}))
            .await;
        assert_eq!(reply, json!({"success": false, "error": "Invalid download request."}));

        let reply = f
            .bridge
            .handle(
                "startDownload",
                json!({"url": "https://cdn.example.com/v.mp4", "title": "Clip"}),
            )
            .await;
        assert_eq!(reply["success"], true);
        let id = reply["id"].as_str().unwrap().to_string();

        let list = f.bridge.handle("getDownloads", Value::Null).await;
        assert_eq!(list[0]["id"], id.as_str());
        assert_eq!(list[0]["title"], "Clip");

        let reply = f.bridge.handle("deleteDownload", json!(id)).await;
        assert_eq!(reply, json!({"success": true}));
        let reply = f.bridge.handle("deleteDownload", json!({"id": id})).await;
        assert_eq!(reply, json!({"success": false}));
    }

    #[tokio::test]
    async fn test_media_metadata_is_stored() {
        let f = fixture(MockHost::new(), MockTranscoder::new());
        f.bridge
            .handle(
                "updateMediaMetadata",
                json!({
                    "metadata": {"title": "Dune", "artist": null, "poster": null},
                    "progress": {"currentTime": 12.0, "duration": 9000.0, "isPlaying": true}
                }),
            )
            .await;

        let media = f.bridge.media().unwrap();
        assert_eq!(media.metadata.unwrap().title.as_deref(), Some("Dune"));
        assert!(media.progress.unwrap().is_playing);
    }

    #[tokio::test]
    async fn test_open_offline_app_uses_host() {
        let mut host = MockHost::new();
        host.expect_open_offline_app().times(1).returning(|| Ok(()));
        let f = fixture(host, MockTranscoder::new());

        assert_eq!(
            f.bridge.handle("openOfflineApp", Value::Null).await,
            json!({"success": true})
        );
    }
}
