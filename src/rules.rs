//! In-memory header rules registered by the embedded page.

use anyhow::Result;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::CoreError;

/// Response headers a rule is allowed to rewrite.
pub const MODIFIABLE_RESPONSE_HEADERS: [&str; 6] = [
    "access-control-allow-origin",
    "access-control-allow-methods",
    "access-control-allow-headers",
    "content-security-policy",
    "content-security-policy-report-only",
    "content-disposition",
];

/// A header rewrite rule as sent by the page's `prepareStream` call.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderRule {
    #[serde(deserialize_with = "deserialize_rule_id")]
    pub rule_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub target_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_regex: Option<String>,
    #[serde(default, deserialize_with = "header_values")]
    pub request_headers: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "header_values")]
    pub response_headers: BTreeMap<String, String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Header maps may be `null`; scalar values are stringified and `null` values dropped.
fn header_values<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, Value> = null_as_default(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(name, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((name, text)),
            other => Some((name, other.to_string())),
        })
        .collect())
}

/// Accepts `"ruleId": 7` as well as `"ruleId": "7"`.
fn deserialize_rule_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RuleId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RuleId::deserialize(deserializer)? {
        RuleId::Text(id) => id,
        RuleId::Number(id) => id.to_string(),
    })
}

/// A stored rule with its regex compiled once.
#[derive(Debug, Clone)]
pub struct ActiveRule {
    rule: HeaderRule,
    regex: Option<Regex>,
}

impl ActiveRule {
    /// Response headers outside [`MODIFIABLE_RESPONSE_HEADERS`] are dropped.
    /// An invalid `targetRegex` rejects the whole rule.
    pub fn new(mut rule: HeaderRule) -> Result<Self> {
        let regex = rule
            .target_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| CoreError::Validation(format!("Invalid targetRegex: {}", e)))?;

        rule.response_headers.retain(|name, _| {
            let name = name.to_ascii_lowercase();
            MODIFIABLE_RESPONSE_HEADERS.contains(&name.as_str())
        });

        Ok(Self { rule, regex })
    }

    pub fn rule(&self) -> &HeaderRule {
        &self.rule
    }

    /// True when the host contains a target domain or the URL matches the regex.
    pub fn matches(&self, url: &str, hostname: &str) -> bool {
        self.rule
            .target_domains
            .iter()
            .any(|domain| hostname.contains(domain.as_str()))
            || self.regex.as_ref().is_some_and(|re| re.is_match(url))
    }
}

#[derive(Debug, Default)]
pub struct RuleStore {
    rules: BTreeMap<String, ActiveRule>,
}

/// Rule store shared between the IPC layer and the interceptor.
pub type SharedRules = Arc<RwLock<RuleStore>>;

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRules {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Inserts or replaces the rule with the same id.
    pub fn upsert(&mut self, rule: HeaderRule) -> Result<()> {
        self.insert(ActiveRule::new(rule)?);
        Ok(())
    }

    pub fn insert(&mut self, active: ActiveRule) {
        let rule = &active.rule;
        debug!(
            "Storing rule {} for {:?} ({} request, {} response headers)",
            rule.rule_id,
            rule.target_domains,
            rule.request_headers.len(),
            rule.response_headers.len()
        );
        self.rules.insert(rule.rule_id.clone(), active);
    }

    pub fn remove(&mut self, rule_id: &str) -> bool {
        self.rules.remove(rule_id).is_some()
    }

    pub fn get(&self, rule_id: &str) -> Option<&HeaderRule> {
        self.rules.get(rule_id).map(ActiveRule::rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Rules in rule-id order.
    pub fn iter(&self) -> impl Iterator<Item = &ActiveRule> {
        self.rules.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(value: serde_json::Value) -> HeaderRule {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_rule_id_accepts_numbers_and_strings() {
        assert_eq!(rule(json!({"ruleId": 7})).rule_id, "7");
        assert_eq!(rule(json!({"ruleId": "r1"})).rule_id, "r1");
    }

    #[test]
    fn test_upsert_filters_response_headers() {
        let mut store = RuleStore::new();
        store
            .upsert(rule(json!({
                "ruleId": "r1",
                "targetDomains": ["example.com"],
                "responseHeaders": {
                    "Content-Disposition": "inline",
                    "X-Frame-Options": "ALLOW",
                    "set-cookie": "a=b"
                }
            })))
            .unwrap();

        let stored = store.get("r1").unwrap();
        assert_eq!(stored.response_headers.len(), 1);
        assert_eq!(stored.response_headers["Content-Disposition"], "inline");
    }

    #[test]
    fn test_upsert_replaces_same_id() {
        let mut store = RuleStore::new();
        store
            .upsert(rule(json!({"ruleId": 1, "targetDomains": ["a.com"]})))
            .unwrap();
        store
            .upsert(rule(json!({"ruleId": "1", "targetDomains": ["b.com"]})))
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("1").unwrap().target_domains, vec!["b.com"]);
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let mut store = RuleStore::new();
        let err = store
            .upsert(rule(json!({"ruleId": "bad", "targetRegex": "(unclosed"})))
            .unwrap_err();

        assert!(matches!(CoreError::find(&err), Some(CoreError::Validation(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_matches_domain_substring_or_regex() {
        let mut store = RuleStore::new();
        store
            .upsert(rule(json!({"ruleId": "a", "targetDomains": ["example.com"]})))
            .unwrap();
        store
            .upsert(rule(json!({"ruleId": "b", "targetRegex": "\\.m3u8$"})))
            .unwrap();

        let a = store.iter().next().unwrap();
        assert!(a.matches("https://video.example.com/x", "video.example.com"));
        assert!(!a.matches("https://other.org/x", "other.org"));

        let b = store.iter().nth(1).unwrap();
        assert!(b.matches("https://cdn.net/index.m3u8", "cdn.net"));
        assert!(!b.matches("https://cdn.net/index.mp4", "cdn.net"));
    }

    #[test]
    fn test_iteration_is_ordered_by_id_and_remove() {
        let mut store = RuleStore::new();
        for id in ["c", "a", "b"] {
            store.upsert(rule(json!({"ruleId": id}))).unwrap();
        }

        let ids: Vec<_> = store.iter().map(|r| r.rule().rule_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        assert!(store.remove("b"));
        assert!(!store.remove("b"));
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_null_fields_and_scalar_header_values() {
        let parsed = rule(json!({
            "ruleId": 1,
            "targetDomains": null,
            "targetRegex": null,
            "requestHeaders": {"X-Count": 5, "X-Flag": true, "X-Skip": null, "Referer": "https://a.b"},
            "responseHeaders": null
        }));

        assert!(parsed.target_domains.is_empty());
        assert!(parsed.target_regex.is_none());
        assert!(parsed.response_headers.is_empty());
        assert_eq!(parsed.request_headers.len(), 3);
        assert_eq!(parsed.request_headers["X-Count"], "5");
        assert_eq!(parsed.request_headers["X-Flag"], "true");
        assert_eq!(parsed.request_headers["Referer"], "https://a.b");

        let mut store = RuleStore::new();
        store.upsert(parsed).unwrap();
        assert_eq!(store.len(), 1);
    }
}
