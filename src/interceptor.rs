//! Applies stored header rules to the embedded page's traffic.

use log::{debug, warn};
use reqwest::Url;
use reqwest::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, HeaderMap, HeaderName, HeaderValue,
};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLockReadGuard};

use crate::rules::{ActiveRule, RuleStore, SharedRules};

pub const FORCED_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, PATCH, OPTIONS";

pub struct HeaderInterceptor {
    rules: SharedRules,
}

impl HeaderInterceptor {
    pub fn new(rules: SharedRules) -> Self {
        Self { rules }
    }

    fn store(&self) -> RwLockReadGuard<'_, RuleStore> {
        self.rules.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merges the request headers of every matching rule into `headers`.
    pub fn on_before_send_headers(&self, url: &str, headers: &mut HeaderMap) {
        let store = self.store();
        for rule in matching_rules(&store, url) {
            apply_headers(headers, &rule.rule().request_headers);
        }
    }

    /// Rewrites response headers when any rule matches `url`.
    ///
    /// Returns whether the headers were touched.
    pub fn on_headers_received(&self, url: &str, headers: &mut HeaderMap) -> bool {
        let store = self.store();
        let matched = matching_rules(&store, url);
        if matched.is_empty() {
            return false;
        }

        debug!("{} rule(s) match {}", matched.len(), url);
        for rule in &matched {
            apply_headers(headers, &rule.rule().response_headers);
        }

        headers.remove(ACCESS_CONTROL_ALLOW_CREDENTIALS);
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(FORCED_ALLOW_METHODS),
        );
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
        true
    }
}

fn matching_rules<'a>(store: &'a RuleStore, url: &str) -> Vec<&'a ActiveRule> {
    let Ok(parsed) = Url::parse(url) else {
        return Vec::new();
    };
    let hostname = parsed.host_str().unwrap_or_default();
    store.iter().filter(|rule| rule.matches(url, hostname)).collect()
}

/// `HeaderMap::insert` replaces every existing value of the name.
fn apply_headers(headers: &mut HeaderMap, values: &BTreeMap<String, String>) {
    for (name, value) in values {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("Skipping invalid header {}: {:?}", name, value),
        }
    }
}
