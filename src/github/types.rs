use serde::{Deserialize, Serialize};

/// Represents a GitHub release asset
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// Represents a GitHub release
///
/// Every field is optional on the wire; a release without a `tag_name` is
/// treated as "no release published".
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, Default)]
pub struct Release {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Tag with a leading `v` removed, if the release has a usable tag.
    pub fn version(&self) -> Option<&str> {
        self.tag_name
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(crate::version::strip_v)
    }
}
