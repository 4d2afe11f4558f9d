use anyhow::{Result, anyhow};
use std::str::FromStr;

/// Repository that publishes the desktop releases.
#[derive(Debug, PartialEq, Clone)]
pub struct GitHubRepo {
    pub owner: String,
    pub repo: String,
}

impl GitHubRepo {
    /// The upstream P-Stream Desktop repository.
    pub fn pstream_desktop() -> Self {
        Self {
            owner: "p-stream".to_string(),
            repo: "p-stream-desktop".to_string(),
        }
    }

    /// URL of the "latest release" resource under `api_url`.
    pub fn latest_release_url(&self, api_url: &str) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            api_url.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }
}

impl std::fmt::Display for GitHubRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for GitHubRepo {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            Err(anyhow!("Invalid repository format. Expected 'owner/repo'."))
        } else {
            Ok(GitHubRepo {
                owner: parts[0].to_string(),
                repo: parts[1].to_string(),
            })
        }
    }
}
