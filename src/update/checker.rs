use anyhow::{Context, Result};
use log::{debug, info};

use crate::github::{GetLatestRelease, Release};
use crate::version::{VersionComparator, VersionOrdering};

/// Result of comparing the running version with the latest release.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateCheck {
    /// The API answered but no tagged release exists.
    NoRelease,
    /// The latest release is the running version or older.
    UpToDate { latest: String },
    /// The latest release is strictly newer.
    Available { latest: String, release: Release },
}

impl UpdateCheck {
    pub fn is_available(&self) -> bool {
        matches!(self, UpdateCheck::Available { .. })
    }
}

/// Fetches the latest release and decides whether it is newer.
pub struct ReleaseChecker<G: GetLatestRelease> {
    github: G,
}

impl<G: GetLatestRelease> ReleaseChecker<G> {
    pub fn new(github: G) -> Self {
        Self { github }
    }

    #[tracing::instrument(skip(self))]
    pub async fn check_for_update(&self, current_version: &str) -> Result<UpdateCheck> {
        let release = self.github.latest_release().await?;

        let Some(latest) = release.version().map(str::to_string) else {
            info!("No release found");
            return Ok(UpdateCheck::NoRelease);
        };

        let ordering = VersionComparator::compare(current_version, &latest)
            .with_context(|| format!("Cannot compare {} with {}", current_version, latest))?;

        debug!(
            "Current: {}, Latest: {}, ordering: {:?}",
            current_version, latest, ordering
        );

        Ok(match ordering {
            VersionOrdering::Newer => {
                info!("Update available: {} -> {}", current_version, latest);
                UpdateCheck::Available { latest, release }
            }
            VersionOrdering::Equal | VersionOrdering::Older => UpdateCheck::UpToDate { latest },
        })
    }
}
