//! GitHub releases API access.

mod client;
mod repo;
mod types;

pub use client::{DEFAULT_API_URL, GetLatestRelease, GitHub, METADATA_TIMEOUT};
pub use repo::GitHubRepo;
pub use types::{Release, ReleaseAsset};

#[cfg(test)]
pub use client::MockGetLatestRelease;
