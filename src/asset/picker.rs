use crate::github::ReleaseAsset;

use super::platform::{ARCH_TAGS, Platform};

/// Trait for selecting an asset from a list of available assets
pub trait AssetPicker: Send + Sync {
    /// Pick the most appropriate asset from the given list
    ///
    /// Returns `None` if no suitable asset is found
    fn pick<'a>(&self, assets: &'a [ReleaseAsset]) -> Option<&'a ReleaseAsset>;
}

/// Picks the installer published for a platform.
///
/// In order of preference: the right extension with the running arch tag,
/// the right extension with no arch tag (universal build), then the first
/// asset with the right extension.
pub struct InstallerAssetPicker {
    platform: Platform,
}

impl InstallerAssetPicker {
    pub fn new() -> Self {
        Self {
            platform: Platform::detect(),
        }
    }

    pub fn with_platform(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }
}

impl Default for InstallerAssetPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetPicker for InstallerAssetPicker {
    fn pick<'a>(&self, assets: &'a [ReleaseAsset]) -> Option<&'a ReleaseAsset> {
        select_asset(assets, &self.platform)
    }
}

/// The installer in `assets` for `platform`, if any.
pub fn select_asset<'a>(assets: &'a [ReleaseAsset], platform: &Platform) -> Option<&'a ReleaseAsset> {
    let extension = platform.installer_extension()?;

    let candidates: Vec<(&ReleaseAsset, String)> = assets
        .iter()
        .map(|a| (a, a.name.to_lowercase()))
        .filter(|(_, name)| name.ends_with(extension))
        .collect();

    if let Some(tag) = platform.arch_tag() {
        if let Some((asset, _)) = candidates.iter().find(|(_, name)| name.contains(tag)) {
            return Some(asset);
        }
    }

    if let Some((asset, _)) = candidates
        .iter()
        .find(|(_, name)| !ARCH_TAGS.iter().any(|tag| name.contains(tag)))
    {
        return Some(asset);
    }

    candidates.first().map(|(asset, _)| *asset)
}
