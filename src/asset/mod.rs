//! Asset selection module
//!
//! Picks the installer to download from a release based on the running
//! operating system and architecture.

mod picker;
mod platform;

pub use picker::{AssetPicker, InstallerAssetPicker, select_asset};
pub use platform::{ARCH_TAGS, Platform};
