use anyhow::{Context, Result};
use log::debug;
use std::path::PathBuf;

use crate::github::GitHubRepo;
use crate::runtime::Runtime;

/// Version of this build, from the release tag when there is one.
pub const APP_VERSION: &str = env!("PSTREAM_VERSION");

/// User agent for requests to the update server.
pub const APP_USER_AGENT: &str = concat!("P-Stream-Desktop/", env!("PSTREAM_VERSION"));

/// User agent for requests relayed on behalf of the page.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";

/// Local SOCKS endpoint of the WARP client in proxy mode.
pub const DEFAULT_WARP_PROXY: &str = "socks5://127.0.0.1:40000";

const APP_DIR_NAME: &str = "P-Stream";
const UPDATE_DIR_NAME: &str = "p-stream-update";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub update_dir: PathBuf,
    pub api_url: Option<String>,
    pub repo: GitHubRepo,
    pub token: Option<String>,
    /// Release builds check for updates; development builds don't.
    pub packaged: bool,
    pub warp_proxy: String,
    pub ffmpeg: PathBuf,
}

impl Config {
    /// Resolves paths and credentials; explicit arguments win over defaults.
    #[tracing::instrument(skip(runtime))]
    pub fn new<R: Runtime>(
        runtime: &R,
        data_dir: Option<PathBuf>,
        api_url: Option<String>,
    ) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => runtime
                .data_dir()
                .context("Could not find the user data directory")?
                .join(APP_DIR_NAME),
        };

        let token = runtime.env_var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        if let Some(token) = &token {
            debug!(
                "Using GITHUB_TOKEN for authentication: {}*********",
                token.chars().take(4).collect::<String>()
            );
        }

        Ok(Self {
            data_dir,
            update_dir: runtime.temp_dir().join(UPDATE_DIR_NAME),
            api_url,
            repo: GitHubRepo::pstream_desktop(),
            token,
            packaged: !cfg!(debug_assertions),
            warp_proxy: DEFAULT_WARP_PROXY.to_string(),
            ffmpeg: PathBuf::from("ffmpeg"),
        })
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(crate::settings::SETTINGS_FILE)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir.join("downloads")
    }
}
