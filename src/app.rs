//! Assembles the core services from a [`Config`].

use anyhow::{Context, Result};
use log::debug;
use reqwest::cookie::Jar;
use std::sync::Arc;

use crate::asset::{InstallerAssetPicker, Platform};
use crate::config::{APP_USER_AGENT, APP_VERSION, BROWSER_USER_AGENT, Config};
use crate::download::HttpDownloader;
use crate::downloads::{DownloadManager, FfmpegTranscoder};
use crate::github::GitHub;
use crate::http::HttpClient;
use crate::interceptor::HeaderInterceptor;
use crate::ipc::{Host, PageBridge, SettingsBridge};
use crate::platform::shell_for;
use crate::relay::RequestRelay;
use crate::rules::{RuleStore, SharedRules};
use crate::runtime::Runtime;
use crate::settings::{SettingsStore, default_settings};
use crate::update::Updater;

pub type AppUpdater<R> = Updater<GitHub, HttpDownloader<R>>;
pub type AppDownloads<R> = DownloadManager<R, FfmpegTranscoder>;

/// Everything a window shell needs to drive the core.
pub struct App<R: Runtime + 'static> {
    pub config: Config,
    pub settings: Arc<SettingsStore<R>>,
    pub updater: Arc<AppUpdater<R>>,
    pub rules: SharedRules,
    pub interceptor: HeaderInterceptor,
    pub downloads: Arc<AppDownloads<R>>,
    pub page: PageBridge<R, FfmpegTranscoder>,
    pub settings_bridge: SettingsBridge<R, GitHub, HttpDownloader<R>>,
}

/// Client for the release API; the token travels per request.
pub fn build_update_client() -> Result<HttpClient> {
    HttpClient::build(APP_USER_AGENT, None)
}

/// Client for relayed page requests, sharing the session cookie jar.
pub fn build_relay_client(jar: Arc<Jar>) -> Result<HttpClient> {
    HttpClient::build(BROWSER_USER_AGENT, Some(jar))
}

impl<R: Runtime + 'static> App<R> {
    #[tracing::instrument(skip(runtime, config, host))]
    pub fn new(runtime: Arc<R>, config: Config, host: Arc<dyn Host>) -> Result<Self> {
        runtime
            .create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", config.data_dir))?;
        runtime
            .create_dir_all(&config.update_dir)
            .with_context(|| format!("Failed to create update directory {:?}", config.update_dir))?;

        let platform = Platform::detect();
        debug!("Running on {}", platform);

        let update_http = build_update_client()?;
        let github = GitHub::new(
            update_http.clone(),
            config.repo.clone(),
            config.api_url.clone(),
            config.token.clone(),
        );
        let updater = Arc::new(Updater::new(
            github,
            HttpDownloader::new(runtime.clone(), update_http),
            Box::new(InstallerAssetPicker::with_platform(platform.clone())),
            shell_for(&platform, runtime.clone()),
            config.update_dir.clone(),
            APP_VERSION,
            config.packaged,
        ));

        let jar = Arc::new(Jar::default());
        let relay = RequestRelay::new(build_relay_client(jar.clone())?, jar);

        let rules = RuleStore::shared();
        let interceptor = HeaderInterceptor::new(rules.clone());

        let settings = Arc::new(SettingsStore::load(
            runtime.clone(),
            &config.settings_path(),
            default_settings(),
        ));

        let downloads = Arc::new(DownloadManager::open(
            runtime,
            &config.downloads_dir(),
            FfmpegTranscoder::new(config.ffmpeg.clone()),
        )?);

        let page = PageBridge::new(relay, rules.clone(), downloads.clone(), host.clone());
        let settings_bridge = SettingsBridge::new(
            settings.clone(),
            updater.clone(),
            host,
            config.warp_proxy.clone(),
        );

        Ok(Self {
            config,
            settings,
            updater,
            rules,
            interceptor,
            downloads,
            page,
            settings_bridge,
        })
    }
}
