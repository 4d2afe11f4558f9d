pub mod app;
pub mod asset;
pub mod config;
pub mod download;
pub mod downloads;
pub mod error;
pub mod github;
pub mod http;
pub mod interceptor;
pub mod ipc;
pub mod platform;
pub mod relay;
pub mod rules;
pub mod runtime;
pub mod settings;
pub mod update;
pub mod version;
