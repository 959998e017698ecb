#[macro_use]
extern crate tracing;

mod args;
mod secret;
mod settings;

pub use args::Args;
pub use secret::Secret;
pub use settings::{
    Identity,
    PlatformSettings,
    RemoteTarget,
    ScheduleSettings,
    Settings,
    SyncSettings,
};

use serde::Deserialize;
use std::path::PathBuf;

/// Layered configuration as read from the embedded defaults, an optional YAML file and the command line.
///
/// Nothing is validated here, see [`Config::into_settings`].
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub platform_token: Option<Secret>,
    #[serde(default)]
    pub guild_id: Option<u64>,
    pub sample_interval_minutes: u64,
    pub message_window_minutes: u64,
    pub data_dir: PathBuf,
    pub repo_dir: PathBuf,
    pub api_base_url: url::Url,
    pub gateway_url: url::Url,
    pub request_timeout_seconds: u64,
    pub cycle_timeout_seconds: u64,
    pub shutdown_grace_seconds: u64,
    pub max_history_pages: usize,
    #[serde(default)]
    pub remote_token: Option<Secret>,
    #[serde(default)]
    pub remote_username: Option<String>,
    #[serde(default)]
    pub remote_repo: Option<String>,
    #[serde(default)]
    pub remote_email: Option<String>,
    pub remote_host: String,
    pub remote_branch: String,
    pub remote_name: String,
    pub force_push_on_reject: bool,
    #[serde(default)]
    pub once: bool,
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

impl Config {
    pub fn new(args: &Args) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        if let Some(path) = &args.config {
            debug!(?path, "Reading configuration file");
            builder = builder.add_source(config::File::from(path.clone()).format(config::FileFormat::Yaml));
        }

        builder = builder.add_source(args.clone());

        builder.build()?.try_deserialize()
    }
}
