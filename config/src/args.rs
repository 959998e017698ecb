use clap::Parser;
use std::path::PathBuf;

/// Samples member and message activity of a Discord guild and publishes it to git.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Optional YAML file with additional settings. Flags and environment variables take precedence.
    #[arg(long, env = "GUILD_PULSE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Bot token used to authenticate against the chat platform.
    #[arg(long, env = "PLATFORM_TOKEN", hide_env_values = true)]
    pub platform_token: Option<String>,

    /// ID of the guild to monitor.
    #[arg(long, env = "GUILD_ID")]
    pub guild_id: Option<u64>,

    /// Minutes between two sampling cycles.
    #[arg(long, env = "SAMPLE_INTERVAL_MINUTES")]
    pub sample_interval_minutes: Option<u64>,

    /// Lookback window in minutes used for the message volume.
    #[arg(long, env = "MESSAGE_WINDOW_MINUTES")]
    pub message_window_minutes: Option<u64>,

    /// Directory holding the series files. A relative path is resolved against the repository directory.
    #[arg(long, env = "DATA_DIR", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Git working tree the series files are committed to.
    #[arg(long, env = "REPO_DIR", value_name = "DIR")]
    pub repo_dir: Option<PathBuf>,

    /// Token used to push to the remote repository.
    #[arg(long, env = "REMOTE_TOKEN", hide_env_values = true)]
    pub remote_token: Option<String>,

    /// Remote account name, also used as the commit author name.
    #[arg(long, env = "REMOTE_USERNAME")]
    pub remote_username: Option<String>,

    /// Name of the remote repository.
    #[arg(long, env = "REMOTE_REPO")]
    pub remote_repo: Option<String>,

    /// Commit author email.
    #[arg(long, env = "REMOTE_EMAIL")]
    pub remote_email: Option<String>,

    /// Host of the remote repository.
    #[arg(long, env = "REMOTE_HOST")]
    pub remote_host: Option<String>,

    /// Branch that is pulled from and pushed to.
    #[arg(long, env = "REMOTE_BRANCH")]
    pub remote_branch: Option<String>,

    /// Retry a rejected push with `--force`. Only safe with a single writer.
    #[arg(long, env = "FORCE_PUSH_ON_REJECT")]
    pub force_push_on_reject: Option<bool>,

    /// Run a single cycle once the platform connection is ready, then exit.
    #[arg(long, action)]
    pub once: bool,

    /// Enables debug logging for the guild-pulse crates.
    #[arg(short, long, action)]
    pub verbose: bool,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();

            let strings = [
                ("platform_token", &self.platform_token),
                ("remote_token", &self.remote_token),
                ("remote_username", &self.remote_username),
                ("remote_repo", &self.remote_repo),
                ("remote_email", &self.remote_email),
                ("remote_host", &self.remote_host),
                ("remote_branch", &self.remote_branch),
            ];
            for (key, value) in strings {
                if let Some(value) = value {
                    cache.insert(key.to_string(), value.clone().into());
                }
            }

            let numbers = [
                ("guild_id", self.guild_id),
                ("sample_interval_minutes", self.sample_interval_minutes),
                ("message_window_minutes", self.message_window_minutes),
            ];
            for (key, value) in numbers {
                if let Some(value) = value {
                    cache.insert(key.to_string(), value.into());
                }
            }

            if let Some(data_dir) = &self.data_dir {
                cache.insert("data_dir".to_string(), data_dir.display().to_string().into());
            }
            if let Some(repo_dir) = &self.repo_dir {
                cache.insert("repo_dir".to_string(), repo_dir.display().to_string().into());
            }
            if let Some(force) = self.force_push_on_reject {
                cache.insert("force_push_on_reject".to_string(), force.into());
            }
            if self.once {
                cache.insert("once".to_string(), true.into());
            }
            Ok(cache)
        }
    }
}
