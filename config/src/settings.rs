use crate::{
    Config,
    Secret,
};
use eyre::{
    bail,
    Result,
};
use std::{
    fmt,
    path::{
        Component,
        Path,
        PathBuf,
    },
    time::Duration,
};

/// Validated settings the rest of the workspace is built from.
#[derive(Clone, Debug)]
pub struct Settings {
    pub platform: PlatformSettings,
    pub schedule: ScheduleSettings,
    pub data_dir: PathBuf,
    pub sync: SyncSettings,
}

#[derive(Clone, Debug)]
pub struct PlatformSettings {
    pub token: Secret,
    pub guild_id: u64,
    pub api_base_url: url::Url,
    pub gateway_url: url::Url,
    pub request_timeout: Duration,
    pub max_history_pages: usize,
}

#[derive(Clone, Debug)]
pub struct ScheduleSettings {
    pub sample_interval: Duration,
    pub message_window: Duration,
    pub cycle_timeout: Duration,
    pub shutdown_grace: Duration,
    pub run_once: bool,
}

#[derive(Clone, Debug)]
pub struct SyncSettings {
    pub repo_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Without an identity nothing is committed.
    pub identity: Option<Identity>,
    /// Without a remote commits stay local.
    pub remote: Option<RemoteTarget>,
    pub force_push_on_reject: bool,
}

/// Commit author.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// The remote repository the series are pushed to.
#[derive(Clone, Debug)]
pub struct RemoteTarget {
    pub name: String,
    pub branch: String,
    host: String,
    username: String,
    repo: String,
    token: Secret,
}

impl RemoteTarget {
    /// Push URL with the token embedded.
    pub fn url(&self) -> Secret {
        Secret::new(format!(
            "https://{}:{}@{}/{}/{}.git",
            self.username,
            self.token.expose(),
            self.host,
            self.username,
            self.repo
        ))
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://{}:***@{}/{}/{}.git", self.username, self.host, self.username, self.repo)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

/// Drops `.` components. An empty path becomes `.`.
fn normalize(path: &Path) -> PathBuf {
    let path: PathBuf = path.components().filter(|c| *c != Component::CurDir).collect();
    if path.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        path
    }
}

impl Config {
    /// Checks required values and ranges and derives the sync mode.
    pub fn into_settings(self) -> Result<Settings> {
        let Some(token) = self.platform_token.filter(|t| !t.is_blank()) else {
            bail!("PLATFORM_TOKEN is required but was not provided");
        };
        let Some(guild_id) = self.guild_id else {
            bail!("GUILD_ID is required but was not provided");
        };
        if self.sample_interval_minutes == 0 {
            bail!("SAMPLE_INTERVAL_MINUTES must be a positive number of minutes");
        }
        if self.message_window_minutes == 0 {
            bail!("MESSAGE_WINDOW_MINUTES must be a positive number of minutes");
        }
        if self.max_history_pages == 0 {
            bail!("max_history_pages must be at least 1");
        }
        for (name, seconds) in [
            ("request_timeout_seconds", self.request_timeout_seconds),
            ("cycle_timeout_seconds", self.cycle_timeout_seconds),
            ("shutdown_grace_seconds", self.shutdown_grace_seconds),
        ] {
            if seconds == 0 {
                bail!("{name} must be a positive number of seconds");
            }
        }

        // The series are committed from the working tree, so a relative data directory lives inside it.
        let repo_dir = normalize(&self.repo_dir);
        let data_dir = if self.data_dir.is_absolute() {
            self.data_dir.clone()
        } else {
            normalize(&repo_dir.join(&self.data_dir))
        };

        let identity = match (non_blank(self.remote_username.clone()), non_blank(self.remote_email)) {
            (Some(name), Some(email)) => Some(Identity { name, email }),
            _ => {
                warn!("REMOTE_USERNAME or REMOTE_EMAIL not configured, publishing to git is disabled");
                None
            }
        };
        if identity.is_some() && !is_inside(&data_dir, &repo_dir)? {
            bail!(
                "DATA_DIR {} must be inside REPO_DIR {} to be published",
                data_dir.display(),
                repo_dir.display()
            );
        }

        let remote = match (
            &identity,
            non_blank(self.remote_username),
            self.remote_token.filter(|t| !t.is_blank()),
            non_blank(self.remote_repo),
        ) {
            (Some(_), Some(username), Some(token), Some(repo)) => Some(RemoteTarget {
                name: self.remote_name,
                branch: self.remote_branch,
                host: self.remote_host,
                username,
                repo,
                token,
            }),
            (Some(_), ..) => {
                info!("REMOTE_TOKEN or REMOTE_REPO not configured, commits will stay local");
                None
            }
            _ => None,
        };

        Ok(Settings {
            platform: PlatformSettings {
                token,
                guild_id,
                api_base_url: self.api_base_url,
                gateway_url: self.gateway_url,
                request_timeout: Duration::from_secs(self.request_timeout_seconds),
                max_history_pages: self.max_history_pages,
            },
            schedule: ScheduleSettings {
                sample_interval: minutes(self.sample_interval_minutes),
                message_window: minutes(self.message_window_minutes),
                cycle_timeout: Duration::from_secs(self.cycle_timeout_seconds),
                shutdown_grace: Duration::from_secs(self.shutdown_grace_seconds),
                run_once: self.once,
            },
            data_dir: data_dir.clone(),
            sync: SyncSettings {
                repo_dir,
                data_dir,
                identity,
                remote,
                force_push_on_reject: self.force_push_on_reject,
            },
        })
    }
}

/// Lexical containment. Paths climbing out with `..` never count as inside.
fn is_inside(data_dir: &Path, repo_dir: &Path) -> Result<bool> {
    let relative = if data_dir.is_absolute() {
        data_dir.strip_prefix(std::path::absolute(repo_dir)?).ok()
    } else if repo_dir == Path::new(".") {
        Some(data_dir)
    } else {
        data_dir.strip_prefix(repo_dir).ok()
    };
    Ok(relative.is_some_and(|path| !path.components().any(|c| c == Component::ParentDir)))
}
