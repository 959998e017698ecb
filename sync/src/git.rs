//! [`VersionControl`] on top of the `git` command line.

use crate::{
    vcs::{
        VcsFuture,
        VersionControl,
    },
    GitError,
};
use guild_pulse_config::{
    Identity,
    RemoteTarget,
    Secret,
};
use std::{
    ffi::OsString,
    path::{
        Path,
        PathBuf,
    },
    process::Output,
};
use tokio::process::Command;

/// Files the record store writes before renaming them into place. Never staged.
const TEMP_FILES: &str = ".*.tmp";

/// A remote the working tree is pushed to.
#[derive(Debug, Clone)]
pub struct Remote {
    pub name: String,
    pub branch: String,
    url: Secret,
    display: String,
}

impl Remote {
    /// A remote without credentials, e.g. a local bare repository.
    pub fn new(name: impl Into<String>, branch: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: name.into(),
            branch: branch.into(),
            display: url.clone(),
            url: Secret::new(url),
        }
    }
}

impl From<&RemoteTarget> for Remote {
    fn from(target: &RemoteTarget) -> Self {
        Self {
            name: target.name.clone(),
            branch: target.branch.clone(),
            url: target.url(),
            display: target.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitCli {
    binary: PathBuf,
    repo_dir: PathBuf,
    pathspec: PathBuf,
    remote: Option<Remote>,
}

impl GitCli {
    /// Locate `git` and bind it to the working tree at `repo_dir`. Staging is limited to `data_dir`.
    pub fn new(repo_dir: impl Into<PathBuf>, data_dir: impl AsRef<Path>, remote: Option<Remote>) -> Result<Self, GitError> {
        let binary = which::which("git")?;
        let repo_dir = repo_dir.into();
        let data_dir = data_dir.as_ref();
        let pathspec = staging_pathspec(&repo_dir, data_dir);

        debug!(git = %binary.display(), repo_dir = %repo_dir.display(), pathspec = %pathspec.display(), "Using git");
        Ok(Self {
            binary,
            repo_dir,
            pathspec,
            remote,
        })
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn remote(&self) -> Option<&Remote> {
        self.remote.as_ref()
    }

    /// Bootstrap the repository: initialize it if needed, set the local identity and the remote URL, then verify
    /// that the identity reads back as configured.
    pub async fn prepare(&self, identity: &Identity) -> Result<(), GitError> {
        if self.repo_dir.join(".git").exists() {
            self.configure(identity).await?;
            self.point_remote().await?;
        } else {
            self.initialize(identity).await?;
        }
        self.verify_identity(identity).await
    }

    async fn initialize(&self, identity: &Identity) -> Result<(), GitError> {
        info!(repo_dir = %self.repo_dir.display(), "Initializing repository");
        std::fs::create_dir_all(&self.repo_dir).map_err(|source| GitError::Spawn {
            command: "mkdir".to_string(),
            repo_dir: self.repo_dir.clone(),
            source,
        })?;
        self.git(["init"]).await?;
        self.configure(identity).await?;

        if let Some(remote) = &self.remote {
            let head = format!("refs/heads/{}", remote.branch);
            self.git(["symbolic-ref", "HEAD", head.as_str()]).await?;
            self.git(["remote", "add", remote.name.as_str(), remote.url.expose()]).await?;

            let pulled = self
                .git(["pull", remote.name.as_str(), remote.branch.as_str(), "--allow-unrelated-histories"])
                .await;
            if let Err(err) = pulled {
                warn!(remote = %remote.display, %err, "Initial pull failed, starting from an empty history");
            }
        }

        self.stage().await?;
        if self.staged_changes().await? {
            self.commit_with_fallback("Initial commit", identity).await?;
        }
        Ok(())
    }

    async fn configure(&self, identity: &Identity) -> Result<(), GitError> {
        self.git(["config", "user.name", identity.name.as_str()]).await?;
        self.git(["config", "user.email", identity.email.as_str()]).await?;
        Ok(())
    }

    async fn point_remote(&self) -> Result<(), GitError> {
        let Some(remote) = &self.remote else {
            return Ok(());
        };
        let action = match self.git(["remote", "get-url", remote.name.as_str()]).await {
            Ok(_) => "set-url",
            Err(_) => "add",
        };
        self.git(["remote", action, remote.name.as_str(), remote.url.expose()]).await?;
        debug!(remote = %remote.display, "Configured remote");
        Ok(())
    }

    async fn verify_identity(&self, identity: &Identity) -> Result<(), GitError> {
        for (key, expected) in [("user.name", &identity.name), ("user.email", &identity.email)] {
            let actual = self.git(["config", key]).await?;
            let actual = String::from_utf8_lossy(&actual.stdout).trim().to_string();
            if &actual != expected {
                return Err(GitError::IdentityMismatch {
                    key,
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    async fn stage(&self) -> Result<(), GitError> {
        if !self.repo_dir.join(&self.pathspec).exists() {
            debug!(pathspec = %self.pathspec.display(), "Nothing to stage yet");
            return Ok(());
        }
        let mut args: Vec<OsString> = vec!["add".into(), "-A".into(), "--".into()];
        args.push(self.pathspec.clone().into_os_string());
        let mut exclude = OsString::from(":(exclude)");
        exclude.push(self.pathspec.join(TEMP_FILES));
        args.push(exclude);
        self.git(args).await?;
        Ok(())
    }

    async fn staged_changes(&self) -> Result<bool, GitError> {
        let output = self.output(["diff", "--cached", "--quiet"]).await?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            code => Err(self.failure("diff", code, &output)),
        }
    }

    async fn commit_with_fallback(&self, message: &str, identity: &Identity) -> Result<(), GitError> {
        match self.commit_as(message, None).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(%err, "Commit failed, retrying with an explicit identity");
                self.commit_as(message, Some(identity)).await
            }
        }
    }

    async fn commit_as(&self, message: &str, identity: Option<&Identity>) -> Result<(), GitError> {
        let mut args = Vec::new();
        if let Some(identity) = identity {
            args.extend([
                "-c".to_string(),
                format!("user.name={}", identity.name),
                "-c".to_string(),
                format!("user.email={}", identity.email),
            ]);
        }
        args.extend(["commit".to_string(), "-m".to_string(), message.to_string()]);
        self.git(args).await?;
        Ok(())
    }

    async fn pull_rebase(&self) -> Result<(), GitError> {
        let Some(remote) = &self.remote else {
            return Ok(());
        };
        let pulled = self
            .git(["pull", "--rebase", "--autostash", remote.name.as_str(), remote.branch.as_str()])
            .await;
        let git_dir = self.repo_dir.join(".git");
        if pulled.is_err() && (git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists()) {
            if let Err(err) = self.git(["rebase", "--abort"]).await {
                warn!(%err, "Failed to abort the rebase");
            }
        }
        pulled.map(|_| ())
    }

    async fn push_to_remote(&self, force: bool) -> Result<(), GitError> {
        let Some(remote) = &self.remote else {
            return Ok(());
        };
        let refspec = format!("HEAD:refs/heads/{}", remote.branch);
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.extend([remote.name.as_str(), refspec.as_str()]);

        let output = self.output(args).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = self.redact(String::from_utf8_lossy(&output.stderr).trim().to_string());
        if is_rejection(&stderr) {
            Err(GitError::PushRejected { stderr })
        } else {
            Err(self.failure("push", output.status.code(), &output))
        }
    }

    /// Run git and fail on a non-zero exit.
    async fn git<I, S>(&self, args: I) -> Result<Output, GitError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let output = self.output(args.iter().cloned()).await?;
        if output.status.success() {
            Ok(output)
        } else {
            let subcommand = subcommand(&args);
            Err(self.failure(&subcommand, output.status.code(), &output))
        }
    }

    /// Run git and return whatever it produced.
    async fn output<I, S>(&self, args: I) -> Result<Output, GitError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        trace!(command = %subcommand(&args), "Running git");
        Command::new(&self.binary)
            .args(&args)
            .current_dir(&self.repo_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| GitError::Spawn {
                command: format!("git {}", subcommand(&args)),
                repo_dir: self.repo_dir.clone(),
                source,
            })
    }

    fn failure(&self, subcommand: &str, code: Option<i32>, output: &Output) -> GitError {
        GitError::Failed {
            command: format!("git {subcommand}"),
            code,
            stderr: self.redact(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        }
    }

    fn redact(&self, text: String) -> String {
        match &self.remote {
            Some(remote) if text.contains(remote.url.expose()) => text.replace(remote.url.expose(), &remote.display),
            _ => text,
        }
    }
}

/// The git subcommand, skipping `-c key=value` options. Arguments are never logged since they may hold the
/// remote URL.
fn subcommand(args: &[OsString]) -> String {
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        if arg == "-c" {
            args.next();
            continue;
        }
        return arg.to_string_lossy().into_owned();
    }
    String::new()
}

fn is_rejection(stderr: &str) -> bool {
    ["[rejected]", "non-fast-forward", "fetch first", "stale info"]
        .iter()
        .any(|marker| stderr.contains(marker))
}

impl VersionControl for GitCli {
    fn stage_all(&self) -> VcsFuture<'_, ()> {
        Box::pin(self.stage())
    }

    fn has_staged_changes(&self) -> VcsFuture<'_, bool> {
        Box::pin(self.staged_changes())
    }

    fn commit<'a>(&'a self, message: &'a str, identity: Option<&'a Identity>) -> VcsFuture<'a, ()> {
        Box::pin(self.commit_as(message, identity))
    }

    fn pull(&self) -> VcsFuture<'_, ()> {
        Box::pin(self.pull_rebase())
    }

    fn push(&self, force: bool) -> VcsFuture<'_, ()> {
        Box::pin(self.push_to_remote(force))
    }

    fn has_remote(&self) -> bool {
        self.remote.is_some()
    }
}

/// `data_dir` relative to `repo_dir`, which is what git resolves pathspecs against. Falls back to `data_dir`
/// itself, which git only accepts if it is an absolute path inside the working tree.
fn staging_pathspec(repo_dir: &Path, data_dir: &Path) -> PathBuf {
    let relative = data_dir.strip_prefix(repo_dir).ok().map(Path::to_path_buf).or_else(|| {
        let repo_dir = std::path::absolute(repo_dir).ok()?;
        data_dir.strip_prefix(repo_dir).ok().map(Path::to_path_buf)
    });
    match relative {
        Some(path) if path.as_os_str().is_empty() => PathBuf::from("."),
        Some(path) => path,
        None => data_dir.to_path_buf(),
    }
}
