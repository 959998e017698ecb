use crate::{
    git::{
        GitCli,
        Remote,
    },
    vcs::VersionControl,
    GitError,
};
use chrono::{
    SecondsFormat,
    Utc,
};
use guild_pulse_config::{
    Identity,
    SyncSettings,
};
use std::{
    fmt,
    sync::Arc,
};

/// The step of a publish that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PublishStep {
    Stage,
    Diff,
    Commit,
    Push,
}

#[derive(Debug)]
pub enum PublishOutcome {
    /// Sync is not configured or the repository could not be prepared.
    Disabled,
    /// The series did not change since the last commit.
    NoChanges,
    /// Committed without a remote to push to.
    Committed,
    CommittedAndPushed { forced: bool },
    Failed { step: PublishStep, error: GitError },
}

impl PublishOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PublishOutcome::Failed { .. })
    }
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishOutcome::Disabled => f.write_str("disabled"),
            PublishOutcome::NoChanges => f.write_str("no changes"),
            PublishOutcome::Committed => f.write_str("committed"),
            PublishOutcome::CommittedAndPushed { forced: false } => f.write_str("committed and pushed"),
            PublishOutcome::CommittedAndPushed { forced: true } => f.write_str("committed and force pushed"),
            PublishOutcome::Failed { step, error } => write!(f, "{step} failed: {error}"),
        }
    }
}

/// Commits the changes to the series and pushes them to the remote.
#[derive(Clone)]
pub struct Publisher {
    vcs: Option<Arc<dyn VersionControl>>,
    identity: Option<Identity>,
    force_push_on_reject: bool,
}

impl Publisher {
    pub fn new(vcs: Arc<dyn VersionControl>, identity: Option<Identity>, force_push_on_reject: bool) -> Self {
        Self {
            vcs: Some(vcs),
            identity,
            force_push_on_reject,
        }
    }

    pub fn disabled() -> Self {
        Self {
            vcs: None,
            identity: None,
            force_push_on_reject: false,
        }
    }

    /// Prepare the repository described by `settings`. Sync degrades to disabled if it is not configured or the
    /// repository cannot be prepared.
    pub async fn from_settings(settings: &SyncSettings) -> Self {
        let Some(identity) = &settings.identity else {
            info!("Publishing to git is disabled");
            return Self::disabled();
        };

        let remote = settings.remote.as_ref().map(Remote::from);
        let git = match GitCli::new(&settings.repo_dir, &settings.data_dir, remote) {
            Ok(git) => git,
            Err(err) => {
                error!(%err, "Publishing to git is disabled");
                return Self::disabled();
            }
        };

        if let Err(err) = git.prepare(identity).await {
            error!(repo_dir = %settings.repo_dir.display(), %err, "Failed to prepare the repository, publishing to git is disabled");
            return Self::disabled();
        }

        match &settings.remote {
            Some(remote) => info!(repo_dir = %settings.repo_dir.display(), %remote, "Publishing to git"),
            None => info!(repo_dir = %settings.repo_dir.display(), "Committing to git without a remote"),
        }
        Self::new(Arc::new(git), Some(identity.clone()), settings.force_push_on_reject)
    }

    pub fn is_enabled(&self) -> bool {
        self.vcs.is_some()
    }

    /// Commit and push whatever changed in the data directory. Never fails, every outcome is reported.
    pub async fn publish(&self) -> PublishOutcome {
        let Some(vcs) = &self.vcs else {
            return PublishOutcome::Disabled;
        };

        if let Err(error) = vcs.stage_all().await {
            return PublishOutcome::Failed {
                step: PublishStep::Stage,
                error,
            };
        }
        match vcs.has_staged_changes().await {
            Ok(true) => {}
            Ok(false) => return PublishOutcome::NoChanges,
            Err(error) => {
                return PublishOutcome::Failed {
                    step: PublishStep::Diff,
                    error,
                };
            }
        }

        let message = format!("Update stats - {}", Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true));
        if let Err(error) = self.commit(vcs.as_ref(), &message).await {
            return PublishOutcome::Failed {
                step: PublishStep::Commit,
                error,
            };
        }
        info!(%message, "Committed");

        if !vcs.has_remote() {
            return PublishOutcome::Committed;
        }

        if let Err(err) = vcs.pull().await {
            warn!(%err, "Pull failed, pushing anyway");
        }

        match vcs.push(false).await {
            Ok(()) => PublishOutcome::CommittedAndPushed { forced: false },
            Err(GitError::PushRejected { stderr }) if self.force_push_on_reject => {
                warn!(%stderr, "Push rejected, force pushing over the remote history");
                match vcs.push(true).await {
                    Ok(()) => PublishOutcome::CommittedAndPushed { forced: true },
                    Err(error) => PublishOutcome::Failed {
                        step: PublishStep::Push,
                        error,
                    },
                }
            }
            Err(error) => PublishOutcome::Failed {
                step: PublishStep::Push,
                error,
            },
        }
    }

    async fn commit(&self, vcs: &dyn VersionControl, message: &str) -> Result<(), GitError> {
        match (vcs.commit(message, None).await, &self.identity) {
            (Ok(()), _) => Ok(()),
            (Err(err), Some(identity)) => {
                warn!(%err, "Commit failed, retrying with an explicit identity");
                vcs.commit(message, Some(identity)).await
            }
            (Err(err), None) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::VcsFuture;
    use pretty_assertions::assert_eq;
    use std::{
        collections::VecDeque,
        sync::Mutex,
    };

    /// Records every call and answers from scripted results.
    #[derive(Default)]
    struct FakeVcs {
        calls: Mutex<Vec<String>>,
        staged: Mutex<VecDeque<bool>>,
        commits: Mutex<VecDeque<Result<(), GitError>>>,
        pulls: Mutex<VecDeque<Result<(), GitError>>>,
        pushes: Mutex<VecDeque<Result<(), GitError>>>,
        remote: bool,
    }

    impl FakeVcs {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    fn failed(command: &str) -> GitError {
        GitError::Failed {
            command: command.to_string(),
            code: Some(1),
            stderr: "error".to_string(),
        }
    }

    fn rejected() -> GitError {
        GitError::PushRejected {
            stderr: " ! [rejected] main -> main (fetch first)".to_string(),
        }
    }

    impl VersionControl for FakeVcs {
        fn stage_all(&self) -> VcsFuture<'_, ()> {
            self.record("stage");
            Box::pin(async { Ok(()) })
        }

        fn has_staged_changes(&self) -> VcsFuture<'_, bool> {
            self.record("diff");
            let staged = self.staged.lock().unwrap().pop_front().unwrap_or(false);
            Box::pin(async move { Ok(staged) })
        }

        fn commit<'a>(&'a self, message: &'a str, identity: Option<&'a Identity>) -> VcsFuture<'a, ()> {
            assert!(message.starts_with("Update stats - "), "{message}");
            self.record(match identity {
                Some(identity) => format!("commit as {}", identity.name),
                None => "commit".to_string(),
            });
            let result = self.commits.lock().unwrap().pop_front().unwrap_or(Ok(()));
            Box::pin(async move { result })
        }

        fn pull(&self) -> VcsFuture<'_, ()> {
            self.record("pull");
            let result = self.pulls.lock().unwrap().pop_front().unwrap_or(Ok(()));
            Box::pin(async move { result })
        }

        fn push(&self, force: bool) -> VcsFuture<'_, ()> {
            self.record(if force { "push --force" } else { "push" });
            let result = self.pushes.lock().unwrap().pop_front().unwrap_or(Ok(()));
            Box::pin(async move { result })
        }

        fn has_remote(&self) -> bool {
            self.remote
        }
    }

    fn identity() -> Identity {
        Identity {
            name: "pulse".to_string(),
            email: "pulse@example.com".to_string(),
        }
    }

    fn publisher(vcs: &Arc<FakeVcs>, identity: Option<Identity>, force: bool) -> Publisher {
        Publisher::new(vcs.clone(), identity, force)
    }

    #[tokio::test]
    async fn disabled_publisher_does_nothing() {
        let outcome = Publisher::disabled().publish().await;
        assert!(matches!(outcome, PublishOutcome::Disabled));
    }

    #[tokio::test]
    async fn unchanged_tree_creates_no_commit() {
        let vcs = Arc::new(FakeVcs {
            remote: true,
            ..Default::default()
        });
        let publisher = publisher(&vcs, Some(identity()), true);

        assert!(matches!(publisher.publish().await, PublishOutcome::NoChanges));
        assert!(matches!(publisher.publish().await, PublishOutcome::NoChanges));
        assert_eq!(vcs.calls(), vec!["stage", "diff", "stage", "diff"]);
    }

    #[tokio::test]
    async fn commits_pulls_and_pushes() {
        let vcs = Arc::new(FakeVcs {
            remote: true,
            staged: Mutex::new([true].into()),
            ..Default::default()
        });

        let outcome = publisher(&vcs, Some(identity()), true).publish().await;

        assert!(matches!(outcome, PublishOutcome::CommittedAndPushed { forced: false }), "{outcome}");
        assert_eq!(vcs.calls(), vec!["stage", "diff", "commit", "pull", "push"]);
    }

    #[tokio::test]
    async fn commits_stay_local_without_a_remote() {
        let vcs = Arc::new(FakeVcs {
            staged: Mutex::new([true].into()),
            ..Default::default()
        });

        let outcome = publisher(&vcs, Some(identity()), true).publish().await;

        assert!(matches!(outcome, PublishOutcome::Committed), "{outcome}");
        assert_eq!(vcs.calls(), vec!["stage", "diff", "commit"]);
    }

    #[tokio::test]
    async fn commit_retries_with_explicit_identity() {
        let vcs = Arc::new(FakeVcs {
            staged: Mutex::new([true].into()),
            commits: Mutex::new([Err(failed("commit"))].into()),
            ..Default::default()
        });

        let outcome = publisher(&vcs, Some(identity()), true).publish().await;

        assert!(matches!(outcome, PublishOutcome::Committed), "{outcome}");
        assert_eq!(vcs.calls(), vec!["stage", "diff", "commit", "commit as pulse"]);
    }

    #[tokio::test]
    async fn commit_failure_is_reported() {
        let vcs = Arc::new(FakeVcs {
            remote: true,
            staged: Mutex::new([true].into()),
            commits: Mutex::new([Err(failed("commit")), Err(failed("commit"))].into()),
            ..Default::default()
        });

        let outcome = publisher(&vcs, Some(identity()), true).publish().await;

        assert!(
            matches!(outcome, PublishOutcome::Failed { step: PublishStep::Commit, .. }),
            "{outcome}"
        );
        assert!(!vcs.calls().contains(&"push".to_string()));
    }

    #[tokio::test]
    async fn failed_pull_still_pushes() {
        let vcs = Arc::new(FakeVcs {
            remote: true,
            staged: Mutex::new([true].into()),
            pulls: Mutex::new([Err(failed("pull"))].into()),
            ..Default::default()
        });

        let outcome = publisher(&vcs, Some(identity()), true).publish().await;

        assert!(matches!(outcome, PublishOutcome::CommittedAndPushed { forced: false }), "{outcome}");
        assert_eq!(vcs.calls(), vec!["stage", "diff", "commit", "pull", "push"]);
    }

    #[tokio::test]
    async fn rejected_push_is_forced() {
        let vcs = Arc::new(FakeVcs {
            remote: true,
            staged: Mutex::new([true].into()),
            pushes: Mutex::new([Err(rejected())].into()),
            ..Default::default()
        });

        let outcome = publisher(&vcs, Some(identity()), true).publish().await;

        assert!(matches!(outcome, PublishOutcome::CommittedAndPushed { forced: true }), "{outcome}");
        assert_eq!(vcs.calls(), vec!["stage", "diff", "commit", "pull", "push", "push --force"]);
    }

    #[tokio::test]
    async fn rejected_push_is_reported_without_force() {
        let vcs = Arc::new(FakeVcs {
            remote: true,
            staged: Mutex::new([true].into()),
            pushes: Mutex::new([Err(rejected())].into()),
            ..Default::default()
        });

        let outcome = publisher(&vcs, Some(identity()), false).publish().await;

        assert!(
            matches!(outcome, PublishOutcome::Failed { step: PublishStep::Push, error: GitError::PushRejected { .. } }),
            "{outcome}"
        );
        assert_eq!(vcs.calls(), vec!["stage", "diff", "commit", "pull", "push"]);
    }

    #[tokio::test]
    async fn other_push_failures_are_not_forced() {
        let vcs = Arc::new(FakeVcs {
            remote: true,
            staged: Mutex::new([true].into()),
            pushes: Mutex::new([Err(failed("push"))].into()),
            ..Default::default()
        });

        let outcome = publisher(&vcs, Some(identity()), true).publish().await;

        assert!(
            matches!(outcome, PublishOutcome::Failed { step: PublishStep::Push, .. }),
            "{outcome}"
        );
        assert_eq!(vcs.calls(), vec!["stage", "diff", "commit", "pull", "push"]);
    }

    #[tokio::test]
    async fn unconfigured_sync_is_disabled() {
        let settings = SyncSettings {
            repo_dir: ".".into(),
            data_dir: "data".into(),
            identity: None,
            remote: None,
            force_push_on_reject: true,
        };
        let publisher = Publisher::from_settings(&settings).await;
        assert!(!publisher.is_enabled());
        assert!(matches!(publisher.publish().await, PublishOutcome::Disabled));
    }
}
