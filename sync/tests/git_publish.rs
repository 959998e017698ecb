//! Drives the `git` executable against a bare repository in a scratch directory.

use chrono::{
    DateTime,
    FixedOffset,
};
use guild_pulse_config::Identity;
use guild_pulse_sync::{
    GitCli,
    PublishOutcome,
    Publisher,
    Remote,
};
use pretty_assertions::assert_eq;
use std::{
    fs,
    path::Path,
    process::Command,
    sync::{
        Arc,
        Once,
    },
    time::Duration,
};
use temp_dir::TempDir;

/// Keep the user's git configuration out of the tests.
fn isolate_git() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        std::env::set_var("GIT_CONFIG_GLOBAL", "/dev/null");
        std::env::set_var("GIT_CONFIG_NOSYSTEM", "1");
    });
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git").current_dir(dir).args(args).output().unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

fn identity() -> Identity {
    Identity {
        name: "pulse".to_string(),
        email: "pulse@example.com".to_string(),
    }
}

struct Fixture {
    root: TempDir,
}

impl Fixture {
    fn new() -> Self {
        isolate_git();
        let root = TempDir::new().unwrap();
        git(root.path(), &["init", "--bare", "remote.git"]);
        fs::create_dir_all(root.path().join("work").join("data")).unwrap();
        Self { root }
    }

    fn work(&self) -> std::path::PathBuf {
        self.root.path().join("work")
    }

    fn bare(&self) -> std::path::PathBuf {
        self.root.path().join("remote.git")
    }

    fn write_series(&self, content: &str) {
        fs::write(self.work().join("data").join("member_count.json"), content).unwrap();
    }

    fn git_cli(&self, remote: bool) -> GitCli {
        let remote = remote.then(|| Remote::new("origin", "main", self.bare().to_string_lossy()));
        GitCli::new(self.work(), self.work().join("data"), remote).unwrap()
    }

    async fn publisher(&self, remote: bool) -> Publisher {
        let git = self.git_cli(remote);
        git.prepare(&identity()).await.unwrap();
        Publisher::new(Arc::new(git), Some(identity()), true)
    }

    fn remote_subjects(&self) -> Vec<String> {
        git(&self.bare(), &["log", "--format=%s", "main"])
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn commit_time(subject: &str) -> DateTime<FixedOffset> {
    let timestamp = subject.strip_prefix("Update stats - ").unwrap();
    DateTime::parse_from_rfc3339(timestamp).unwrap()
}

#[tokio::test]
async fn bootstraps_and_verifies_the_repository() {
    let fixture = Fixture::new();
    fixture.write_series("[]");
    fixture.publisher(true).await;

    let work = fixture.work();
    assert_eq!(git(&work, &["config", "user.name"]).trim(), "pulse");
    assert_eq!(git(&work, &["config", "user.email"]).trim(), "pulse@example.com");
    assert_eq!(git(&work, &["symbolic-ref", "--short", "HEAD"]).trim(), "main");
    assert_eq!(git(&work, &["log", "--format=%s"]).trim(), "Initial commit");
    assert_eq!(
        git(&work, &["remote", "get-url", "origin"]).trim(),
        fixture.bare().to_string_lossy()
    );

    // A second bootstrap reuses the repository.
    fixture.publisher(true).await;
    assert_eq!(git(&work, &["rev-list", "--count", "HEAD"]).trim(), "1");
}

#[tokio::test]
async fn publishes_each_change_once() {
    let fixture = Fixture::new();
    fixture.write_series("[]");
    let publisher = fixture.publisher(true).await;

    assert!(matches!(publisher.publish().await, PublishOutcome::NoChanges));

    fixture.write_series("[\n  1\n]");
    let outcome = publisher.publish().await;
    assert!(matches!(outcome, PublishOutcome::CommittedAndPushed { forced: false }), "{outcome}");
    assert!(matches!(publisher.publish().await, PublishOutcome::NoChanges));

    tokio::time::sleep(Duration::from_millis(5)).await;
    fixture.write_series("[\n  1,\n  2\n]");
    let outcome = publisher.publish().await;
    assert!(matches!(outcome, PublishOutcome::CommittedAndPushed { forced: false }), "{outcome}");

    let subjects = fixture.remote_subjects();
    assert_eq!(subjects.len(), 3);
    assert_eq!(subjects[2], "Initial commit");
    assert!(commit_time(&subjects[0]) > commit_time(&subjects[1]));
}

#[tokio::test]
async fn commits_stay_local_without_a_remote() {
    let fixture = Fixture::new();
    fixture.write_series("[]");
    let publisher = fixture.publisher(false).await;

    fixture.write_series("[\n  1\n]");
    let outcome = publisher.publish().await;
    assert!(matches!(outcome, PublishOutcome::Committed), "{outcome}");
    assert_eq!(git(&fixture.work(), &["rev-list", "--count", "HEAD"]).trim(), "2");
}

#[tokio::test]
async fn new_series_files_are_staged() {
    let fixture = Fixture::new();
    fixture.write_series("[]");
    let publisher = fixture.publisher(false).await;

    fs::write(fixture.work().join("data").join("messages.json"), "[]").unwrap();
    fs::write(fixture.work().join("notes.txt"), "outside the data directory").unwrap();
    let outcome = publisher.publish().await;
    assert!(matches!(outcome, PublishOutcome::Committed), "{outcome}");

    let files = git(&fixture.work(), &["show", "--name-only", "--format=", "HEAD"]);
    assert_eq!(files.trim(), "data/messages.json");
}

#[tokio::test]
async fn interrupted_writes_are_not_staged() {
    let fixture = Fixture::new();
    fixture.write_series("[]");
    fs::write(fixture.work().join("data").join(".member_count.json.tmp"), "[\n  1").unwrap();
    let publisher = fixture.publisher(false).await;

    fixture.write_series("[\n  1\n]");
    let outcome = publisher.publish().await;
    assert!(matches!(outcome, PublishOutcome::Committed), "{outcome}");

    let tracked = git(&fixture.work(), &["ls-files"]);
    assert_eq!(tracked.trim(), "data/member_count.json");
}

#[tokio::test]
async fn conflicting_remote_history_is_overwritten() {
    let fixture = Fixture::new();
    fixture.write_series("[]");
    let publisher = fixture.publisher(true).await;
    fixture.write_series("[\n  1\n]");
    assert!(matches!(publisher.publish().await, PublishOutcome::CommittedAndPushed { forced: false }));

    // Another writer pushes a conflicting change.
    let other = fixture.root.path().join("other");
    git(fixture.root.path(), &["clone", "--branch", "main", "remote.git", "other"]);
    fs::write(other.join("data").join("member_count.json"), "[\n  1,\n  99\n]").unwrap();
    git(&other, &["add", "-A"]);
    git(&other, &["-c", "user.name=other", "-c", "user.email=other@example.com", "commit", "-m", "other"]);
    git(&other, &["push", "origin", "main"]);

    fixture.write_series("[\n  1,\n  2\n]");
    let outcome = publisher.publish().await;
    assert!(matches!(outcome, PublishOutcome::CommittedAndPushed { forced: true }), "{outcome}");

    let subjects = fixture.remote_subjects();
    assert!(subjects[0].starts_with("Update stats - "), "{subjects:?}");
    assert!(!subjects.contains(&"other".to_string()));
    assert!(!fixture.work().join(".git").join("rebase-merge").exists());
}
