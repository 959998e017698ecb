use crate::GitError;
use guild_pulse_config::Identity;
use std::{
    future::Future,
    pin::Pin,
};

pub type VcsFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GitError>> + Send + 'a>>;

/// The version control operations the publisher needs from a working tree.
pub trait VersionControl: Send + Sync {
    /// Stage every change below the data directory, including untracked files.
    fn stage_all(&self) -> VcsFuture<'_, ()>;

    /// Whether the index differs from the last commit.
    fn has_staged_changes(&self) -> VcsFuture<'_, bool>;

    /// Commit the index. With an `identity` the author is passed explicitly instead of read from the repository.
    fn commit<'a>(&'a self, message: &'a str, identity: Option<&'a Identity>) -> VcsFuture<'a, ()>;

    /// Rebase local commits onto the tracking branch. A failed rebase is aborted before returning the error.
    fn pull(&self) -> VcsFuture<'_, ()>;

    /// Push to the tracking branch. Fails with [`GitError::PushRejected`] when the remote has diverged.
    fn push(&self, force: bool) -> VcsFuture<'_, ()>;

    /// Whether a remote is configured. Without one, commits stay local.
    fn has_remote(&self) -> bool;
}
