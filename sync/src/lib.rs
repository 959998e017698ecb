//! # Publishing the series to git
//!
//! - **`VersionControl`**: the operations a publish needs from a working tree
//! - **`GitCli`**: runs them with the `git` executable and bootstraps the repository
//! - **`Publisher`**: stage, commit, pull and push, reporting a [`PublishOutcome`] instead of failing

#[macro_use]
extern crate tracing;

mod error;
pub mod git;
mod publisher;
pub mod vcs;

pub use error::GitError;
pub use git::{
    GitCli,
    Remote,
};
pub use publisher::{
    PublishOutcome,
    PublishStep,
    Publisher,
};
pub use vcs::VersionControl;
