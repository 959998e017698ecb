use std::{
    io,
    path::PathBuf,
};

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git executable not found: {0}")]
    NotInstalled(#[from] which::Error),

    #[error("failed to run `{command}` in {}: {source}", repo_dir.display())]
    Spawn {
        command: String,
        repo_dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {}: {stderr}", code.map_or_else(|| "a signal".to_string(), |code| format!("status {code}")))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("push rejected (non-fast-forward): {stderr}")]
    PushRejected { stderr: String },

    #[error("git config {key} is {actual:?}, expected {expected:?}")]
    IdentityMismatch {
        key: &'static str,
        expected: String,
        actual: String,
    },
}
