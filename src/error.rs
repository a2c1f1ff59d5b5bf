// src/error.rs

use crate::model::Revision;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// No repository could be opened; nothing meaningful can be replayed.
    #[error("no git repository at {}", path.display())]
    NoRepository { path: PathBuf, source: git2::Error },

    #[error("cannot resolve revision '{0}'")]
    UnknownRevision(String),

    #[error("boundary {boundary} is not an ancestor of head {head}")]
    NotAncestor { boundary: Revision, head: Revision },

    /// Every line must have a known author, so this aborts the replay.
    #[error("commit {revision} has no author name")]
    MissingAuthor { revision: Revision },

    #[error("invalid configuration in {}: {source}", path.display())]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
