// src/repo.rs

use crate::error::{Error, Result};
use crate::model::{AuthorName, Commit, Revision};
use git2::{BlameOptions, ErrorCode, ObjectType, Oid, Repository, TreeWalkMode, TreeWalkResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Author of one physical line according to a blame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameLine {
    pub author: AuthorName,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Binary,
}

/// Read access to an immutable revision store. The ownership engine only
/// talks to the repository through this trait.
pub trait RevisionStore {
    fn commit(&self, revision: Revision) -> Result<Commit>;

    /// Content of `path` as of `revision`, `None` if the path does not exist there.
    fn file_content(&self, revision: Revision, path: &str) -> Result<Option<FileContent>>;

    /// Author of every physical line of `path` as of `revision`.
    fn blame(&self, revision: Revision, path: &str) -> Result<Vec<BlameLine>>;
}

/// Graph queries used by the divergence detector.
pub trait CommitGraph {
    /// Every commit reachable from any reference.
    fn reachable(&self) -> Result<Vec<Revision>>;

    fn parents(&self, revision: Revision) -> Result<Vec<Revision>>;

    fn commit_time(&self, revision: Revision) -> Result<i64>;
}

/// `git2::Repository` is not `Sync`; this is what worker threads share instead.
#[derive(Debug, Clone)]
pub struct RepoLocation {
    path: PathBuf,
    overrides: Arc<HashMap<Oid, AuthorName>>,
}

impl RepoLocation {
    pub fn open(&self) -> Result<GitRepo> {
        let repo = Repository::open(&self.path).map_err(|source| Error::NoRepository {
            path: self.path.clone(),
            source,
        })?;
        Ok(GitRepo {
            repo,
            overrides: Arc::clone(&self.overrides),
        })
    }
}

/// A git repository plus the author overrides for this run.
pub struct GitRepo {
    repo: Repository,
    overrides: Arc<HashMap<Oid, AuthorName>>,
}

impl GitRepo {
    /// Open the repository containing `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path).map_err(|source| Error::NoRepository {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Opened git repository at {:?}", repo.path());
        Ok(Self {
            repo,
            overrides: Arc::new(HashMap::new()),
        })
    }

    /// Replace the author of the named revisions. Keys may be abbreviated hashes.
    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Result<Self> {
        let mut resolved = HashMap::with_capacity(overrides.len());
        for (spec, author) in overrides {
            let commit = self
                .repo
                .revparse_single(spec)
                .and_then(|obj| obj.peel_to_commit())
                .map_err(|_| Error::UnknownRevision(spec.clone()))?;
            resolved.insert(commit.id(), AuthorName::from(author.as_str()));
        }
        self.overrides = Arc::new(resolved);
        Ok(self)
    }

    /// Where this repository lives, for opening more handles on other threads.
    pub fn location(&self) -> RepoLocation {
        RepoLocation {
            path: self.repo.path().to_path_buf(),
            overrides: Arc::clone(&self.overrides),
        }
    }

    pub fn inner(&self) -> &Repository {
        &self.repo
    }

    pub fn find_commit(&self, revision: Revision) -> Result<git2::Commit<'_>> {
        Ok(self.repo.find_commit(revision)?)
    }

    /// Decoded content of a blob; `Binary` when git considers it binary.
    pub fn blob_content(&self, blob: Oid) -> Result<FileContent> {
        let blob = self.repo.find_blob(blob)?;
        if blob.is_binary() {
            return Ok(FileContent::Binary);
        }
        Ok(FileContent::Text(decode_text(blob.content())))
    }

    /// Number of files tracked in the tree of `revision`.
    pub fn tracked_files(&self, revision: Revision) -> Result<usize> {
        let tree = self.repo.find_commit(revision)?.tree()?;
        let mut count = 0;
        tree.walk(TreeWalkMode::PreOrder, |_, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                count += 1;
            }
            TreeWalkResult::Ok
        })?;
        Ok(count)
    }

    fn author_of(&self, commit: &git2::Commit<'_>) -> Result<AuthorName> {
        if let Some(author) = self.overrides.get(&commit.id()) {
            return Ok(Arc::clone(author));
        }
        let signature = commit.author();
        let name = String::from_utf8_lossy(signature.name_bytes());
        if name.trim().is_empty() {
            return Err(Error::MissingAuthor {
                revision: commit.id(),
            });
        }
        Ok(AuthorName::from(name.as_ref()))
    }
}

impl RevisionStore for GitRepo {
    fn commit(&self, revision: Revision) -> Result<Commit> {
        let commit = self.repo.find_commit(revision)?;
        Ok(Commit {
            id: revision,
            parents: commit.parent_ids().collect(),
            author: self.author_of(&commit)?,
            timestamp: commit.time().seconds(),
            summary: commit.summary().unwrap_or_default().to_string(),
        })
    }

    fn file_content(&self, revision: Revision, path: &str) -> Result<Option<FileContent>> {
        let tree = self.repo.find_commit(revision)?.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.blob_content(entry.id()).map(Some)
    }

    fn blame(&self, revision: Revision, path: &str) -> Result<Vec<BlameLine>> {
        let mut opts = BlameOptions::new();
        opts.newest_commit(revision);
        let blame = self.repo.blame_file(Path::new(path), Some(&mut opts))?;

        let mut authors: HashMap<Oid, BlameLine> = HashMap::new();
        let mut lines = Vec::new();
        for hunk in blame.iter() {
            let id = hunk.final_commit_id();
            let line = match authors.get(&id) {
                Some(line) => line.clone(),
                None => {
                    let commit = self.commit(id)?;
                    let line = BlameLine {
                        author: commit.author,
                        timestamp: commit.timestamp,
                    };
                    authors.insert(id, line.clone());
                    line
                }
            };
            lines.extend(std::iter::repeat(line).take(hunk.lines_in_hunk()));
        }
        Ok(lines)
    }
}

impl CommitGraph for GitRepo {
    fn reachable(&self) -> Result<Vec<Revision>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_glob("*")?;
        // A detached HEAD is reachable without any reference
        if let Err(e) = revwalk.push_head() {
            debug!("Not walking from HEAD: {}", e);
        }
        revwalk.map(|oid| oid.map_err(Error::from)).collect()
    }

    fn parents(&self, revision: Revision) -> Result<Vec<Revision>> {
        Ok(self.repo.find_commit(revision)?.parent_ids().collect())
    }

    fn commit_time(&self, revision: Revision) -> Result<i64> {
        Ok(self.repo.find_commit(revision)?.time().seconds())
    }
}

/// UTF-8 if possible, otherwise every byte as its Latin-1 code point. Never fails.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            debug!("Content is not valid UTF-8, decoding as Latin-1");
            bytes.iter().map(|&b| b as char).collect()
        }
    }
}
