// src/range.rs

use crate::error::{Error, Result};
use crate::model::{Commit, Revision};
use crate::repo::{GitRepo, RevisionStore};
use git2::{ReferenceType, Repository, Sort};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

pub const HEAD: &str = "HEAD";
pub const ROOT: &str = "ROOT";

/// Revisions between a boundary and a head, in the order they are replayed.
#[derive(Debug, Clone)]
pub struct CommitRange {
    pub head: Revision,
    pub boundary: Revision,
    pub head_commit: Commit,
    pub boundary_commit: Commit,
    /// Branch and tag names per commit, space separated when several apply
    pub markers: HashMap<Revision, String>,
    /// Oldest first, `boundary` at index 0
    pub replay_path: Vec<Revision>,
    positions: HashMap<Revision, usize>,
}

impl CommitRange {
    /// Resolve `head_ref` and `boundary_ref` and compute the replay path.
    ///
    /// `HEAD` and `ROOT` are case-insensitive sentinels; other names are
    /// looked up in the marker table and then handed to `revparse`.
    pub fn resolve(repo: &GitRepo, head_ref: &str, boundary_ref: &str) -> Result<Self> {
        let git = repo.inner();
        let markers = marker_table(git)?;

        let current = || -> Result<Revision> { Ok(git.head()?.peel_to_commit()?.id()) };
        let head = if head_ref.eq_ignore_ascii_case(HEAD) {
            current()?
        } else if head_ref.eq_ignore_ascii_case(ROOT) {
            root_of(git, current()?)?
        } else {
            resolve_name(git, &markers, head_ref)?
        };
        let boundary = if boundary_ref.eq_ignore_ascii_case(HEAD) {
            current()?
        } else if boundary_ref.eq_ignore_ascii_case(ROOT) {
            root_of(git, head)?
        } else {
            resolve_name(git, &markers, boundary_ref)?
        };

        if head != boundary && !git.graph_descendant_of(head, boundary)? {
            return Err(Error::NotAncestor { boundary, head });
        }

        let replay_path = replay_path(git, head, boundary)?;
        let range = Self::from_parts(
            repo.commit(head)?,
            repo.commit(boundary)?,
            markers,
            replay_path,
        );
        info!(
            "Commit range: {}...{} ({} revisions)",
            range.head,
            range.boundary,
            range.replay_path.len()
        );
        Ok(range)
    }

    /// Assemble a range from an already computed replay path.
    pub fn from_parts(
        head_commit: Commit,
        boundary_commit: Commit,
        markers: HashMap<Revision, String>,
        replay_path: Vec<Revision>,
    ) -> Self {
        let positions = replay_path
            .iter()
            .enumerate()
            .map(|(i, rev)| (*rev, i))
            .collect();
        Self {
            head: head_commit.id,
            boundary: boundary_commit.id,
            head_commit,
            boundary_commit,
            markers,
            replay_path,
            positions,
        }
    }

    pub fn contains(&self, revision: &Revision) -> bool {
        self.positions.contains_key(revision)
    }

    /// Index of `revision` in the replay path.
    pub fn position(&self, revision: &Revision) -> Option<usize> {
        self.positions.get(revision).copied()
    }

    pub fn marker(&self, revision: &Revision) -> Option<&str> {
        self.markers.get(revision).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.replay_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replay_path.is_empty()
    }
}

/// Names of all branch heads, tags and remote branches.
///
/// A tag on a commit that already carries a name is appended to that entry.
/// Remote branches never replace a local name.
pub fn marker_table(repo: &Repository) -> Result<HashMap<Revision, String>> {
    let mut branches = Vec::new();
    let mut tags = Vec::new();
    let mut remotes = Vec::new();

    for reference in repo.references()? {
        let reference = reference?;
        if reference.kind() == Some(ReferenceType::Symbolic) {
            continue;
        }
        let Some(name) = reference.name() else {
            continue;
        };
        let Ok(commit) = reference.peel_to_commit() else {
            debug!("Skipping {} as it does not point at a commit", name);
            continue;
        };
        if let Some(short) = name.strip_prefix("refs/heads/") {
            branches.push((short.to_string(), commit.id()));
        } else if let Some(short) = name.strip_prefix("refs/tags/") {
            tags.push((short.to_string(), commit.id()));
        } else if let Some(short) = name.strip_prefix("refs/remotes/") {
            remotes.push((short.to_string(), commit.id()));
        }
    }
    branches.sort();
    tags.sort();
    remotes.sort();

    let mut markers: HashMap<Revision, String> = HashMap::new();
    for (name, id) in branches {
        markers
            .entry(id)
            .and_modify(|m| {
                m.push(' ');
                m.push_str(&name);
            })
            .or_insert(name);
    }
    for (name, id) in tags {
        markers
            .entry(id)
            .and_modify(|m| {
                m.push(' ');
                m.push_str(&name);
            })
            .or_insert(name);
    }
    for (name, id) in remotes {
        markers.entry(id).or_insert(name);
    }
    Ok(markers)
}

fn resolve_name(
    repo: &Repository,
    markers: &HashMap<Revision, String>,
    name: &str,
) -> Result<Revision> {
    let mut matches: Vec<Revision> = markers
        .iter()
        .filter(|(_, names)| names.as_str() == name || names.split(' ').any(|n| n == name))
        .map(|(id, _)| *id)
        .collect();
    matches.sort();
    if let Some(id) = matches.first() {
        return Ok(*id);
    }

    repo.revparse_single(name)
        .and_then(|obj| obj.peel_to_commit())
        .map(|commit| commit.id())
        .map_err(|_| Error::UnknownRevision(name.to_string()))
}

/// First parentless commit reached by following first parents from `from`.
pub fn root_of(repo: &Repository, from: Revision) -> Result<Revision> {
    let mut commit = repo.find_commit(from)?;
    while commit.parent_count() > 0 {
        commit = commit.parent(0)?;
    }
    Ok(commit.id())
}

/// Ancestry-restricted, topologically ordered revisions from `boundary`
/// (inclusive) to `head`, oldest first.
pub fn replay_path(repo: &Repository, head: Revision, boundary: Revision) -> Result<Vec<Revision>> {
    let mut path = vec![boundary];
    if head == boundary {
        return Ok(path);
    }

    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
    revwalk.push(head)?;
    revwalk.hide(boundary)?;

    // Parents come before children, so one pass decides descent from the boundary
    let mut descendants: HashSet<Revision> = HashSet::from([boundary]);
    for oid in revwalk {
        let oid = oid?;
        let commit = repo.find_commit(oid)?;
        if commit.parent_ids().any(|p| descendants.contains(&p)) {
            descendants.insert(oid);
            path.push(oid);
        }
    }
    Ok(path)
}
