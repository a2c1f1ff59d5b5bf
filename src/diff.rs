// src/diff.rs

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::model::{split_lines, Change, Commit, FileSection, Mode};
use crate::repo::{FileContent, GitRepo, RevisionStore};
use git2::{Delta, Diff, DiffDelta, DiffFindOptions, DiffOptions, Oid, Patch, Tree};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-path changes of one revision, ordered by path
pub type FileChanges = BTreeMap<String, Change>;

/// Turns one revision into per-file `Change` records.
pub struct DiffExtractor<'r> {
    repo: &'r GitRepo,
    find_renames: bool,
    ignore_whitespace: bool,
}

impl<'r> DiffExtractor<'r> {
    pub fn new(repo: &'r GitRepo, config: &AnalysisConfig) -> Self {
        Self {
            repo,
            find_renames: config.find_renames,
            ignore_whitespace: config.ignore_whitespace_changes,
        }
    }

    pub fn extract(&self, commit: &Commit) -> Result<FileChanges> {
        let git_commit = self.repo.find_commit(commit.id)?;
        let tree = git_commit.tree()?;

        match commit.parents.len() {
            // Root commits are diffed against the empty tree
            0 => {
                let diff = self.diff_trees(None, &tree)?;
                self.collect_linear(&diff, commit)
            }
            1 => {
                let parent = git_commit.parent(0)?.tree()?;
                let diff = self.diff_trees(Some(&parent), &tree)?;
                self.collect_linear(&diff, commit)
            }
            2 => {
                let first = git_commit.parent(0)?.tree()?;
                let second = git_commit.parent(1)?.tree()?;
                self.collect_merge(&first, &second, &tree, commit)
            }
            n => {
                warn!(
                    "Octopus merge detected: {} parents for commit {}. This commit will hold no diffs.",
                    n, commit.id
                );
                Ok(FileChanges::new())
            }
        }
    }

    fn diff_trees(&self, base: Option<&Tree<'_>>, tree: &Tree<'_>) -> Result<Diff<'r>> {
        let mut diff_opts = DiffOptions::new();
        diff_opts.context_lines(0);
        diff_opts.ignore_filemode(true);
        diff_opts.ignore_whitespace_change(self.ignore_whitespace);

        let mut diff = self
            .repo
            .inner()
            .diff_tree_to_tree(base, Some(tree), Some(&mut diff_opts))?;
        if self.find_renames {
            diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;
        }
        Ok(diff)
    }

    fn collect_linear(&self, diff: &Diff<'_>, commit: &Commit) -> Result<FileChanges> {
        let mut changes = FileChanges::new();

        for (idx, delta) in diff.deltas().enumerate() {
            let old_path = delta.old_file().path().map(path_string);
            let new_path = delta.new_file().path().map(path_string);

            let (mode, path) = match delta.status() {
                Delta::Added | Delta::Copied => (Mode::Add, new_path),
                Delta::Deleted => (Mode::Delete, old_path.clone()),
                Delta::Renamed => (Mode::Rename, new_path),
                Delta::Modified | Delta::Typechange => (Mode::Modify, new_path),
                _ => continue,
            };
            let Some(path) = path else {
                continue;
            };

            let mut change = Change::new(Arc::clone(&commit.author), mode);
            if mode == Mode::Rename {
                change.previous_path = old_path;
            }

            let content = self.read_side(&delta, mode, &path, commit);
            let source_blob = non_zero(delta.old_file().id());

            let Some(content) = content else {
                change.is_binary = mode != Mode::Rename;
                changes.insert(path, change);
                continue;
            };

            if let Some(patch) = Patch::from_diff(diff, idx)? {
                for h in 0..patch.num_hunks() {
                    let (hunk, _) = patch.hunk(h)?;
                    change.add_hunk(FileSection {
                        prev_start: hunk.old_start() as usize,
                        prev_len: hunk.old_lines() as usize,
                        new_start: hunk.new_start() as usize,
                        new_len: hunk.new_lines() as usize,
                        content: Arc::clone(&content),
                        source_blob,
                        mode: hunk_mode(mode),
                    });
                }
            }
            if change.hunks.is_empty() && mode != Mode::Rename {
                change.is_binary = true;
            }
            changes.insert(path, change);
        }

        Ok(changes)
    }

    /// Content the hunks index into: the new blob, or the old one for deletions.
    fn read_side(
        &self,
        delta: &DiffDelta<'_>,
        mode: Mode,
        path: &str,
        commit: &Commit,
    ) -> Option<Arc<str>> {
        let blob = if mode == Mode::Delete {
            delta.old_file().id()
        } else {
            delta.new_file().id()
        };
        match self.repo.blob_content(blob) {
            Ok(FileContent::Text(text)) => Some(Arc::from(text)),
            Ok(FileContent::Binary) => {
                debug!("{} is binary in commit {}", path, commit.id);
                None
            }
            Err(e) => {
                if mode != Mode::Rename {
                    warn!(
                        "Could not read content of {} in commit {}, marking it as binary: {}",
                        path, commit.id, e
                    );
                }
                None
            }
        }
    }

    /// Files of a two-parent merge whose result has lines that come from
    /// neither parent. Files merged cleanly, where every region of the result
    /// matches one parent or the other, yield no change. The content of each
    /// conflict comes from the merge commit itself and is recorded as a single
    /// conflict hunk.
    fn collect_merge(
        &self,
        first: &Tree<'_>,
        second: &Tree<'_>,
        tree: &Tree<'_>,
        commit: &Commit,
    ) -> Result<FileChanges> {
        let from_first = self.diff_trees(Some(first), tree)?;
        let from_second = self.diff_trees(Some(second), tree)?;

        let mut touched_second: HashMap<String, (usize, Delta)> = HashMap::new();
        for (idx, delta) in from_second.deltas().enumerate() {
            if let Some(path) = delta_path(&delta) {
                touched_second.insert(path, (idx, delta.status()));
            }
        }

        let mut changes = FileChanges::new();
        for (idx, delta) in from_first.deltas().enumerate() {
            let Some(path) = delta_path(&delta) else {
                continue;
            };
            let Some(&(other_idx, other)) = touched_second.get(&path) else {
                continue;
            };

            if delta.status() == Delta::Deleted && other == Delta::Deleted {
                changes.insert(path, Change::new(Arc::clone(&commit.author), Mode::Delete));
                continue;
            }

            if !differs_from_both(&from_first, idx, &from_second, other_idx)? {
                debug!("{} was merged cleanly in {}", path, commit.id);
                continue;
            }

            let mut change = Change::new(Arc::clone(&commit.author), Mode::Conflict);
            if delta.status() == Delta::Renamed {
                change.previous_path = delta.old_file().path().map(path_string);
            }

            match self.repo.file_content(commit.id, &path) {
                Ok(Some(FileContent::Text(text))) => {
                    warn!(
                        "There is a conflict in file {}. Commit: {}. Ownership will be transferred to the author of this commit.",
                        path, commit.id
                    );
                    let new_len = split_lines(&text).len();
                    change.add_hunk(FileSection {
                        prev_start: 0,
                        prev_len: 0,
                        new_start: 1,
                        new_len,
                        content: Arc::from(text),
                        source_blob: non_zero(delta.old_file().id()),
                        mode: Mode::Conflict,
                    });
                }
                Ok(_) => {
                    warn!(
                        "Resolved file {} of merge {} is not readable text, marking it as binary",
                        path, commit.id
                    );
                    change.is_binary = true;
                }
                Err(e) => {
                    warn!(
                        "There is a conflict and the resolved file {} could not be read! Commit: {}. Marking it as binary: {}",
                        path, commit.id, e
                    );
                    change.is_binary = true;
                }
            }
            changes.insert(path, change);
        }

        Ok(changes)
    }
}

/// Whether a region of the merge result differs from both parents.
///
/// Without a line view of either side (binary content) the whole file counts
/// as differing.
fn differs_from_both(
    first: &Diff<'_>,
    first_idx: usize,
    second: &Diff<'_>,
    second_idx: usize,
) -> Result<bool> {
    let (Some(ours), Some(theirs)) = (new_ranges(first, first_idx)?, new_ranges(second, second_idx)?)
    else {
        return Ok(true);
    };
    Ok(ours.iter().any(|a| theirs.iter().any(|b| collide(a, b))))
}

/// New-side line ranges of every hunk of one delta. A pure deletion is the
/// empty range at the line it follows.
fn new_ranges(diff: &Diff<'_>, idx: usize) -> Result<Option<Vec<Range<usize>>>> {
    let Some(patch) = Patch::from_diff(diff, idx)? else {
        return Ok(None);
    };
    if patch.num_hunks() == 0 {
        return Ok(None);
    }
    let mut ranges = Vec::with_capacity(patch.num_hunks());
    for h in 0..patch.num_hunks() {
        let (hunk, _) = patch.hunk(h)?;
        let start = hunk.new_start() as usize;
        ranges.push(start..start + hunk.new_lines() as usize);
    }
    Ok(Some(ranges))
}

fn collide(a: &Range<usize>, b: &Range<usize>) -> bool {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => a.start == b.start,
        (true, false) => gap_inside(a.start, b),
        (false, true) => gap_inside(b.start, a),
        (false, false) => a.start < b.end && b.start < a.end,
    }
}

/// Whether the gap after line `gap` lies between two lines of `lines`.
fn gap_inside(gap: usize, lines: &Range<usize>) -> bool {
    lines.start <= gap && gap + 1 < lines.end
}

fn hunk_mode(mode: Mode) -> Mode {
    match mode {
        // Content edits that accompany a rename are ordinary modifications
        Mode::Rename => Mode::Modify,
        other => other,
    }
}

fn delta_path(delta: &DiffDelta<'_>) -> Option<String> {
    delta
        .new_file()
        .path()
        .or_else(|| delta.old_file().path())
        .map(path_string)
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn non_zero(id: Oid) -> Option<Oid> {
    (!id.is_zero()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disjoint_edits_do_not_collide() {
        assert!(!collide(&(1..2), &(10..11)));
        assert!(!collide(&(1..2), &(2..3)));
    }

    #[test]
    fn test_shared_lines_collide() {
        assert!(collide(&(1..3), &(2..4)));
        assert!(collide(&(5..6), &(5..6)));
    }

    #[test]
    fn test_deletions_collide_at_same_gap() {
        assert!(collide(&(4..4), &(4..4)));
        assert!(!collide(&(4..4), &(7..7)));
        // gap after line 4 sits between lines 4 and 5
        assert!(collide(&(4..4), &(3..6)));
        assert!(!collide(&(4..4), &(5..7)));
    }
}
