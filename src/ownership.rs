// src/ownership.rs

use crate::diff::FileChanges;
use crate::model::{split_lines, AuthorName, Change, Commit, FileSection, LineMetadata, Mode, Revision, Snapshot};
use crate::repo::{FileContent, RevisionStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Author of lines that predate the window when no blame is available
pub const UNKNOWN_AUTHOR: &str = "?";

/// Marker line count of binary and empty files
pub const BINARY_LINE_COUNT: i64 = -1;

/// Final ownership of every path seen during a replay
pub type OwnershipMap = HashMap<String, Ownership>;

/// Hunk coordinates that do not fit the tracked state. The engine answers
/// this by rebuilding the file from a full blame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HunkError {
    #[error("hunk touches entry {index} but the file has {len} entries")]
    IndexOutOfRange { index: isize, len: usize },
}

/// Line-by-line authorship of one path.
///
/// `lines[0]` is a sentinel standing for the position before the first real
/// line; real lines occupy `1..=line_count`. Binary and empty files keep only
/// the sentinel and report a line count of -1. Deleted files have no lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Ownership {
    pub path: String,
    lines: Arc<Vec<LineMetadata>>,
    line_count: i64,
    alive: bool,
    snapshots: Vec<Snapshot>,
}

impl Ownership {
    /// A live file built from its full content, every line by `author`.
    pub fn from_content(path: &str, content: &str, author: &AuthorName, timestamp: i64) -> Self {
        let mut ownership = Self {
            path: path.to_string(),
            lines: Arc::new(Vec::new()),
            line_count: 0,
            alive: true,
            snapshots: Vec::new(),
        };
        ownership.set_content(content, author, timestamp);
        ownership
    }

    pub fn binary(path: &str, author: &AuthorName, timestamp: i64) -> Self {
        Self {
            path: path.to_string(),
            lines: Arc::new(vec![LineMetadata::sentinel(Arc::clone(author), timestamp)]),
            line_count: BINARY_LINE_COUNT,
            alive: true,
            snapshots: Vec::new(),
        }
    }

    fn from_lines(path: &str, lines: Vec<LineMetadata>) -> Self {
        Self {
            path: path.to_string(),
            line_count: lines.len() as i64 - 1,
            lines: Arc::new(lines),
            alive: true,
            snapshots: Vec::new(),
        }
    }

    pub fn lines(&self) -> &[LineMetadata] {
        &self.lines
    }

    /// Real lines, without the sentinel
    pub fn authored_lines(&self) -> &[LineMetadata] {
        self.lines.get(1..).unwrap_or(&[])
    }

    pub fn line_count(&self) -> i64 {
        self.line_count
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_binary(&self) -> bool {
        self.line_count == BINARY_LINE_COUNT
    }

    /// Snapshots in replay order
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn snapshot(&self, revision: &Revision) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.revision == *revision)
    }

    pub fn content(&self) -> String {
        self.lines.iter().map(|l| l.content.as_ref()).collect()
    }

    fn set_content(&mut self, content: &str, author: &AuthorName, timestamp: i64) {
        let lines = build_lines(content, author, timestamp);
        if lines.len() == 1 {
            self.lines = Arc::new(lines);
            self.line_count = BINARY_LINE_COUNT;
        } else {
            self.line_count = lines.len() as i64 - 1;
            self.lines = Arc::new(lines);
        }
        self.alive = true;
    }

    fn mark_binary(&mut self, author: &AuthorName, timestamp: i64) {
        self.lines = Arc::new(vec![LineMetadata::sentinel(Arc::clone(author), timestamp)]);
        self.line_count = BINARY_LINE_COUNT;
        self.alive = true;
    }

    fn delete(&mut self, revision: Revision) {
        self.record(revision, self.line_count.max(0) as usize);
        self.lines = Arc::new(Vec::new());
        self.line_count = 0;
        self.alive = false;
    }

    /// Keep the current lines as the state `revision` left behind.
    fn record(&mut self, revision: Revision, lines_changed: usize) {
        let snapshot = Snapshot {
            revision,
            lines: Arc::clone(&self.lines),
            lines_changed,
        };
        match self.snapshots.last_mut() {
            Some(last) if last.revision == revision => *last = snapshot,
            _ => self.snapshots.push(snapshot),
        }
    }

    /// Apply the hunks of one change and return the number of lines touched.
    ///
    /// Hunk coordinates refer to the file before the change, so a running
    /// offset tracks how far the already applied hunks moved the rest of the
    /// file. On error the tracked state is left untouched.
    pub fn apply_hunks(
        &mut self,
        hunks: &[FileSection],
        author: &AuthorName,
        timestamp: i64,
    ) -> Result<usize, HunkError> {
        let mut lines: Vec<LineMetadata> = self.lines.as_ref().clone();
        let mut line_count = self.line_count;
        let mut offset: isize = 0;
        let mut touched = 0;
        let prev_had_terminator = self
            .authored_lines()
            .last()
            .map_or(true, |l| l.content.ends_with('\n'));

        let mut split_cache: Option<(Arc<str>, Vec<&str>)> = None;

        for hunk in hunks {
            if hunk.mode == Mode::Conflict {
                lines = build_lines(&hunk.content, author, timestamp);
                line_count = lines.len() as i64 - 1;
                touched += lines.len() - 1;
                offset += hunk.length_delta();
                continue;
            }

            if split_cache
                .as_ref()
                .map_or(true, |(content, _)| !Arc::ptr_eq(content, &hunk.content))
            {
                split_cache = Some((Arc::clone(&hunk.content), split_lines(&hunk.content)));
            }
            let Some((_, split)) = split_cache.as_mut() else {
                continue;
            };

            if hunk.prev_len == 0 {
                // Insertion after old line `prev_start`
                let new_len = fix_length(hunk, split, prev_had_terminator);
                let fresh = new_lines(hunk, new_len, split, author, timestamp)?;
                let at = checked_index(hunk.prev_start as isize + offset + 1, lines.len())?;
                lines.splice(at..at, fresh);
                offset += new_len as isize;
                touched += new_len;
                line_count += new_len as i64;
            } else if hunk.new_len == 0 {
                // Deletion, located by the post-change coordinate: the block
                // starts right after new line `new_start`
                let at = checked_index(hunk.new_start as isize + 1, lines.len())?;
                let end = at + hunk.prev_len;
                if end > lines.len() {
                    return Err(HunkError::IndexOutOfRange {
                        index: end as isize - 1,
                        len: lines.len(),
                    });
                }
                lines.drain(at..end);
                offset -= hunk.prev_len as isize;
                touched += hunk.prev_len;
                line_count -= hunk.prev_len as i64;
            } else {
                let new_len = fix_length(hunk, split, prev_had_terminator);
                let mut fresh = new_lines(hunk, new_len, split, author, timestamp)?;
                let at = checked_index(hunk.prev_start as isize + offset, lines.len())?;
                let end = at + hunk.prev_len;
                if at == 0 || end > lines.len() {
                    return Err(HunkError::IndexOutOfRange {
                        index: end as isize - 1,
                        len: lines.len(),
                    });
                }

                // A new line equal (ignoring surrounding whitespace) to the
                // removed line at the same relative position keeps its author
                for (new, old) in fresh.iter_mut().zip(&lines[at..end]) {
                    if new.content.trim() == old.content.trim() {
                        new.author = Arc::clone(&old.author);
                    }
                }

                let delta = new_len as isize - hunk.prev_len as isize;
                lines.splice(at..end, fresh);
                offset += delta;
                touched += new_len.max(hunk.prev_len);
                line_count += delta as i64;
            }
        }

        debug_assert_eq!(lines.len() as i64, line_count + 1);
        self.lines = Arc::new(lines);
        self.line_count = line_count;
        Ok(touched)
    }
}

/// Reconciles a hunk's new range with the physical lines of its content.
///
/// libgit2 reports a change to the final terminator as a modification of the
/// last line, so a range ending at the last physical line already matches the
/// split content and is left alone. Only a range that claims one line past
/// the end is reconciled: the claimed length shrinks by one when the
/// terminator was removed, and an empty physical line is appended when it was
/// added.
pub fn fix_length(hunk: &FileSection, split: &mut Vec<&str>, prev_had_terminator: bool) -> usize {
    let mut new_len = hunk.new_len;
    let has_terminator = split.last().map_or(false, |l| l.ends_with('\n'));
    if hunk.new_end() == split.len() + 2 {
        if !has_terminator && prev_had_terminator {
            new_len -= 1;
        } else if has_terminator && !prev_had_terminator {
            split.push("");
        }
    }
    new_len
}

fn new_lines(
    hunk: &FileSection,
    new_len: usize,
    split: &[&str],
    author: &AuthorName,
    timestamp: i64,
) -> Result<Vec<LineMetadata>, HunkError> {
    let first = hunk.new_start.saturating_sub(1);
    (first..first + new_len)
        .map(|i| {
            split
                .get(i)
                .map(|text| LineMetadata::new(Arc::clone(author), text, timestamp))
                .ok_or(HunkError::IndexOutOfRange {
                    index: i as isize,
                    len: split.len(),
                })
        })
        .collect()
}

fn checked_index(index: isize, bound: usize) -> Result<usize, HunkError> {
    if index < 1 || index as usize > bound {
        return Err(HunkError::IndexOutOfRange { index, len: bound });
    }
    Ok(index as usize)
}

/// Sentinel plus one entry per physical line of `content`.
fn build_lines(content: &str, author: &AuthorName, timestamp: i64) -> Vec<LineMetadata> {
    let mut lines = vec![LineMetadata::sentinel(Arc::clone(author), timestamp)];
    lines.extend(
        split_lines(content)
            .into_iter()
            .map(|text| LineMetadata::new(Arc::clone(author), text, timestamp)),
    );
    lines
}

/// Owns the per-path ownership state for the duration of a replay and
/// applies changes to it, one (revision, path) at a time, in replay order.
pub struct OwnershipEngine<'s, S: RevisionStore + ?Sized> {
    store: &'s S,
    blame_unseen: bool,
    files: OwnershipMap,
    /// Rename sources taken out of `files` while a revision is applied
    detached: OwnershipMap,
}

impl<'s, S: RevisionStore + ?Sized> OwnershipEngine<'s, S> {
    pub fn new(store: &'s S, blame_unseen: bool) -> Self {
        Self {
            store,
            blame_unseen,
            files: OwnershipMap::new(),
            detached: OwnershipMap::new(),
        }
    }

    pub fn files(&self) -> &OwnershipMap {
        &self.files
    }

    pub fn get(&self, path: &str) -> Option<&Ownership> {
        self.files.get(path)
    }

    pub fn into_files(self) -> OwnershipMap {
        self.files
    }

    /// Apply every change of one revision: renames first, then the rest in
    /// path order.
    pub fn apply_revision(&mut self, changes: &FileChanges, commit: &Commit) {
        // Rename sources leave the map up front so swapped names cannot clobber each other
        for change in changes.values() {
            let Some(source) = change.previous_path.as_deref() else {
                continue;
            };
            if self.files.get(source).is_some_and(Ownership::is_alive) {
                if let Some(ownership) = self.files.remove(source) {
                    self.detached.insert(source.to_string(), ownership);
                }
            }
        }

        let (renames, others): (Vec<_>, Vec<_>) = changes
            .iter()
            .partition(|(_, change)| change.previous_path.is_some());
        for (path, change) in renames.into_iter().chain(others) {
            self.apply_change(path, change, commit);
        }

        for (source, ownership) in self.detached.drain() {
            debug!("Rename source {} was not consumed in {}", source, commit.id);
            self.files.entry(source).or_insert(ownership);
        }
    }

    pub fn apply_change(&mut self, path: &str, change: &Change, commit: &Commit) {
        let state = self.files.get(path).map(Ownership::is_alive);

        match (change.mode, state) {
            (Mode::Delete, Some(true)) => {
                if let Some(ownership) = self.files.get_mut(path) {
                    ownership.delete(commit.id);
                }
            }
            (Mode::Delete, _) => {
                debug!("{} deleted in {} without being tracked", path, commit.id);
            }
            (Mode::Add, None) => {
                let mut ownership = fresh_ownership(path, change, commit);
                ownership.record(commit.id, ownership.line_count.max(0) as usize);
                self.files.insert(path.to_string(), ownership);
            }
            (Mode::Add, Some(alive)) => {
                if alive {
                    warn!(
                        "File {} was added in a previous commit as well as in commit {}. Replacing it, this may lose information (case-insensitive file systems or a later merge conflict can cause this).",
                        path, commit.id
                    );
                }
                if let Some(ownership) = self.files.get_mut(path) {
                    replace_content(ownership, change, commit);
                    ownership.record(commit.id, ownership.line_count.max(0) as usize);
                }
            }
            (Mode::Rename, _) => self.apply_rename(path, change, commit),
            (Mode::Modify, Some(true)) | (Mode::Conflict, Some(true)) => {
                self.apply_to_existing(path, change, commit);
            }
            (Mode::Modify, _) => self.populate_unseen(path, change, commit),
            (Mode::Conflict, _) => {
                if !self.move_live(change.previous_path.as_deref(), path) {
                    match self.files.get_mut(path) {
                        Some(ownership) => replace_content(ownership, change, commit),
                        None => {
                            let ownership = fresh_ownership(path, change, commit);
                            self.files.insert(path.to_string(), ownership);
                        }
                    }
                }
                self.apply_to_existing(path, change, commit);
            }
        }
    }

    fn apply_rename(&mut self, path: &str, change: &Change, commit: &Commit) {
        if !self.move_live(change.previous_path.as_deref(), path) {
            self.populate_unseen(path, change, commit);
            return;
        }
        if change.is_binary || !change.hunks.is_empty() {
            self.apply_to_existing(path, change, commit);
        }
    }

    /// Re-key the live ownership at `from` to `to` without copying lines.
    fn move_live(&mut self, from: Option<&str>, to: &str) -> bool {
        let Some(from) = from else {
            return false;
        };
        let ownership = match self.detached.remove(from) {
            Some(ownership) => Some(ownership),
            None if self.files.get(from).is_some_and(Ownership::is_alive) => self.files.remove(from),
            None => None,
        };
        let Some(mut ownership) = ownership else {
            return false;
        };
        ownership.path = to.to_string();
        if let Some(replaced) = self.files.insert(to.to_string(), ownership) {
            if replaced.is_alive() {
                warn!("Rename of {} onto {} replaced a live file", from, to);
            }
        }
        true
    }

    fn apply_to_existing(&mut self, path: &str, change: &Change, commit: &Commit) {
        let Some(ownership) = self.files.get_mut(path) else {
            return;
        };

        if change.is_binary {
            ownership.mark_binary(&change.author, commit.timestamp);
            ownership.record(commit.id, 1);
            return;
        }

        if ownership.is_binary() {
            // Text hunks that only insert at the top come from a diff against
            // an empty file; anything else leaves the placeholder in place.
            let from_empty = !change.hunks.is_empty()
                && change.hunks.iter().all(|h| h.prev_start == 0 && h.prev_len == 0);
            match change.hunks.first() {
                Some(hunk) if from_empty => {
                    ownership.set_content(&hunk.content, &change.author, commit.timestamp)
                }
                _ => ownership.mark_binary(&change.author, commit.timestamp),
            }
            ownership.record(commit.id, ownership.line_count.max(1) as usize);
            return;
        }

        match ownership.apply_hunks(&change.hunks, &change.author, commit.timestamp) {
            Ok(touched) => ownership.record(commit.id, touched),
            Err(e) => {
                warn!(
                    "Unexpected hunk in {} at commit {} ({}), rebuilding the file from blame",
                    path, commit.id, e
                );
                self.deep_blame(path, commit);
            }
        }
    }

    /// First sighting of a path that already existed before the window: the
    /// file is read at the change's base revision (and optionally blamed
    /// there) before the change itself is applied.
    pub fn populate_unseen(&mut self, path: &str, change: &Change, commit: &Commit) {
        let source = change.previous_path.as_deref().unwrap_or(path);
        let unknown = AuthorName::from(UNKNOWN_AUTHOR);

        let ownership = match commit.parents.first() {
            Some(base) => {
                let base_timestamp = self
                    .store
                    .commit(*base)
                    .map(|c| c.timestamp)
                    .unwrap_or(commit.timestamp);
                match self.read_lines(*base, source, &unknown, base_timestamp, self.blame_unseen) {
                    Some(lines) => Ownership::from_lines(path, lines),
                    None => Ownership::binary(path, &unknown, base_timestamp),
                }
            }
            None => {
                warn!("{} changed in root commit {} without being added", path, commit.id);
                Ownership::binary(path, &unknown, commit.timestamp)
            }
        };
        if let Some(previous) = self.files.insert(path.to_string(), ownership) {
            // Keep the history of an earlier, deleted incarnation
            if let Some(current) = self.files.get_mut(path) {
                current.snapshots = previous.snapshots;
            }
        }
        self.apply_to_existing(path, change, commit);
    }

    /// Rebuild a file wholesale from its blame at `commit`, replacing the
    /// tracked lines. Unreadable content degrades the file to binary.
    pub fn deep_blame(&mut self, path: &str, commit: &Commit) {
        let rebuilt = self.read_lines(commit.id, path, &commit.author, commit.timestamp, true);
        let Some(ownership) = self.files.get_mut(path) else {
            return;
        };
        match rebuilt {
            Some(lines) => {
                ownership.line_count = lines.len() as i64 - 1;
                ownership.lines = Arc::new(lines);
                ownership.alive = true;
            }
            None => ownership.mark_binary(&commit.author, commit.timestamp),
        }
        ownership.record(commit.id, ownership.line_count.max(0) as usize);
    }

    /// Lines of `path` at `revision`, attributed by blame when `blame` is set
    /// and to `author` otherwise. `None` if the content is binary or unreadable.
    fn read_lines(
        &self,
        revision: Revision,
        path: &str,
        author: &AuthorName,
        timestamp: i64,
        blame: bool,
    ) -> Option<Vec<LineMetadata>> {
        let content = match self.store.file_content(revision, path) {
            Ok(Some(FileContent::Text(text))) => text,
            Ok(Some(FileContent::Binary)) => return None,
            Ok(None) => {
                warn!("{} does not exist at {}, marking it as binary", path, revision);
                return None;
            }
            Err(e) => {
                warn!("Could not read {} at {}, marking it as binary: {}", path, revision, e);
                return None;
            }
        };

        let mut lines = build_lines(&content, author, timestamp);
        if !blame {
            return Some(lines);
        }
        match self.store.blame(revision, path) {
            Ok(blamed) if blamed.len() + 1 == lines.len() => {
                for (line, origin) in lines[1..].iter_mut().zip(blamed) {
                    line.author = origin.author;
                    line.timestamp = origin.timestamp;
                }
            }
            Ok(blamed) => warn!(
                "Blame of {} at {} covers {} lines but the file has {}, keeping '{}'",
                path,
                revision,
                blamed.len(),
                lines.len() - 1,
                author
            ),
            Err(e) => warn!("Could not blame {} at {}: {}", path, revision, e),
        }
        Some(lines)
    }
}

fn fresh_ownership(path: &str, change: &Change, commit: &Commit) -> Ownership {
    match change.hunks.first() {
        Some(hunk) if !change.is_binary => {
            Ownership::from_content(path, &hunk.content, &change.author, commit.timestamp)
        }
        _ => Ownership::binary(path, &change.author, commit.timestamp),
    }
}

fn replace_content(ownership: &mut Ownership, change: &Change, commit: &Commit) {
    match change.hunks.first() {
        Some(hunk) if !change.is_binary => {
            ownership.set_content(&hunk.content, &change.author, commit.timestamp)
        }
        _ => ownership.mark_binary(&change.author, commit.timestamp),
    }
}
