// src/model.rs

use std::sync::Arc;

/// Uniquely identifies a commit
pub type Revision = git2::Oid;

/// Raw author name as recorded on the commit (no identity resolution)
pub type AuthorName = Arc<str>;

/// A single commit as seen by the replay
#[derive(Debug, Clone)]
pub struct Commit {
    pub id: Revision,
    pub parents: Vec<Revision>,
    pub author: AuthorName,
    /// Commit time, seconds since the epoch
    pub timestamp: i64,
    /// First line of the message
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Add,
    Modify,
    Delete,
    Rename,
    Conflict,
}

/// One hunk of a diff. Coordinates follow the unified diff header
/// `@@ -prev_start,prev_len +new_start,new_len @@` and are 1-based; a zero
/// length range starts at the line *before* the affected position.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSection {
    pub prev_start: usize,
    pub prev_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    /// Full content of the file after the change; hunks index into it by
    /// their `new_*` coordinates.
    pub content: Arc<str>,
    /// Blob the `prev_*` coordinates refer to
    pub source_blob: Option<git2::Oid>,
    pub mode: Mode,
}

impl FileSection {
    pub fn new_end(&self) -> usize {
        self.new_start + self.new_len
    }

    pub fn length_delta(&self) -> isize {
        self.new_len as isize - self.prev_len as isize
    }
}

/// Everything one revision did to one path
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub author: AuthorName,
    pub mode: Mode,
    pub previous_path: Option<String>,
    pub hunks: Vec<FileSection>,
    pub is_binary: bool,
}

impl Change {
    pub fn new(author: AuthorName, mode: Mode) -> Self {
        Self {
            author,
            mode,
            previous_path: None,
            hunks: Vec::new(),
            is_binary: false,
        }
    }

    pub fn add_hunk(&mut self, section: FileSection) {
        self.hunks.push(section);
    }
}

/// Provenance of a single line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMetadata {
    pub author: AuthorName,
    /// Line text including its terminator, if any
    pub content: Arc<str>,
    pub timestamp: i64,
}

impl LineMetadata {
    pub fn new(author: AuthorName, content: &str, timestamp: i64) -> Self {
        Self {
            author,
            content: Arc::from(content),
            timestamp,
        }
    }

    /// Placeholder at index 0 of every line sequence
    pub fn sentinel(author: AuthorName, timestamp: i64) -> Self {
        Self::new(author, "", timestamp)
    }
}

/// State of a file as a revision left it
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub revision: Revision,
    pub lines: Arc<Vec<LineMetadata>>,
    /// Number of lines the revision touched
    pub lines_changed: usize,
}

/// Unmerged line of commits that forked off the replay path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivergentBranch {
    /// Nearest branch or tag marker, if any
    pub label: Option<String>,
    /// Replay-path commit the branch forked from
    pub branch_point: Revision,
    /// Divergent commits, oldest first
    pub path: Vec<Revision>,
    /// The chain led back onto the replay path
    pub rejoined: bool,
}

impl DivergentBranch {
    pub fn head(&self) -> Option<Revision> {
        self.path.last().copied()
    }
}

/// Splits text into physical lines, keeping terminators.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}
