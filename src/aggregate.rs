// src/aggregate.rs

use crate::diff::FileChanges;
use crate::model::{Commit, Mode};
use crate::ownership::OwnershipMap;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Share of one author in one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub author: String,
    pub lines: usize,
    pub fraction: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Percentage {
    /// Largest share first
    pub per_file: BTreeMap<String, Vec<Share>>,
    /// Fraction of all attributed lines, summed over every file
    pub per_author_total: BTreeMap<String, f64>,
    pub total_lines: usize,
}

/// Per-file and repository-wide shares of authorship over live, textual files.
///
/// Binary files, deleted files and files without lines contribute nothing.
pub fn percentage(files: &OwnershipMap) -> Percentage {
    // 1. Count lines per author, one file per task
    let counted: Vec<(&String, HashMap<&str, usize>, usize)> = files
        .par_iter()
        .filter(|(_, ownership)| ownership.is_alive() && !ownership.is_binary())
        .map(|(path, ownership)| {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for line in ownership.authored_lines() {
                *counts.entry(line.author.as_ref()).or_default() += 1;
            }
            (path, counts, ownership.authored_lines().len())
        })
        .filter(|(_, _, total)| *total > 0)
        .collect();

    // 2. Fold into file shares and global totals
    let mut result = Percentage::default();
    let mut global: HashMap<&str, usize> = HashMap::new();
    for (path, counts, total) in counted {
        let mut shares: Vec<Share> = counts
            .iter()
            .map(|(author, lines)| Share {
                author: author.to_string(),
                lines: *lines,
                fraction: *lines as f64 / total as f64,
            })
            .collect();
        shares.sort_by(|a, b| b.lines.cmp(&a.lines).then_with(|| a.author.cmp(&b.author)));
        result.per_file.insert(path.clone(), shares);

        for (author, lines) in counts {
            *global.entry(author).or_default() += lines;
        }
        result.total_lines += total;
    }

    for (author, lines) in global {
        result
            .per_author_total
            .insert(author.to_string(), lines as f64 / result.total_lines as f64);
    }
    result
}

/// What one author did across the replayed revisions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Contribution {
    pub commits: usize,
    pub insertions: usize,
    pub deletions: usize,
    pub files_added: usize,
    pub files_modified: usize,
    pub files_deleted: usize,
    pub files_renamed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContributionStats {
    pub by_author: BTreeMap<String, Contribution>,
}

impl ContributionStats {
    pub fn record(&mut self, commit: &Commit, changes: &FileChanges) {
        let entry = self.by_author.entry(commit.author.to_string()).or_default();
        entry.commits += 1;

        for change in changes.values() {
            match change.mode {
                Mode::Add => entry.files_added += 1,
                Mode::Modify | Mode::Conflict => entry.files_modified += 1,
                Mode::Delete => entry.files_deleted += 1,
                Mode::Rename => entry.files_renamed += 1,
            }
            // A conflict hunk spans the whole resolved file, not an edit
            for hunk in change.hunks.iter().filter(|h| h.mode != Mode::Conflict) {
                entry.insertions += hunk.new_len;
                entry.deletions += hunk.prev_len;
            }
        }
    }

    pub fn get(&self, author: &str) -> Option<&Contribution> {
        self.by_author.get(author)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuthorName, Change, FileSection};
    use crate::ownership::Ownership;
    use git2::Oid;
    use std::sync::Arc;

    fn file(path: &str, content: &str, author: &str) -> Ownership {
        Ownership::from_content(path, content, &AuthorName::from(author), 0)
    }

    #[test]
    fn test_single_author_owns_everything() {
        let mut files = OwnershipMap::new();
        files.insert("a.rs".into(), file("a.rs", "1\n2\n3\n", "alice"));

        let result = percentage(&files);
        assert_eq!(result.total_lines, 3);
        assert_eq!(result.per_file["a.rs"].len(), 1);
        assert_eq!(result.per_file["a.rs"][0].fraction, 1.0);
        assert_eq!(result.per_author_total["alice"], 1.0);
    }

    #[test]
    fn test_totals_weigh_by_lines() {
        let mut files = OwnershipMap::new();
        files.insert("a.rs".into(), file("a.rs", "1\n2\n3\n", "alice"));
        files.insert("b.rs".into(), file("b.rs", "1\n", "bob"));

        let result = percentage(&files);
        assert_eq!(result.per_author_total["alice"], 0.75);
        assert_eq!(result.per_author_total["bob"], 0.25);
        let sum: f64 = result.per_author_total.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_binary_and_empty_files_are_skipped() {
        let mut files = OwnershipMap::new();
        files.insert(
            "logo.png".into(),
            Ownership::binary("logo.png", &AuthorName::from("alice"), 0),
        );
        files.insert("empty.py".into(), file("empty.py", "", "bob"));

        let result = percentage(&files);
        assert!(result.per_file.is_empty());
        assert!(result.per_author_total.is_empty());
        assert_eq!(result.total_lines, 0);
    }

    #[test]
    fn test_contributions_count_hunks() {
        let content: Arc<str> = Arc::from("a\nb\n");
        let mut change = Change::new(AuthorName::from("bob"), Mode::Modify);
        change.add_hunk(FileSection {
            prev_start: 1,
            prev_len: 1,
            new_start: 1,
            new_len: 2,
            content,
            source_blob: None,
            mode: Mode::Modify,
        });
        let mut changes = FileChanges::new();
        changes.insert("f.txt".into(), change);
        changes.insert(
            "gone.txt".into(),
            Change::new(AuthorName::from("bob"), Mode::Delete),
        );

        let commit = Commit {
            id: Oid::zero(),
            parents: Vec::new(),
            author: AuthorName::from("bob"),
            timestamp: 0,
            summary: String::new(),
        };
        let mut stats = ContributionStats::default();
        stats.record(&commit, &changes);
        stats.record(&commit, &FileChanges::new());

        let bob = stats.get("bob").unwrap();
        assert_eq!(bob.commits, 2);
        assert_eq!(bob.insertions, 2);
        assert_eq!(bob.deletions, 1);
        assert_eq!(bob.files_modified, 1);
        assert_eq!(bob.files_deleted, 1);
    }
}
