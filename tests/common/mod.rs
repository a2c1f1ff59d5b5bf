// tests/common/mod.rs

#![allow(dead_code)]

use git2::{Oid, Repository, Signature, Time};
use git_lineage::ownership::Ownership;
use git_lineage::{AnalysisConfig, GitRepo};
use tempfile::TempDir;

/// Scratch repository whose history is written object by object, so every
/// commit gets exactly the author, time and parents a test asks for.
pub struct Fixture {
    pub dir: TempDir,
    pub repo: Repository,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        repo.set_head("refs/heads/master").unwrap();
        Self { dir, repo }
    }

    /// Commit on top of `parents`, starting from the first parent's tree.
    /// `None` removes the file.
    pub fn commit(
        &self,
        parents: &[Oid],
        author: &str,
        time: i64,
        message: &str,
        files: &[(&str, Option<&str>)],
    ) -> Oid {
        let blobs: Vec<(&str, Option<Oid>)> = files
            .iter()
            .map(|(path, content)| {
                (*path, content.map(|c| self.repo.blob(c.as_bytes()).unwrap()))
            })
            .collect();
        self.commit_blobs(parents, author, time, message, &blobs)
    }

    pub fn commit_bytes(
        &self,
        parents: &[Oid],
        author: &str,
        time: i64,
        path: &str,
        bytes: &[u8],
    ) -> Oid {
        let blob = self.repo.blob(bytes).unwrap();
        self.commit_blobs(parents, author, time, "binary", &[(path, Some(blob))])
    }

    fn commit_blobs(
        &self,
        parents: &[Oid],
        author: &str,
        time: i64,
        message: &str,
        files: &[(&str, Option<Oid>)],
    ) -> Oid {
        let parents: Vec<git2::Commit<'_>> = parents
            .iter()
            .map(|id| self.repo.find_commit(*id).unwrap())
            .collect();
        let base = parents.first().map(|p| p.tree().unwrap());
        let mut builder = self.repo.treebuilder(base.as_ref()).unwrap();
        for (path, blob) in files {
            match blob {
                Some(blob) => {
                    builder.insert(path, *blob, 0o100644).unwrap();
                }
                None => builder.remove(path).unwrap(),
            }
        }
        let tree = self.repo.find_tree(builder.write().unwrap()).unwrap();

        let email = format!("{}@example.com", author.to_lowercase());
        let sig = Signature::new(author, &email, &Time::new(time, 0)).unwrap();
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        self.repo
            .commit(None, &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }

    pub fn branch(&self, name: &str, target: Oid) {
        self.repo
            .reference(&format!("refs/heads/{}", name), target, true, "test")
            .unwrap();
    }

    pub fn tag(&self, name: &str, target: Oid) {
        let object = self.repo.find_object(target, None).unwrap();
        self.repo.tag_lightweight(name, &object, false).unwrap();
    }

    pub fn open(&self) -> GitRepo {
        GitRepo::open(self.dir.path()).unwrap()
    }
}

pub fn config() -> AnalysisConfig {
    AnalysisConfig {
        progress: false,
        ..AnalysisConfig::default()
    }
}

pub fn numbered(range: std::ops::RangeInclusive<usize>) -> String {
    range.map(|i| format!("line {}\n", i)).collect()
}

pub fn authors(ownership: &Ownership) -> Vec<&str> {
    ownership
        .authored_lines()
        .iter()
        .map(|l| l.author.as_ref())
        .collect()
}
