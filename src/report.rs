// src/report.rs

use anyhow::Result;
use chrono::TimeZone;
use git_lineage::aggregate::{Contribution, Percentage, Share};
use git_lineage::model::{DivergentBranch, Revision};
use git_lineage::repo::RevisionStore;
use git_lineage::{Analysis, CommitRange, GitRepo};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub head: String,
    pub boundary: String,
    pub revisions: usize,
    pub replayed: usize,
    pub completed: bool,
    pub tracked_files: usize,
    pub analyzed_files: usize,
    pub authors: &'a BTreeMap<String, f64>,
    pub total_lines: usize,
    pub contributions: &'a BTreeMap<String, Contribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<&'a BTreeMap<String, Vec<Share>>>,
    pub divergent: Vec<BranchReport>,
}

#[derive(Debug, Serialize)]
pub struct BranchReport {
    pub label: Option<String>,
    pub branch_point: String,
    pub rejoined: bool,
    pub commits: Vec<CommitReport>,
}

#[derive(Debug, Serialize)]
pub struct CommitReport {
    pub id: String,
    pub author: String,
    pub summary: String,
}

impl<'a> Report<'a> {
    pub fn build(
        repo: &GitRepo,
        range: &CommitRange,
        analysis: &'a Analysis,
        percentage: &'a Percentage,
        divergent: &[DivergentBranch],
        with_files: bool,
    ) -> Result<Self> {
        let divergent = divergent
            .iter()
            .map(|branch| branch_report(repo, branch))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            head: range.head.to_string(),
            boundary: range.boundary.to_string(),
            revisions: range.len(),
            replayed: analysis.replayed,
            completed: analysis.completed,
            tracked_files: analysis.tracked_files,
            analyzed_files: analysis.files.len(),
            authors: &percentage.per_author_total,
            total_lines: percentage.total_lines,
            contributions: &analysis.contributions.by_author,
            files: with_files.then_some(&percentage.per_file),
            divergent,
        })
    }

    pub fn print_json(&self) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }

    pub fn print_text(&self, range: &CommitRange) {
        println!(
            "Replayed {} of {} revisions ({}..{}).",
            self.replayed,
            self.revisions,
            short(&range.boundary),
            short(&range.head)
        );
        println!(
            "History spans from {} to {}.",
            format_time(range.boundary_commit.timestamp),
            format_time(range.head_commit.timestamp)
        );
        if !self.completed {
            println!("The replay was cancelled, results cover a prefix of the range.");
        }
        println!(
            "{} files tracked at head, {} analyzed, {} attributed lines.",
            self.tracked_files, self.analyzed_files, self.total_lines
        );

        println!();
        println!("Ownership by author:");
        let mut authors: Vec<(&String, &f64)> = self.authors.iter().collect();
        authors.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (author, fraction) in authors {
            let contribution = self.contributions.get(author);
            println!(
                "  {:>6.2}%  {}  ({} commits, +{} -{})",
                fraction * 100.0,
                author,
                contribution.map_or(0, |c| c.commits),
                contribution.map_or(0, |c| c.insertions),
                contribution.map_or(0, |c| c.deletions)
            );
        }

        if let Some(files) = self.files {
            println!();
            println!("Ownership by file:");
            for (path, shares) in files {
                let owners: Vec<String> = shares
                    .iter()
                    .map(|s| format!("{} {:.0}%", s.author, s.fraction * 100.0))
                    .collect();
                println!("  {}: {}", path, owners.join(", "));
            }
        }

        if !self.divergent.is_empty() {
            println!();
            println!("Divergent branches:");
            for branch in &self.divergent {
                println!(
                    "  {} (from {}{}):",
                    branch.label.as_deref().unwrap_or("<unnamed>"),
                    &branch.branch_point[..branch.branch_point.len().min(8)],
                    if branch.rejoined { ", rejoined" } else { "" }
                );
                for commit in &branch.commits {
                    println!(
                        "    {} {} ({})",
                        &commit.id[..commit.id.len().min(8)],
                        commit.summary,
                        commit.author
                    );
                }
            }
        }
    }
}

fn branch_report(repo: &GitRepo, branch: &DivergentBranch) -> Result<BranchReport> {
    let commits = branch
        .path
        .iter()
        .map(|revision| -> Result<CommitReport> {
            let commit = repo.commit(*revision)?;
            Ok(CommitReport {
                id: revision.to_string(),
                author: commit.author.to_string(),
                summary: commit.summary,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(BranchReport {
        label: branch.label.clone(),
        branch_point: branch.branch_point.to_string(),
        rejoined: branch.rejoined,
        commits,
    })
}

fn short(revision: &Revision) -> String {
    revision.to_string().chars().take(8).collect()
}

fn format_time(timestamp: i64) -> String {
    chrono::Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .map_or_else(|| timestamp.to_string(), |t| t.to_rfc2822())
}
