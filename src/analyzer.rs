// src/analyzer.rs

use crate::aggregate::ContributionStats;
use crate::config::AnalysisConfig;
use crate::diff::{DiffExtractor, FileChanges};
use crate::error::{Error, Result};
use crate::model::{Commit, Revision};
use crate::ownership::{OwnershipEngine, OwnershipMap};
use crate::range::CommitRange;
use crate::repo::{GitRepo, RepoLocation, RevisionStore};
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Outcome of replaying a commit range
#[derive(Debug, Clone)]
pub struct Analysis {
    pub files: OwnershipMap,
    pub contributions: ContributionStats,
    /// Files tracked in the head tree
    pub tracked_files: usize,
    /// Revisions applied, a prefix of the replay path
    pub replayed: usize,
    /// False if the replay was cancelled before reaching head
    pub completed: bool,
}

impl Analysis {
    /// Paths that are still alive at the last applied revision
    pub fn live_files(&self) -> usize {
        self.files.values().filter(|o| o.is_alive()).count()
    }
}

pub fn analyze(repo: &GitRepo, range: &CommitRange, config: &AnalysisConfig) -> Result<Analysis> {
    analyze_until(repo, range, config, &AtomicBool::new(false))
}

/// Replay `range`, stopping between revisions once `cancel` is set.
///
/// Diffs are extracted in parallel, one batch of revisions at a time; every
/// batch is then applied in replay order on this thread.
pub fn analyze_until(
    repo: &GitRepo,
    range: &CommitRange,
    config: &AnalysisConfig,
    cancel: &AtomicBool,
) -> Result<Analysis> {
    let bar = if config.progress {
        ProgressBar::new(range.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    bar.set_message("Analyzing commits");

    let location = repo.location();
    let mut engine = OwnershipEngine::new(repo, config.blame_unseen);
    let mut contributions = ContributionStats::default();
    let mut replayed = 0;

    'batches: for batch in range.replay_path.chunks(config.batch_size.max(1)) {
        if cancel.load(Ordering::Relaxed) {
            break;
        }

        // 1. Extract diffs of the whole batch in parallel
        let extracted = extract_batch(&location, config, batch, &bar)?;

        // 2. Apply them strictly in replay order
        for (commit, changes) in extracted {
            if cancel.load(Ordering::Relaxed) {
                break 'batches;
            }
            engine.apply_revision(&changes, &commit);
            contributions.record(&commit, &changes);
            replayed += 1;
        }
    }

    let completed = replayed == range.len();
    if completed {
        bar.finish_with_message("Analysis complete");
    } else {
        bar.abandon_with_message("Analysis cancelled");
        warn!(
            "Replay cancelled after {} of {} revisions",
            replayed,
            range.len()
        );
    }

    let files = engine.into_files();
    let tracked_files = repo.tracked_files(range.head)?;
    let analysis = Analysis {
        files,
        contributions,
        tracked_files,
        replayed,
        completed,
    };
    info!(
        "{} files tracked at head, {} analyzed ({} live)",
        analysis.tracked_files,
        analysis.files.len(),
        analysis.live_files()
    );
    Ok(analysis)
}

fn extract_batch(
    location: &RepoLocation,
    config: &AnalysisConfig,
    batch: &[Revision],
    bar: &ProgressBar,
) -> Result<Vec<(Commit, FileChanges)>> {
    batch
        .par_iter()
        .progress_with(bar.clone())
        .map_init(
            || location.open(),
            |worker, revision| {
                let worker = match worker {
                    Ok(worker) => worker,
                    Err(e) => {
                        return Err(Error::from(git2::Error::from_str(&format!(
                            "could not open repository on worker thread: {}",
                            e
                        ))))
                    }
                };
                extract_one(worker, config, *revision)
            },
        )
        .collect()
}

fn extract_one(
    repo: &GitRepo,
    config: &AnalysisConfig,
    revision: Revision,
) -> Result<(Commit, FileChanges)> {
    let commit = repo.commit(revision)?;
    let changes = DiffExtractor::new(repo, config).extract(&commit)?;
    Ok((commit, changes))
}
