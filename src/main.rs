// src/main.rs

mod cli;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, Format};
use git_lineage::divergence::{find_divergent_branches, Window};
use git_lineage::{aggregate, analyzer, AnalysisConfig, CommitRange, GitRepo};
use report::Report;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let start_time = Instant::now();

    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if args.no_blame_unseen {
        config.blame_unseen = false;
    }
    if args.no_progress || args.format == Format::Json {
        config.progress = false;
    }

    let repo = GitRepo::open(&args.repo)?.with_overrides(&config.ownership_overrides)?;
    let range = CommitRange::resolve(&repo, &args.head, &args.boundary)
        .with_context(|| format!("Failed to resolve {}...{}", args.head, args.boundary))?;

    let analysis = analyzer::analyze(&repo, &range, &config)?;
    info!("Analysis finished in {:.2?}", start_time.elapsed());
    let percentage = aggregate::percentage(&analysis.files);

    let divergent = if args.divergent {
        let window = Window::for_range(&range, config.window_grace_days);
        find_divergent_branches(&repo, &range, window)?
    } else {
        Vec::new()
    };

    let report = Report::build(&repo, &range, &analysis, &percentage, &divergent, args.files)?;
    match args.format {
        Format::Text => {
            report.print_text(&range);
            println!("Total time: {:.2?}", start_time.elapsed());
        }
        Format::Json => report.print_json()?,
    }
    Ok(())
}

/// Logs go to stderr; `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "git_lineage=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
