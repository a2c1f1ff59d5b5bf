// src/cli.rs

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the git repository to analyze
    #[arg(short, long, default_value = ".")]
    pub repo: PathBuf,

    /// Revision whose files are attributed (branch, tag, hash or HEAD)
    #[arg(long, default_value = "HEAD")]
    pub head: String,

    /// Oldest revision to replay; ROOT starts at the first commit
    #[arg(long, default_value = "ROOT")]
    pub boundary: String,

    /// TOML file with analysis settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Attribute lines older than the boundary to '?' instead of blaming them
    #[arg(long)]
    pub no_blame_unseen: bool,

    /// Also list branches that forked off and never merged back
    #[arg(long)]
    pub divergent: bool,

    /// Print the ownership of every file
    #[arg(long)]
    pub files: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Log what the replay is doing (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human readable summary
    Text,
    /// Machine readable report on stdout
    Json,
}
