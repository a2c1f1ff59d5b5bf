// src/config.rs

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Knobs for a single analysis run, loaded from TOML and overridden by CLI flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Reconcile lines that predate the window with a historical blame
    pub blame_unseen: bool,
    pub find_renames: bool,
    pub ignore_whitespace_changes: bool,
    /// Revisions extracted in parallel before they are applied
    pub batch_size: usize,
    pub progress: bool,
    /// Days past the head commit still considered by the divergence detector
    pub window_grace_days: i64,
    /// Revision hash -> author name that replaces the commit's author
    pub ownership_overrides: HashMap<String, String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            blame_unseen: true,
            find_renames: true,
            ignore_whitespace_changes: false,
            batch_size: 32,
            progress: true,
            window_grace_days: 1,
            ownership_overrides: HashMap::new(),
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
