// src/lib.rs

pub mod aggregate;
pub mod analyzer;
pub mod config;
pub mod diff;
pub mod divergence;
pub mod error;
pub mod model;
pub mod ownership;
pub mod range;
pub mod repo;

pub use analyzer::{analyze, analyze_until, Analysis};
pub use config::AnalysisConfig;
pub use error::{Error, Result};
pub use range::CommitRange;
pub use repo::GitRepo;
