//! Shared types, error model, and configuration for LeadSourcer.
//!
//! This crate is the foundation depended on by all other LeadSourcer crates.
//! It provides:
//! - [`SourcerError`] — the unified error type
//! - Domain types ([`Job`], [`JobStep`], [`Repository`], [`Contributor`],
//!   [`ContributorStats`], [`SocialContext`], [`LeadScore`])
//! - Configuration ([`AppConfig`], [`WorkerConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, GateConfig, GithubConfig, OracleConfig, SearchConfig, WorkerConfig, WorkerDefaults,
    config_dir, config_file_path, init_config, load_config, load_config_from, resolve_api_key,
    validate_github_token,
};
pub use error::{Result, SourcerError};
pub use types::{
    Classification, Contributor, ContributorSource, ContributorStats, Job, JobId, JobParams,
    JobStatus, JobStep, JobType, JobsSummary, LeadScore, PositionLevel, Priority, Repository,
    SocialContext, SourcingInterval, StepStatus,
};
