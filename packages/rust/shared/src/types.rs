//! Core domain types for LeadSourcer jobs, repositories, and leads.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SourcerError;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for job identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Job type / status enums
// ---------------------------------------------------------------------------

/// The kind of pipeline a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    RepositorySourcing,
    SocialEnrichment,
    StargazerAnalysis,
    SimilarRepos,
}

impl JobType {
    /// Storage/display key for the job type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepositorySourcing => "repository_sourcing",
            Self::SocialEnrichment => "social_enrichment",
            Self::StargazerAnalysis => "stargazer_analysis",
            Self::SimilarRepos => "similar_repos",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = SourcerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "repository_sourcing" => Ok(Self::RepositorySourcing),
            "social_enrichment" => Ok(Self::SocialEnrichment),
            "stargazer_analysis" => Ok(Self::StargazerAnalysis),
            "similar_repos" => Ok(Self::SimilarRepos),
            other => Err(SourcerError::validation(format!(
                "unknown job type: {other}"
            ))),
        }
    }
}

/// Lifecycle status of a job. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this status is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = SourcerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(SourcerError::validation(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

/// Step-local status, mirroring the job's step outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = SourcerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(SourcerError::validation(format!(
                "unknown step status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// JobParams
// ---------------------------------------------------------------------------

fn default_fanout_limit() -> u32 {
    5
}

/// Strongly-typed per-job-type parameters.
///
/// Serialized as a tagged JSON object in the `params_json` column, so each
/// job type carries exactly the parameters it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobParams {
    RepositorySourcing {
        repository_id: String,
    },
    SocialEnrichment {
        contributor_id: String,
    },
    StargazerAnalysis {
        repository_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    SimilarRepos {
        repository_id: String,
        /// Explicit search query; derived from the seed repository if absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        /// Upper bound on newly registered repositories per run.
        #[serde(default = "default_fanout_limit")]
        fanout_limit: u32,
        /// Whether to auto-enqueue sourcing jobs for discovered repositories.
        #[serde(default)]
        auto_source: bool,
    },
}

impl JobParams {
    /// The job type these parameters belong to.
    pub fn job_type(&self) -> JobType {
        match self {
            Self::RepositorySourcing { .. } => JobType::RepositorySourcing,
            Self::SocialEnrichment { .. } => JobType::SocialEnrichment,
            Self::StargazerAnalysis { .. } => JobType::StargazerAnalysis,
            Self::SimilarRepos { .. } => JobType::SimilarRepos,
        }
    }

    /// The repository this job targets, if any.
    pub fn repository_id(&self) -> Option<&str> {
        match self {
            Self::RepositorySourcing { repository_id }
            | Self::StargazerAnalysis { repository_id, .. }
            | Self::SimilarRepos { repository_id, .. } => Some(repository_id),
            Self::SocialEnrichment { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Job & JobStep
// ---------------------------------------------------------------------------

/// One durable, trackable pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Owning project, when the job is project-scoped.
    pub project_id: Option<String>,
    /// Target repository, when the job is repository-scoped.
    pub repository_id: Option<String>,
    pub params: JobParams,
    pub total_steps: u32,
    pub current_step: u32,
    /// Derived: `current_step / total_steps * 100`, in [0, 100].
    pub progress_percentage: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job for the given parameters.
    pub fn new(params: JobParams, project_id: Option<String>) -> Self {
        let repository_id = params.repository_id().map(str::to_owned);
        Self {
            id: JobId::new(),
            job_type: params.job_type(),
            status: JobStatus::Pending,
            project_id,
            repository_id,
            params,
            total_steps: 0,
            current_step: 0,
            progress_percentage: 0.0,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}

/// One ordered unit of a job's execution history. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStep {
    pub id: String,
    pub job_id: JobId,
    pub step_number: u32,
    pub name: String,
    pub status: StepStatus,
    pub message: Option<String>,
    pub details: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Aggregate job counts by status, for dashboards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsSummary {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Cadence at which a repository is re-sourced by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcingInterval {
    Daily,
    Weekly,
    Monthly,
}

impl SourcingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Compute the next sourcing instant from a completed run at `from`.
    pub fn advance(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily => from + Duration::days(1),
            Self::Weekly => from + Duration::days(7),
            Self::Monthly => from + Duration::days(30),
        }
    }
}

impl std::str::FromStr for SourcingInterval {
    type Err = SourcerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(SourcerError::validation(format!(
                "unknown sourcing interval: {other}"
            ))),
        }
    }
}

/// A tracked source-control repository owned by a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub project_id: String,
    /// Original repository URL.
    pub url: String,
    /// `owner/name`.
    pub full_name: String,
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub stars: i64,
    pub forks: i64,
    pub open_issues: i64,
    pub language: Option<String>,
    pub topics: Vec<String>,
    pub last_sourced_at: Option<DateTime<Utc>>,
    pub sourcing_interval: SourcingInterval,
    /// When the scheduler should next enqueue a sourcing job.
    pub next_sourcing_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Repository {
    /// Register a new repository due for immediate sourcing.
    pub fn new(
        project_id: impl Into<String>,
        url: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
        interval: SourcingInterval,
    ) -> Self {
        let owner = owner.into();
        let name = name.into();
        Self {
            id: Uuid::now_v7().to_string(),
            project_id: project_id.into(),
            url: url.into(),
            full_name: format!("{owner}/{name}"),
            owner,
            name,
            description: None,
            stars: 0,
            forks: 0,
            open_issues: 0,
            language: None,
            topics: Vec::new(),
            last_sourced_at: None,
            sourcing_interval: interval,
            next_sourcing_at: Some(Utc::now()),
            is_active: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Contributor
// ---------------------------------------------------------------------------

/// A person discovered via repository activity or starring.
///
/// Keyed by the host's stable account id; profile fields fill in
/// progressively across pipeline runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub id: String,
    /// Stable external account identifier on the repository host.
    pub account_id: i64,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub blog: Option<String>,
    pub twitter_username: Option<String>,
    pub avatar_url: Option<String>,
    pub profile_url: Option<String>,
    pub public_repos: i64,
    pub followers: i64,
    pub following: i64,
}

/// Provenance marker: how a contributor was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributorSource {
    Commit,
    Stargazer,
}

impl ContributorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Stargazer => "stargazer",
        }
    }
}

impl std::str::FromStr for ContributorSource {
    type Err = SourcerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "commit" => Ok(Self::Commit),
            "stargazer" => Ok(Self::Stargazer),
            other => Err(SourcerError::validation(format!(
                "unknown contributor source: {other}"
            ))),
        }
    }
}

/// Per-(repository, contributor) activity facts.
///
/// Recomputed wholesale on each sourcing run — idempotent overwrite, not an
/// incremental merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributorStats {
    pub repository_id: String,
    pub contributor_id: String,
    pub total_commits: i64,
    pub commits_last_3_months: i64,
    pub commits_last_6_months: i64,
    pub commits_last_year: i64,
    pub first_commit_date: Option<DateTime<Utc>>,
    pub last_commit_date: Option<DateTime<Utc>>,
    pub pull_requests: i64,
    pub issues_opened: i64,
    pub code_reviews: i64,
    pub is_maintainer: bool,
    pub source: ContributorSource,
    pub calculated_at: DateTime<Utc>,
}

impl ContributorStats {
    /// A zero-filled stats row, used for stargazer-discovered contributors
    /// who have no commit history in the repository.
    pub fn zeroed(
        repository_id: impl Into<String>,
        contributor_id: impl Into<String>,
        source: ContributorSource,
    ) -> Self {
        Self {
            repository_id: repository_id.into(),
            contributor_id: contributor_id.into(),
            total_commits: 0,
            commits_last_3_months: 0,
            commits_last_6_months: 0,
            commits_last_year: 0,
            first_commit_date: None,
            last_commit_date: None,
            pull_requests: 0,
            issues_opened: 0,
            code_reviews: 0,
            is_maintainer: false,
            source,
            calculated_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// SocialContext
// ---------------------------------------------------------------------------

/// Lead classification produced by the oracle (or rule-based fallback).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    DecisionMaker,
    KeyContributor,
    HighImpact,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DecisionMaker => "DECISION_MAKER",
            Self::KeyContributor => "KEY_CONTRIBUTOR",
            Self::HighImpact => "HIGH_IMPACT",
        }
    }
}

impl std::str::FromStr for Classification {
    type Err = SourcerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "DECISION_MAKER" => Ok(Self::DecisionMaker),
            "KEY_CONTRIBUTOR" => Ok(Self::KeyContributor),
            "HIGH_IMPACT" => Ok(Self::HighImpact),
            other => Err(SourcerError::validation(format!(
                "unknown classification: {other}"
            ))),
        }
    }
}

/// Seniority bucket derived from a job title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionLevel {
    CSuite,
    Director,
    Manager,
    Lead,
    Senior,
    Mid,
    Entry,
    Unknown,
}

impl PositionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CSuite => "C-Suite",
            Self::Director => "Director",
            Self::Manager => "Manager",
            Self::Lead => "Lead",
            Self::Senior => "Senior",
            Self::Mid => "Mid",
            Self::Entry => "Entry",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::str::FromStr for PositionLevel {
    type Err = SourcerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "C-Suite" => Ok(Self::CSuite),
            "Director" => Ok(Self::Director),
            "Manager" => Ok(Self::Manager),
            "Lead" => Ok(Self::Lead),
            "Senior" => Ok(Self::Senior),
            "Mid" => Ok(Self::Mid),
            "Entry" => Ok(Self::Entry),
            "Unknown" => Ok(Self::Unknown),
            other => Err(SourcerError::validation(format!(
                "unknown position level: {other}"
            ))),
        }
    }
}

/// Externally enriched profile and classification for one contributor.
///
/// At most one row per contributor; the latest enrichment run wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialContext {
    pub contributor_id: String,
    /// Discovered professional-profile URL.
    pub profile_url: Option<String>,
    pub headline: Option<String>,
    pub photo_url: Option<String>,
    pub current_company: Option<String>,
    pub current_position: Option<String>,
    pub position_level: Option<PositionLevel>,
    pub industry: Option<String>,
    pub classification: Option<Classification>,
    /// Confidence in [0, 1].
    pub classification_confidence: Option<f64>,
    pub classification_reasoning: Option<String>,
    /// Raw payload of every sub-signal gathered during enrichment.
    pub raw_signals: Option<serde_json::Value>,
    pub last_enriched_at: DateTime<Utc>,
}

impl SocialContext {
    /// An empty context for a contributor about to be enriched.
    pub fn empty(contributor_id: impl Into<String>) -> Self {
        Self {
            contributor_id: contributor_id.into(),
            profile_url: None,
            headline: None,
            photo_url: None,
            current_company: None,
            current_position: None,
            position_level: None,
            industry: None,
            classification: None,
            classification_confidence: None,
            classification_reasoning: None,
            raw_signals: None,
            last_enriched_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// LeadScore
// ---------------------------------------------------------------------------

/// Outreach priority bucketed from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = SourcerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(SourcerError::validation(format!(
                "unknown priority: {other}"
            ))),
        }
    }
}

/// The weighted, qualification-bearing composite score for a contributor
/// within a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadScore {
    pub project_id: String,
    pub contributor_id: String,
    pub overall_score: f64,
    pub activity_score: f64,
    pub influence_score: f64,
    pub position_score: f64,
    pub engagement_score: f64,
    pub is_qualified: bool,
    pub priority: Priority,
    pub calculated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_roundtrip() {
        let id = JobId::new();
        let s = id.to_string();
        let parsed: JobId = s.parse().expect("parse JobId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn job_params_tagged_serialization() {
        let params = JobParams::RepositorySourcing {
            repository_id: "repo-1".into(),
        };
        let json = serde_json::to_value(&params).expect("serialize");
        assert_eq!(json["type"], "repository_sourcing");
        assert_eq!(json["repository_id"], "repo-1");

        let parsed: JobParams = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed, params);
        assert_eq!(parsed.job_type(), JobType::RepositorySourcing);
    }

    #[test]
    fn job_params_defaults_apply() {
        let parsed: JobParams = serde_json::from_str(
            r#"{"type": "similar_repos", "repository_id": "repo-9"}"#,
        )
        .expect("deserialize");

        match parsed {
            JobParams::SimilarRepos {
                fanout_limit,
                auto_source,
                query,
                ..
            } => {
                assert_eq!(fanout_limit, 5);
                assert!(!auto_source);
                assert!(query.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn new_job_carries_repository_reference() {
        let job = Job::new(
            JobParams::StargazerAnalysis {
                repository_id: "repo-2".into(),
                limit: None,
            },
            Some("proj-1".into()),
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.job_type, JobType::StargazerAnalysis);
        assert_eq!(job.repository_id.as_deref(), Some("repo-2"));
        assert_eq!(job.current_step, 0);

        let enrich = Job::new(
            JobParams::SocialEnrichment {
                contributor_id: "c-1".into(),
            },
            None,
        );
        assert!(enrich.repository_id.is_none());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            let parsed: JobStatus = status.as_str().parse().expect("roundtrip");
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn interval_advance() {
        let from = DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(
            SourcingInterval::Daily.advance(from),
            from + Duration::days(1)
        );
        assert_eq!(
            SourcingInterval::Weekly.advance(from),
            from + Duration::days(7)
        );
        assert_eq!(
            SourcingInterval::Monthly.advance(from),
            from + Duration::days(30)
        );
    }

    #[test]
    fn classification_wire_format() {
        let json = serde_json::to_string(&Classification::DecisionMaker).unwrap();
        assert_eq!(json, r#""DECISION_MAKER""#);
        assert_eq!(
            "KEY_CONTRIBUTOR".parse::<Classification>().unwrap(),
            Classification::KeyContributor
        );
    }

    #[test]
    fn new_repository_is_due_immediately() {
        let repo = Repository::new(
            "proj-1",
            "https://github.com/rust-lang/rust",
            "rust-lang",
            "rust",
            SourcingInterval::Daily,
        );
        assert_eq!(repo.full_name, "rust-lang/rust");
        assert!(repo.next_sourcing_at.is_some());
        assert!(repo.last_sourced_at.is_none());
        assert!(repo.is_active);
    }

    #[test]
    fn zeroed_stats() {
        let stats = ContributorStats::zeroed("repo-1", "c-1", ContributorSource::Stargazer);
        assert_eq!(stats.total_commits, 0);
        assert_eq!(stats.source, ContributorSource::Stargazer);
        assert!(!stats.is_maintainer);
    }
}
