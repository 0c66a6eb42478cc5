//! Job executor and per-step bookkeeping.
//!
//! [`JobExecutor::run_job`] drives one claimed job to its terminal state:
//! it resolves the pipeline for the job's type, runs the stages in order
//! through a [`StepTracker`], and finalizes the job exactly once. A
//! cancellation observed between stages terminates the run with the
//! `cancelled` status, not `failed`; any other stage error is recorded on
//! both the failing step and the job.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use leadsourcer_enrichment::{OracleClient, SearchClient};
use leadsourcer_github::GithubClient;
use leadsourcer_shared::{AppConfig, JobId, JobParams, JobStep, Result, SourcerError};
use leadsourcer_storage::Storage;

use crate::pipelines;
use crate::scheduler::WakeHandle;

// ---------------------------------------------------------------------------
// PipelineLimits
// ---------------------------------------------------------------------------

/// Bounds applied by the pipelines, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct PipelineLimits {
    /// Maximum contributors fetched per sourcing run.
    pub contributor_limit: u32,
    /// Maximum stargazers fetched per analysis run.
    pub stargazer_limit: u32,
    /// How many contributors get a detailed profile fetch.
    pub detailed_profile_limit: u32,
    /// Whether to issue per-contributor PR/issue search queries.
    pub fetch_pr_issue_counts: bool,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            contributor_limit: 100,
            stargazer_limit: 200,
            detailed_profile_limit: 20,
            fetch_pr_issue_counts: false,
        }
    }
}

impl From<&AppConfig> for PipelineLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            contributor_limit: config.github.contributor_limit,
            stargazer_limit: config.github.stargazer_limit,
            detailed_profile_limit: config.github.detailed_profile_limit,
            fetch_pr_issue_counts: config.github.fetch_pr_issue_counts,
        }
    }
}

// ---------------------------------------------------------------------------
// JobExecutor
// ---------------------------------------------------------------------------

/// Runs claimed jobs to completion, one pipeline per job type.
pub struct JobExecutor {
    pub(crate) storage: Arc<Storage>,
    pub(crate) github: Arc<GithubClient>,
    pub(crate) search: Arc<SearchClient>,
    pub(crate) oracle: Arc<OracleClient>,
    pub(crate) limits: PipelineLimits,
    wake: Option<WakeHandle>,
}

impl JobExecutor {
    pub fn new(
        storage: Arc<Storage>,
        github: Arc<GithubClient>,
        search: Arc<SearchClient>,
        oracle: Arc<OracleClient>,
        limits: PipelineLimits,
    ) -> Self {
        Self {
            storage,
            github,
            search,
            oracle,
            limits,
            wake: None,
        }
    }

    /// Attach the scheduler's wake handle so jobs enqueued by pipelines
    /// (enrichment fan-out, similar-repo sourcing) are claimed without
    /// waiting for the next tick.
    pub fn with_wake(mut self, wake: WakeHandle) -> Self {
        self.wake = Some(wake);
        self
    }

    /// Run one admitted job to a terminal state. Never panics the worker:
    /// every failure path ends in a recorded job status.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn run_job(&self, job_id: JobId) {
        let job = match self.storage.get_job(&job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("job not found, skipping");
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to load job");
                return;
            }
        };

        if job.status.is_terminal() {
            info!(status = %job.status, "job already terminal, skipping");
            return;
        }

        let result = match &job.params {
            JobParams::RepositorySourcing { .. } => pipelines::sourcing::run(self, &job).await,
            JobParams::SocialEnrichment { .. } => pipelines::social::run(self, &job).await,
            JobParams::StargazerAnalysis { .. } => pipelines::stargazers::run(self, &job).await,
            JobParams::SimilarRepos { .. } => pipelines::similar::run(self, &job).await,
        };

        match result {
            Ok(()) => {
                if let Err(e) = self.storage.complete_job(&job.id).await {
                    error!(error = %e, "failed to mark job completed");
                } else {
                    info!(job_type = %job.job_type, "job completed");
                }
            }
            Err(SourcerError::Cancelled) => {
                // The flag already moved the job to `cancelled`; close the
                // books on any step still open.
                if let Err(e) = self.storage.cancel_open_steps(&job.id).await {
                    error!(error = %e, "failed to finalize cancelled steps");
                }
                info!("job cancelled");
            }
            Err(e) => {
                error!(error = %e, "job failed");
                if let Err(store_err) = self.storage.fail_job(&job.id, &e.to_string()).await {
                    error!(error = %store_err, "failed to mark job failed");
                }
            }
        }

        // Pipelines may have enqueued follow-up jobs; let the scheduler
        // claim them now that a slot is freeing up.
        if let Some(wake) = &self.wake {
            wake.wake();
        }
    }
}

// ---------------------------------------------------------------------------
// Cancellation + step tracking
// ---------------------------------------------------------------------------

/// Return [`SourcerError::Cancelled`] when the job's cancellation flag is
/// set. Checked between stages; an in-flight external call finishes first.
pub(crate) async fn ensure_active(storage: &Storage, job_id: &JobId) -> Result<()> {
    if storage.is_cancelled(job_id).await? {
        Err(SourcerError::Cancelled)
    } else {
        Ok(())
    }
}

/// Step bookkeeping for one pipeline run: opens steps in order, completes
/// them, and keeps the job's step counters and progress percentage current.
pub(crate) struct StepTracker<'a> {
    storage: &'a Storage,
    job_id: JobId,
    total_steps: u32,
    completed: u32,
}

impl<'a> StepTracker<'a> {
    /// Record the resolved stage count on the job, before the first stage.
    pub async fn start(storage: &'a Storage, job_id: JobId, total_steps: u32) -> Result<Self> {
        storage.set_total_steps(&job_id, total_steps).await?;
        Ok(Self {
            storage,
            job_id,
            total_steps,
            completed: 0,
        })
    }

    /// Check the cancellation flag, then open the next step as running.
    pub async fn begin(&self, name: &str) -> Result<JobStep> {
        ensure_active(self.storage, &self.job_id).await?;
        self.storage
            .create_step(&self.job_id, self.completed + 1, name)
            .await
    }

    /// Mark the step completed and advance the job's progress.
    pub async fn complete(
        &mut self,
        step: &JobStep,
        message: impl AsRef<str>,
        details: Option<serde_json::Value>,
    ) -> Result<()> {
        self.storage
            .complete_step(&step.id, message.as_ref(), details.as_ref())
            .await?;
        self.completed += 1;
        self.storage
            .update_job_progress(&self.job_id, self.completed, self.total_steps)
            .await
    }

    /// Record a stage failure on the step. The caller still bubbles the
    /// error up to fail the job.
    pub async fn fail(&self, step: &JobStep, error: &SourcerError) {
        if let Err(e) = self.storage.fail_step(&step.id, &error.to_string()).await {
            error!(error = %e, step = %step.name, "failed to record step failure");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
