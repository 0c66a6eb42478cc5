//! Stargazer analysis pipeline.
//!
//! Stargazers become contributors with a `stargazer` provenance marker and
//! a zero-filled stats row; their score is carried by profile influence
//! until enrichment fills in position signals.

use tracing::{info, instrument};

use leadsourcer_shared::{
    ContributorSource, ContributorStats, Job, JobParams, JobType, Result, SourcerError,
};

use crate::executor::{JobExecutor, StepTracker};
use crate::pipelines::{queue_enrichment, recompute_lead_score, stage_names};

#[instrument(skip_all, fields(job_id = %job.id))]
pub(crate) async fn run(exec: &JobExecutor, job: &Job) -> Result<()> {
    let JobParams::StargazerAnalysis {
        repository_id,
        limit,
    } = &job.params
    else {
        return Err(SourcerError::validation("job params do not match job type"));
    };

    let repo = exec
        .storage
        .get_repository(repository_id)
        .await?
        .ok_or_else(|| {
            SourcerError::validation(format!("repository {repository_id} not found"))
        })?;

    let limit = limit.unwrap_or(exec.limits.stargazer_limit);
    let names = stage_names(JobType::StargazerAnalysis);
    let mut steps = StepTracker::start(&exec.storage, job.id, names.len() as u32).await?;

    // --- Stage 1: fetch stargazers ---
    let step = steps.begin(names[0]).await?;
    let mut profiles = Vec::new();
    let outcome: Result<String> = async {
        profiles = exec
            .github
            .list_stargazers(&repo.owner, &repo.name, limit)
            .await?;
        Ok(format!("Found {} stargazers", profiles.len()))
    }
    .await;
    match outcome {
        Ok(message) => steps.complete(&step, message, None).await?,
        Err(e) => {
            steps.fail(&step, &e).await;
            return Err(e);
        }
    }

    // --- Stage 2: upsert as stargazer-sourced contributors ---
    let step = steps.begin(names[1]).await?;
    let mut contributor_ids = Vec::new();
    let outcome: Result<String> = async {
        for profile in profiles.drain(..) {
            let contributor_id = exec
                .storage
                .upsert_contributor(&profile.into_contributor())
                .await?;
            exec.storage.link_contributor(&repo.id, &contributor_id).await?;

            // No commit history for stargazers: zero-filled facts, tagged
            // with their provenance. A commit-sourced row stays commit.
            let stats =
                ContributorStats::zeroed(&repo.id, &contributor_id, ContributorSource::Stargazer);
            exec.storage.upsert_stats(&stats).await?;

            contributor_ids.push(contributor_id);
        }
        Ok(format!("Processed {} stargazers", contributor_ids.len()))
    }
    .await;
    match outcome {
        Ok(message) => steps.complete(&step, message, None).await?,
        Err(e) => {
            steps.fail(&step, &e).await;
            return Err(e);
        }
    }

    // --- Stage 3: score and queue enrichment ---
    let step = steps.begin(names[2]).await?;
    let outcome: Result<String> = async {
        for contributor_id in &contributor_ids {
            recompute_lead_score(&exec.storage, &repo.project_id, contributor_id).await?;
        }
        let queued = queue_enrichment(&exec.storage, Some(&repo.project_id), &repo.id).await?;
        Ok(format!(
            "Scored {} stargazers, queued {queued} for enrichment",
            contributor_ids.len()
        ))
    }
    .await;
    match outcome {
        Ok(message) => steps.complete(&step, message, None).await?,
        Err(e) => {
            steps.fail(&step, &e).await;
            return Err(e);
        }
    }

    info!(repository = %repo.full_name, stargazers = contributor_ids.len(), "stargazer run finished");
    Ok(())
}
