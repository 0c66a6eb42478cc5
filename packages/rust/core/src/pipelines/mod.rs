//! Per-job-type pipelines and shared stage helpers.
//!
//! Stage lists are fixed per job type; the executor records the list
//! length as `total_steps` before the first stage runs. Each stage commits
//! its own output, so a later failure leaves earlier results visible.

pub(crate) mod similar;
pub(crate) mod social;
pub(crate) mod sourcing;
pub(crate) mod stargazers;

use leadsourcer_scoring::{ActivityFacts, InfluenceFacts, PositionFacts};
use leadsourcer_shared::{Job, JobParams, JobType, Result};
use leadsourcer_storage::Storage;

/// Ordered stage names per job type.
pub fn stage_names(job_type: JobType) -> &'static [&'static str] {
    match job_type {
        JobType::RepositorySourcing => &[
            "Fetching repository metadata",
            "Fetching contributors",
            "Computing contributor statistics",
            "Recomputing lead scores",
            "Queuing social enrichment",
        ],
        JobType::StargazerAnalysis => &[
            "Fetching stargazers",
            "Processing stargazer profiles",
            "Scoring stargazers and queuing enrichment",
        ],
        JobType::SocialEnrichment => &[
            "Discovering social profile",
            "Deriving enrichment signals",
            "Classifying contributor",
            "Recomputing lead scores",
        ],
        JobType::SimilarRepos => &[
            "Searching related repositories",
            "Registering discovered repositories",
        ],
    }
}

/// Recompute the lead score for one (project, contributor) from current
/// stats and social context. Last write wins by design.
pub(crate) async fn recompute_lead_score(
    storage: &Storage,
    project_id: &str,
    contributor_id: &str,
) -> Result<()> {
    let Some(contributor) = storage.get_contributor(contributor_id).await? else {
        return Ok(());
    };

    let stats = storage.list_project_stats(project_id, contributor_id).await?;
    let social = storage.get_social_context(contributor_id).await?;

    let activity = ActivityFacts::aggregate(stats.iter());
    let influence = InfluenceFacts::from(&contributor);
    let position = PositionFacts::from(social.as_ref());

    let breakdown = leadsourcer_scoring::compute(&activity, &influence, &position);
    storage
        .upsert_lead_score(&breakdown.into_lead_score(project_id, contributor_id))
        .await
}

/// Enqueue `social_enrichment` jobs for linked contributors that have no
/// social context yet. Returns how many were queued.
pub(crate) async fn queue_enrichment(
    storage: &Storage,
    project_id: Option<&str>,
    repository_id: &str,
) -> Result<usize> {
    let pending = storage.list_unenriched_contributors(repository_id).await?;
    let mut queued = 0;

    for contributor_id in pending {
        let job = Job::new(
            JobParams::SocialEnrichment { contributor_id },
            project_id.map(str::to_owned),
        );
        storage.enqueue_job(&job).await?;
        queued += 1;
    }

    Ok(queued)
}
