//! Repository sourcing pipeline.
//!
//! metadata -> contributors -> stats -> lead scores -> enrichment fan-out.
//! Each stage commits before the next starts; a failure stops the run but
//! keeps everything already written.

use chrono::Utc;
use tracing::{info, instrument};

use leadsourcer_shared::{
    ContributorSource, ContributorStats, Job, JobParams, JobType, Result, SourcerError,
};

use crate::executor::{JobExecutor, StepTracker};
use crate::pipelines::{queue_enrichment, recompute_lead_score, stage_names};

#[instrument(skip_all, fields(job_id = %job.id))]
pub(crate) async fn run(exec: &JobExecutor, job: &Job) -> Result<()> {
    let JobParams::RepositorySourcing { repository_id } = &job.params else {
        return Err(SourcerError::validation("job params do not match job type"));
    };

    let mut repo = exec
        .storage
        .get_repository(repository_id)
        .await?
        .ok_or_else(|| {
            SourcerError::validation(format!("repository {repository_id} not found"))
        })?;

    let names = stage_names(JobType::RepositorySourcing);
    let mut steps = StepTracker::start(&exec.storage, job.id, names.len() as u32).await?;

    // --- Stage 1: repository metadata ---
    let step = steps.begin(names[0]).await?;
    let outcome: Result<String> = async {
        let info = exec.github.get_repository(&repo.owner, &repo.name).await?;

        let now = Utc::now();
        repo.description = info.description;
        repo.stars = info.stars;
        repo.forks = info.forks;
        repo.open_issues = info.open_issues;
        repo.language = info.language;
        repo.topics = info.topics;
        repo.last_sourced_at = Some(now);
        repo.next_sourcing_at = Some(repo.sourcing_interval.advance(now));
        exec.storage.update_repository(&repo).await?;

        Ok(format!("Fetched metadata for {}", repo.full_name))
    }
    .await;
    match outcome {
        Ok(message) => steps.complete(&step, message, None).await?,
        Err(e) => {
            steps.fail(&step, &e).await;
            return Err(e);
        }
    }

    // --- Stage 2: contributors ---
    let step = steps.begin(names[1]).await?;
    // (contributor row id, lowercase username, host contribution count)
    let mut discovered: Vec<(String, String, i64)> = Vec::new();
    let outcome: Result<String> = async {
        let profiles = exec
            .github
            .list_contributors(
                &repo.owner,
                &repo.name,
                exec.limits.contributor_limit,
                exec.limits.detailed_profile_limit,
            )
            .await?;

        for profile in profiles {
            let username = profile.username.to_lowercase();
            let contributions = profile.contributions;
            let contributor_id = exec
                .storage
                .upsert_contributor(&profile.into_contributor())
                .await?;
            exec.storage.link_contributor(&repo.id, &contributor_id).await?;
            discovered.push((contributor_id, username, contributions));
        }

        Ok(format!("Found {} contributors", discovered.len()))
    }
    .await;
    match outcome {
        Ok(message) => steps.complete(&step, message, None).await?,
        Err(e) => {
            steps.fail(&step, &e).await;
            return Err(e);
        }
    }

    // --- Stage 3: contributor statistics ---
    let step = steps.begin(names[2]).await?;
    let outcome: Result<String> = async {
        let activity = exec.github.contributor_activity(&repo.owner, &repo.name).await?;

        for (contributor_id, username, contributions) in &discovered {
            let windows = activity.get(username).copied().unwrap_or_default();

            let mut stats =
                ContributorStats::zeroed(&repo.id, contributor_id, ContributorSource::Commit);
            // The host's all-time contribution count beats the year window.
            stats.total_commits = if *contributions > 0 {
                *contributions
            } else {
                windows.total_commits
            };
            stats.commits_last_3_months = windows.commits_last_3_months;
            stats.commits_last_6_months = windows.commits_last_6_months;
            stats.commits_last_year = windows.commits_last_year;
            stats.first_commit_date = windows.first_commit_date;
            stats.last_commit_date = windows.last_commit_date;

            if exec.limits.fetch_pr_issue_counts {
                let (prs, issues) = exec
                    .github
                    .pr_issue_counts(&repo.owner, &repo.name, username)
                    .await?;
                stats.pull_requests = prs;
                stats.issues_opened = issues;
            }

            exec.storage.upsert_stats(&stats).await?;
        }

        Ok(format!("Processed {} contributors", discovered.len()))
    }
    .await;
    match outcome {
        Ok(message) => steps.complete(&step, message, None).await?,
        Err(e) => {
            steps.fail(&step, &e).await;
            return Err(e);
        }
    }

    // --- Stage 4: lead scores ---
    let step = steps.begin(names[3]).await?;
    let outcome: Result<String> = async {
        for (contributor_id, _, _) in &discovered {
            recompute_lead_score(&exec.storage, &repo.project_id, contributor_id).await?;
        }
        Ok(format!("Recomputed {} lead scores", discovered.len()))
    }
    .await;
    match outcome {
        Ok(message) => steps.complete(&step, message, None).await?,
        Err(e) => {
            steps.fail(&step, &e).await;
            return Err(e);
        }
    }

    // --- Stage 5: enrichment fan-out ---
    let step = steps.begin(names[4]).await?;
    let outcome: Result<String> = async {
        let queued =
            queue_enrichment(&exec.storage, Some(&repo.project_id), &repo.id).await?;
        Ok(format!(
            "Queued enrichment for {queued} contributors ({} already enriched)",
            discovered.len().saturating_sub(queued)
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

    info!(repository = %repo.full_name, contributors = discovered.len(), "sourcing run finished");
    Ok(())
}
