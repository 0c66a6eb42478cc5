//! Similar-repositories pipeline.
//!
//! Searches for topically related repositories and, with bounded fan-out,
//! registers the new ones and optionally queues their first sourcing run.

use tracing::{debug, info, instrument};

use leadsourcer_github::RepoInfo;
use leadsourcer_shared::{Job, JobParams, JobType, Repository, Result, SourcerError};

use crate::executor::{JobExecutor, StepTracker};
use crate::pipelines::stage_names;

/// Cap on search results considered per run, independent of fan-out.
const SEARCH_RESULT_CAP: u32 = 20;

#[instrument(skip_all, fields(job_id = %job.id))]
pub(crate) async fn run(exec: &JobExecutor, job: &Job) -> Result<()> {
    let JobParams::SimilarRepos {
        repository_id,
        query,
        fanout_limit,
        auto_source,
    } = &job.params
    else {
        return Err(SourcerError::validation("job params do not match job type"));
    };

    let seed = exec
        .storage
        .get_repository(repository_id)
        .await?
        .ok_or_else(|| {
            SourcerError::validation(format!("repository {repository_id} not found"))
        })?;

    let names = stage_names(JobType::SimilarRepos);
    let mut steps = StepTracker::start(&exec.storage, job.id, names.len() as u32).await?;

    // --- Stage 1: search related repositories ---
    let step = steps.begin(names[0]).await?;
    let mut found: Vec<RepoInfo> = Vec::new();
    let outcome: Result<String> = async {
        let query = query.clone().unwrap_or_else(|| seed_query(&seed));
        let limit = (fanout_limit.saturating_mul(2)).clamp(1, SEARCH_RESULT_CAP);
        found = exec.github.search_repositories(&query, limit).await?;
        Ok(format!("Found {} related repositories", found.len()))
    }
    .await;
    match outcome {
        Ok(message) => steps.complete(&step, message, None).await?,
        Err(e) => {
            steps.fail(&step, &e).await;
            return Err(e);
        }
    }

    // --- Stage 2: bounded registration + optional sourcing fan-out ---
    let step = steps.begin(names[1]).await?;
    let outcome: Result<String> = async {
        let mut registered = 0u32;
        let mut queued = 0u32;

        for info in &found {
            if registered >= *fanout_limit {
                break;
            }
            if info.full_name == seed.full_name {
                continue;
            }
            if exec
                .storage
                .find_repository(&seed.project_id, &info.full_name)
                .await?
                .is_some()
            {
                debug!(repository = %info.full_name, "already registered, skipping");
                continue;
            }

            let mut repo = Repository::new(
                &seed.project_id,
                &info.url,
                &info.owner,
                &info.name,
                seed.sourcing_interval,
            );
            repo.description = info.description.clone();
            repo.stars = info.stars;
            repo.forks = info.forks;
            repo.open_issues = info.open_issues;
            repo.language = info.language.clone();
            repo.topics = info.topics.clone();
            if !auto_source {
                // Registered but parked: the operator decides when to
                // start sourcing it.
                repo.next_sourcing_at = None;
            }
            exec.storage.insert_repository(&repo).await?;
            registered += 1;

            if *auto_source {
                let sourcing = Job::new(
                    JobParams::RepositorySourcing {
                        repository_id: repo.id.clone(),
                    },
                    Some(seed.project_id.clone()),
                );
                match exec.storage.enqueue_job(&sourcing).await {
                    Ok(()) => queued += 1,
                    Err(SourcerError::AlreadyInProgress { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(format!(
            "Registered {registered} repositories ({queued} queued for sourcing)"
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

    info!(seed = %seed.full_name, "similar-repositories run finished");
    Ok(())
}

/// Build a search query from the seed repository's language and topics.
fn seed_query(seed: &Repository) -> String {
    let mut parts = Vec::new();
    if let Some(language) = &seed.language {
        parts.push(format!("language:{language}"));
    }
    for topic in seed.topics.iter().take(3) {
        parts.push(format!("topic:{topic}"));
    }
    if parts.is_empty() {
        parts.push(seed.name.clone());
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadsourcer_shared::SourcingInterval;

    #[test]
    fn seed_query_prefers_language_and_topics() {
        let mut seed = Repository::new(
            "proj-1",
            "https://github.com/o/r",
            "o",
            "r",
            SourcingInterval::Monthly,
        );
        seed.language = Some("Rust".into());
        seed.topics = vec!["async".into(), "runtime".into(), "io".into(), "extra".into()];

        let query = seed_query(&seed);
        assert!(query.starts_with("language:Rust"));
        assert!(query.contains("topic:async"));
        assert!(!query.contains("extra"), "topics are capped at three");
    }

    #[test]
    fn seed_query_falls_back_to_name() {
        let seed = Repository::new(
            "proj-1",
            "https://github.com/o/bare",
            "o",
            "bare",
            SourcingInterval::Monthly,
        );
        assert_eq!(seed_query(&seed), "bare");
    }
}
