//! Social enrichment pipeline.
//!
//! discover profile -> derive sub-signals -> classify -> rescore. The
//! discovered profile is persisted by stage 1 on its own, so a later
//! failure (rate limit on the company-intelligence search, oracle outage)
//! still leaves the profile queryable.

use chrono::Utc;
use tracing::{info, instrument};

use leadsourcer_enrichment::{
    ClassifyInput, SearchResults, company_query, derive_signals, extract_profile, person_query,
    position_level, profile_from_hints,
};
use leadsourcer_enrichment::profile::DiscoveredProfile;
use leadsourcer_scoring::ActivityFacts;
use leadsourcer_shared::{Job, JobParams, JobType, Result, SocialContext, SourcerError};

use crate::executor::{JobExecutor, StepTracker};
use crate::pipelines::{recompute_lead_score, stage_names};

#[instrument(skip_all, fields(job_id = %job.id))]
pub(crate) async fn run(exec: &JobExecutor, job: &Job) -> Result<()> {
    let JobParams::SocialEnrichment { contributor_id } = &job.params else {
        return Err(SourcerError::validation("job params do not match job type"));
    };

    let contributor = exec
        .storage
        .get_contributor(contributor_id)
        .await?
        .ok_or_else(|| {
            SourcerError::validation(format!("contributor {contributor_id} not found"))
        })?;

    let names = stage_names(JobType::SocialEnrichment);
    let mut steps = StepTracker::start(&exec.storage, job.id, names.len() as u32).await?;

    let mut context = exec
        .storage
        .get_social_context(contributor_id)
        .await?
        .unwrap_or_else(|| SocialContext::empty(contributor_id));

    // --- Stage 1: discover the social profile ---
    let step = steps.begin(names[0]).await?;
    let mut profile: Option<DiscoveredProfile> = None;
    let outcome: Result<String> = async {
        // A profile link in the host bio/blog beats a web search.
        if let Some((url, username)) =
            profile_from_hints(contributor.bio.as_deref(), contributor.blog.as_deref())
        {
            profile = Some(DiscoveredProfile {
                profile_url: url,
                username: Some(username),
                ..Default::default()
            });
        } else {
            let display_name = contributor
                .full_name
                .clone()
                .unwrap_or_else(|| contributor.username.clone());
            let query = person_query(
                &display_name,
                contributor.company.as_deref(),
                Some(&contributor.username),
            );
            let results = exec.search.search(&query).await?;
            profile = extract_profile(&results);
        }

        if let Some(found) = &profile {
            context.profile_url = Some(found.profile_url.clone());
            context.headline = found.headline.clone();
            context.photo_url = found.photo_url.clone();
            context.current_position = found.current_position.clone();
            context.current_company = found.current_company.clone();
            context.position_level = found.current_position.as_deref().map(position_level);
        }
        context.last_enriched_at = Utc::now();
        exec.storage.upsert_social_context(&context).await?;

        Ok(match &profile {
            Some(found) => format!("Discovered profile {}", found.profile_url),
            None => "No social profile found".to_string(),
        })
    }
    .await;
    match outcome {
        Ok(message) => steps.complete(&step, message, None).await?,
        Err(e) => {
            steps.fail(&step, &e).await;
            return Err(e);
        }
    }

    // --- Stage 2: derive sub-signals ---
    let step = steps.begin(names[1]).await?;
    let outcome: Result<String> = async {
        let company = profile
            .as_ref()
            .and_then(|p| p.current_company.clone())
            .or_else(|| contributor.company.clone())
            .map(|c| leadsourcer_enrichment::signals::clean_company(&c))
            .filter(|c| !c.is_empty());

        let company_results = match &company {
            Some(company) => exec.search.search(&company_query(company)).await?,
            None => SearchResults::default(),
        };

        let bundle = derive_signals(&contributor, profile.as_ref(), &company_results);
        context.raw_signals = Some(bundle.to_value());
        exec.storage.upsert_social_context(&context).await?;

        Ok("Derived network, career, contact, and company signals".to_string())
    }
    .await;
    match outcome {
        Ok(message) => steps.complete(&step, message, None).await?,
        Err(e) => {
            steps.fail(&step, &e).await;
            return Err(e);
        }
    }

    // --- Stage 3: classification oracle ---
    let step = steps.begin(names[2]).await?;
    let outcome: Result<String> = async {
        let stats = exec.storage.list_contributor_stats(contributor_id).await?;
        let activity = ActivityFacts::aggregate(stats.iter());

        let input = ClassifyInput {
            full_name: contributor.full_name.clone(),
            username: contributor.username.clone(),
            company: contributor.company.clone(),
            bio: contributor.bio.clone(),
            followers: contributor.followers,
            total_commits: activity.total_commits,
            commits_last_3_months: activity.commits_last_3_months,
            pull_requests: activity.pull_requests,
            is_maintainer: activity.is_maintainer,
            current_position: context.current_position.clone(),
            current_company: context.current_company.clone(),
            headline: context.headline.clone(),
        };

        let verdict = exec.oracle.classify(&input).await?;
        context.classification = Some(verdict.classification);
        context.classification_confidence = Some(verdict.confidence);
        context.classification_reasoning = Some(verdict.reasoning.clone());
        context.industry = verdict.industry.clone();
        if let Some(organization) = verdict.organization.clone() {
            context.current_company = Some(organization);
        }
        context.last_enriched_at = Utc::now();
        exec.storage.upsert_social_context(&context).await?;

        Ok(format!("Classified as {}", verdict.classification.as_str()))
    }
    .await;
    match outcome {
        Ok(message) => steps.complete(&step, message, None).await?,
        Err(e) => {
            steps.fail(&step, &e).await;
            return Err(e);
        }
    }

    // --- Stage 4: rescore everywhere the contributor appears ---
    let step = steps.begin(names[3]).await?;
    let outcome: Result<String> = async {
        let mut projects = exec
            .storage
            .list_projects_for_contributor(contributor_id)
            .await?;
        if let Some(project_id) = &job.project_id {
            if !projects.contains(project_id) {
                projects.push(project_id.clone());
            }
        }

        for project_id in &projects {
            recompute_lead_score(&exec.storage, project_id, contributor_id).await?;
        }
        Ok(format!("Recomputed scores in {} project(s)", projects.len()))
    }
    .await;
    match outcome {
        Ok(message) => steps.complete(&step, message, None).await?,
        Err(e) => {
            steps.fail(&step, &e).await;
            return Err(e);
        }
    }

    info!(contributor = %contributor.username, "enrichment run finished");
    Ok(())
}
