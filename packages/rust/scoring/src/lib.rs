//! Lead scoring engine.
//!
//! Pure functions, no I/O: multi-dimensional signals in, a bounded
//! composite score and qualification decision out. Component scores are
//! bucketed, monotonic, and clamped to [0, 100], so the weighted sum never
//! leaves [0, 100] and recomputation from identical inputs is always
//! identical.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use leadsourcer_shared::{
    Classification, Contributor, ContributorStats, LeadScore, PositionLevel, Priority,
    SocialContext,
};

/// Component weights. Position carries the most weight for outreach.
pub const WEIGHT_ACTIVITY: f64 = 0.25;
pub const WEIGHT_INFLUENCE: f64 = 0.20;
pub const WEIGHT_POSITION: f64 = 0.40;
pub const WEIGHT_ENGAGEMENT: f64 = 0.15;

/// A lead is qualified at or above this overall score.
pub const QUALIFIED_THRESHOLD: f64 = 60.0;

/// High-priority cutoff.
pub const HIGH_PRIORITY_THRESHOLD: f64 = 80.0;

// ---------------------------------------------------------------------------
// Input facts
// ---------------------------------------------------------------------------

/// Contribution-activity facts for one contributor, aggregated across the
/// project's repositories.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ActivityFacts {
    pub total_commits: i64,
    pub commits_last_3_months: i64,
    pub pull_requests: i64,
    pub issues_opened: i64,
    pub code_reviews: i64,
    pub is_maintainer: bool,
}

impl ActivityFacts {
    /// Aggregate stats rows (one per repository) into project-level facts.
    pub fn aggregate<'a>(rows: impl IntoIterator<Item = &'a ContributorStats>) -> Self {
        let mut facts = Self::default();
        for stats in rows {
            facts.total_commits += stats.total_commits;
            facts.commits_last_3_months += stats.commits_last_3_months;
            facts.pull_requests += stats.pull_requests;
            facts.issues_opened += stats.issues_opened;
            facts.code_reviews += stats.code_reviews;
            facts.is_maintainer = facts.is_maintainer || stats.is_maintainer;
        }
        facts
    }
}

/// Host-profile reach facts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfluenceFacts {
    pub followers: i64,
    pub public_repos: i64,
    pub has_company: bool,
}

impl From<&Contributor> for InfluenceFacts {
    fn from(contributor: &Contributor) -> Self {
        Self {
            followers: contributor.followers,
            public_repos: contributor.public_repos,
            has_company: contributor
                .company
                .as_deref()
                .is_some_and(|c| !c.trim().is_empty()),
        }
    }
}

/// Professional-position facts from social enrichment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PositionFacts {
    pub classification: Option<Classification>,
    pub position_level: Option<PositionLevel>,
}

impl From<Option<&SocialContext>> for PositionFacts {
    fn from(social: Option<&SocialContext>) -> Self {
        match social {
            Some(ctx) => Self {
                classification: ctx.classification,
                position_level: ctx.position_level,
            },
            None => Self::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Component scores
// ---------------------------------------------------------------------------

/// Activity score: recent commits (40) + total commits (30) + PRs (20) +
/// maintainer status (10).
pub fn activity_score(facts: &ActivityFacts) -> f64 {
    let mut score: f64 = 0.0;

    score += match facts.commits_last_3_months {
        n if n >= 50 => 40.0,
        n if n >= 20 => 30.0,
        n if n >= 10 => 20.0,
        n if n >= 5 => 10.0,
        _ => 0.0,
    };

    score += match facts.total_commits {
        n if n >= 500 => 30.0,
        n if n >= 200 => 25.0,
        n if n >= 100 => 20.0,
        n if n >= 50 => 15.0,
        n if n >= 10 => 10.0,
        _ => 0.0,
    };

    score += match facts.pull_requests {
        n if n >= 50 => 20.0,
        n if n >= 20 => 15.0,
        n if n >= 10 => 10.0,
        n if n >= 5 => 5.0,
        _ => 0.0,
    };

    if facts.is_maintainer {
        score += 10.0;
    }

    score.min(100.0)
}

/// Influence score: followers (50) + public repos (30) + has company (20).
pub fn influence_score(facts: &InfluenceFacts) -> f64 {
    let mut score: f64 = 0.0;

    score += match facts.followers {
        n if n >= 1_000 => 50.0,
        n if n >= 500 => 40.0,
        n if n >= 100 => 30.0,
        n if n >= 50 => 20.0,
        n if n >= 10 => 10.0,
        _ => 0.0,
    };

    score += match facts.public_repos {
        n if n >= 50 => 30.0,
        n if n >= 20 => 20.0,
        n if n >= 10 => 15.0,
        n if n >= 5 => 10.0,
        _ => 0.0,
    };

    if facts.has_company {
        score += 20.0;
    }

    score.min(100.0)
}

/// Position score: classification (60) + seniority level (40).
pub fn position_score(facts: &PositionFacts) -> f64 {
    let mut score: f64 = 0.0;

    score += match facts.classification {
        Some(Classification::DecisionMaker) => 60.0,
        Some(Classification::KeyContributor) => 40.0,
        Some(Classification::HighImpact) => 20.0,
        None => 0.0,
    };

    score += match facts.position_level {
        Some(PositionLevel::CSuite) => 40.0,
        Some(PositionLevel::Director) => 35.0,
        Some(PositionLevel::Manager) => 25.0,
        Some(PositionLevel::Lead) => 20.0,
        Some(PositionLevel::Senior) => 15.0,
        Some(PositionLevel::Mid) => 10.0,
        Some(PositionLevel::Entry) => 5.0,
        Some(PositionLevel::Unknown) | None => 0.0,
    };

    score.min(100.0)
}

/// Engagement score: issues (30) + code reviews (30) + commit recency (40).
pub fn engagement_score(facts: &ActivityFacts) -> f64 {
    let mut score: f64 = 0.0;

    score += match facts.issues_opened {
        n if n >= 20 => 30.0,
        n if n >= 10 => 20.0,
        n if n >= 5 => 10.0,
        _ => 0.0,
    };

    score += match facts.code_reviews {
        n if n >= 50 => 30.0,
        n if n >= 20 => 20.0,
        n if n >= 10 => 10.0,
        _ => 0.0,
    };

    let recency_ratio = if facts.total_commits > 0 {
        facts.commits_last_3_months as f64 / facts.total_commits as f64
    } else {
        0.0
    };

    score += match recency_ratio {
        r if r >= 0.5 => 40.0,
        r if r >= 0.3 => 30.0,
        r if r >= 0.2 => 20.0,
        r if r >= 0.1 => 10.0,
        _ => 0.0,
    };

    score.min(100.0)
}

// ---------------------------------------------------------------------------
// Composite score
// ---------------------------------------------------------------------------

/// Full score breakdown for one (project, contributor) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub activity: f64,
    pub influence: f64,
    pub position: f64,
    pub engagement: f64,
    pub overall: f64,
    pub is_qualified: bool,
    pub priority: Priority,
}

/// Weighted overall score from four component scores.
pub fn overall_score(activity: f64, influence: f64, position: f64, engagement: f64) -> f64 {
    activity * WEIGHT_ACTIVITY
        + influence * WEIGHT_INFLUENCE
        + position * WEIGHT_POSITION
        + engagement * WEIGHT_ENGAGEMENT
}

/// Priority bucket for an overall score.
pub fn priority_for(overall: f64) -> Priority {
    if overall >= HIGH_PRIORITY_THRESHOLD {
        Priority::High
    } else if overall >= QUALIFIED_THRESHOLD {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Compute the full breakdown from input facts.
pub fn compute(
    activity: &ActivityFacts,
    influence: &InfluenceFacts,
    position: &PositionFacts,
) -> ScoreBreakdown {
    let activity_component = activity_score(activity);
    let influence_component = influence_score(influence);
    let position_component = position_score(position);
    let engagement_component = engagement_score(activity);

    let overall = overall_score(
        activity_component,
        influence_component,
        position_component,
        engagement_component,
    );

    ScoreBreakdown {
        activity: activity_component,
        influence: influence_component,
        position: position_component,
        engagement: engagement_component,
        overall,
        is_qualified: overall >= QUALIFIED_THRESHOLD,
        priority: priority_for(overall),
    }
}

impl ScoreBreakdown {
    /// Materialize the breakdown as a persistable [`LeadScore`] row.
    pub fn into_lead_score(
        self,
        project_id: impl Into<String>,
        contributor_id: impl Into<String>,
    ) -> LeadScore {
        LeadScore {
            project_id: project_id.into(),
            contributor_id: contributor_id.into(),
            overall_score: self.overall,
            activity_score: self.activity,
            influence_score: self.influence,
            position_score: self.position,
            engagement_score: self.engagement,
            is_qualified: self.is_qualified,
            priority: self.priority,
            calculated_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
