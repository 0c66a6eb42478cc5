//! Wire payloads for the repository-host REST API and the typed results
//! exposed to the pipelines.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use leadsourcer_shared::Contributor;

// ---------------------------------------------------------------------------
// Wire payloads (subset of the REST responses we consume)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RepoPayload {
    pub full_name: String,
    pub name: String,
    pub owner: OwnerPayload,
    pub description: Option<String>,
    pub stargazers_count: i64,
    pub forks_count: i64,
    pub open_issues_count: i64,
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OwnerPayload {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ContributorPayload {
    pub id: i64,
    pub login: String,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub contributions: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UserPayload {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub blog: Option<String>,
    pub twitter_username: Option<String>,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub public_repos: i64,
    #[serde(default)]
    pub followers: i64,
    #[serde(default)]
    pub following: i64,
}

/// One entry of the bulk commit-activity endpoint: weekly buckets per author.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatsEntryPayload {
    pub total: i64,
    pub author: Option<ContributorPayload>,
    #[serde(default)]
    pub weeks: Vec<WeekPayload>,
}

/// One weekly bucket: `w` is the week start (unix seconds), `c` the commits.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct WeekPayload {
    pub w: i64,
    #[serde(default)]
    pub c: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SearchCountPayload {
    pub total_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RepoSearchPayload {
    #[serde(default)]
    pub items: Vec<RepoPayload>,
}

// ---------------------------------------------------------------------------
// Typed results
// ---------------------------------------------------------------------------

/// Repository metadata as consumed by the sourcing pipeline.
#[derive(Debug, Clone)]
pub struct RepoInfo {
    pub full_name: String,
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub stars: i64,
    pub forks: i64,
    pub open_issues: i64,
    pub language: Option<String>,
    pub topics: Vec<String>,
    pub url: String,
}

impl From<RepoPayload> for RepoInfo {
    fn from(payload: RepoPayload) -> Self {
        Self {
            full_name: payload.full_name,
            owner: payload.owner.login,
            name: payload.name,
            description: payload.description,
            stars: payload.stargazers_count,
            forks: payload.forks_count,
            open_issues: payload.open_issues_count,
            language: payload.language,
            topics: payload.topics,
            url: payload.html_url,
        }
    }
}

/// A host account profile, from either the contributor list (summary) or a
/// detailed user fetch. `contributions` is zero for stargazers.
#[derive(Debug, Clone)]
pub struct AccountProfile {
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
    pub contributions: i64,
}

impl AccountProfile {
    pub(crate) fn from_summary(payload: ContributorPayload) -> Self {
        Self {
            account_id: payload.id,
            username: payload.login,
            full_name: None,
            email: None,
            company: None,
            location: None,
            bio: None,
            blog: None,
            twitter_username: None,
            avatar_url: payload.avatar_url,
            profile_url: payload.html_url,
            public_repos: 0,
            followers: 0,
            following: 0,
            contributions: payload.contributions,
        }
    }

    pub(crate) fn from_user(payload: UserPayload, contributions: i64) -> Self {
        Self {
            account_id: payload.id,
            username: payload.login,
            full_name: payload.name,
            email: payload.email,
            company: payload.company,
            location: payload.location,
            bio: payload.bio,
            blog: payload.blog,
            twitter_username: payload.twitter_username,
            avatar_url: payload.avatar_url,
            profile_url: payload.html_url,
            public_repos: payload.public_repos,
            followers: payload.followers,
            following: payload.following,
            contributions,
        }
    }

    /// Convert into a fresh domain row (storage keeps the existing id when
    /// the account is already known).
    pub fn into_contributor(self) -> Contributor {
        Contributor {
            id: Uuid::now_v7().to_string(),
            account_id: self.account_id,
            username: self.username,
            full_name: self.full_name,
            email: self.email,
            company: self.company,
            location: self.location,
            bio: self.bio,
            blog: self.blog,
            twitter_username: self.twitter_username,
            avatar_url: self.avatar_url,
            profile_url: self.profile_url,
            public_repos: self.public_repos,
            followers: self.followers,
            following: self.following,
        }
    }
}

/// Commit counts bucketed into the scoring windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityWindows {
    pub total_commits: i64,
    pub commits_last_3_months: i64,
    pub commits_last_6_months: i64,
    pub commits_last_year: i64,
    pub first_commit_date: Option<DateTime<Utc>>,
    pub last_commit_date: Option<DateTime<Utc>>,
}
