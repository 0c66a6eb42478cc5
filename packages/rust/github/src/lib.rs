//! Repository-host REST client.
//!
//! Every request is routed through the shared [`ApiGate`], which handles
//! backoff and quota waits; this crate maps HTTP responses onto the error
//! taxonomy (rate-limit vs. transient vs. permanent) and parses quota
//! headers back into the gate.

mod types;
mod windows;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use reqwest::{Client, Response, StatusCode, header};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use leadsourcer_gate::{ApiGate, Provider};
use leadsourcer_shared::{Result, SourcerError};

pub use types::{AccountProfile, ActivityWindows, RepoInfo};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("LeadSourcer/", env!("CARGO_PKG_VERSION"));

/// Page size used for list endpoints.
const PAGE_SIZE: u32 = 100;

// ---------------------------------------------------------------------------
// GithubClient
// ---------------------------------------------------------------------------

/// Client for the repository host's REST API.
pub struct GithubClient {
    http: Client,
    base: Url,
    gate: Arc<ApiGate>,
}

impl GithubClient {
    /// Create a client against `api_base` (the production API or a test
    /// server), authenticating with `token` when given.
    pub fn new(api_base: &str, token: Option<&str>, gate: Arc<ApiGate>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = token {
            let value = header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| SourcerError::config(format!("invalid API token: {e}")))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SourcerError::Network(format!("failed to build HTTP client: {e}")))?;

        let base = Url::parse(api_base)
            .map_err(|e| SourcerError::config(format!("invalid API base {api_base}: {e}")))?;

        Ok(Self { http, base, gate })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| SourcerError::validation(format!("invalid API path {path}: {e}")))
    }

    /// Fetch repository metadata.
    #[instrument(skip(self))]
    pub async fn get_repository(&self, owner: &str, name: &str) -> Result<RepoInfo> {
        let url = self.endpoint(&format!("repos/{owner}/{name}"))?;
        let payload: types::RepoPayload = self
            .gate
            .call(Provider::GitHub, || self.get_json(&url))
            .await?;
        Ok(payload.into())
    }

    /// List top contributors, fetching detailed profiles for the first
    /// `detailed_limit` of them.
    #[instrument(skip(self))]
    pub async fn list_contributors(
        &self,
        owner: &str,
        name: &str,
        limit: u32,
        detailed_limit: u32,
    ) -> Result<Vec<AccountProfile>> {
        let summaries: Vec<types::ContributorPayload> = self
            .paginate(&format!("repos/{owner}/{name}/contributors"), limit)
            .await?;

        let mut profiles = Vec::with_capacity(summaries.len());
        for (idx, summary) in summaries.into_iter().enumerate() {
            let contributions = summary.contributions;
            let login = summary.login.clone();

            if (idx as u32) < detailed_limit {
                match self.get_user(&login).await {
                    Ok(mut profile) => {
                        profile.contributions = contributions;
                        profiles.push(profile);
                        continue;
                    }
                    Err(e) => {
                        // A broken profile should not sink the whole list.
                        warn!(login = %login, error = %e, "detailed profile fetch failed, keeping summary");
                    }
                }
            }
            profiles.push(AccountProfile::from_summary(summary));
        }

        Ok(profiles)
    }

    /// Fetch one account's detailed profile.
    pub async fn get_user(&self, login: &str) -> Result<AccountProfile> {
        let url = self.endpoint(&format!("users/{login}"))?;
        let payload: types::UserPayload = self
            .gate
            .call(Provider::GitHub, || self.get_json(&url))
            .await?;
        Ok(AccountProfile::from_user(payload, 0))
    }

    /// Bulk commit-activity stats, bucketed into scoring windows and keyed
    /// by lowercase username.
    ///
    /// The host answers 202 while it computes the stats; that surfaces as a
    /// transient error the gate retries.
    #[instrument(skip(self))]
    pub async fn contributor_activity(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<HashMap<String, ActivityWindows>> {
        let url = self.endpoint(&format!("repos/{owner}/{name}/stats/contributors"))?;
        let entries: Vec<types::StatsEntryPayload> = self
            .gate
            .call(Provider::GitHub, || self.get_json(&url))
            .await?;

        let now = Utc::now();
        let mut by_login = HashMap::with_capacity(entries.len());
        for entry in entries {
            let Some(author) = entry.author else {
                continue;
            };
            let mut activity =
                windows::bucket_weeks(entry.weeks.iter().map(|w| (w.w, w.c)), now);
            activity.total_commits = entry.total;
            by_login.insert(author.login.to_lowercase(), activity);
        }

        debug!(authors = by_login.len(), "bulk activity stats fetched");
        Ok(by_login)
    }

    /// PR and issue counts authored by `username` in the repository, via the
    /// search API.
    pub async fn pr_issue_counts(
        &self,
        owner: &str,
        name: &str,
        username: &str,
    ) -> Result<(i64, i64)> {
        let prs = self
            .search_issue_count(&format!("repo:{owner}/{name}+type:pr+author:{username}"))
            .await?;
        let issues = self
            .search_issue_count(&format!("repo:{owner}/{name}+type:issue+author:{username}"))
            .await?;
        Ok((prs, issues))
    }

    async fn search_issue_count(&self, query: &str) -> Result<i64> {
        let url = self.endpoint(&format!("search/issues?q={query}"))?;
        let payload: types::SearchCountPayload = self
            .gate
            .call(Provider::GitHub, || self.get_json(&url))
            .await?;
        Ok(payload.total_count)
    }

    /// List stargazers with detailed profiles, bounded by `limit`.
    #[instrument(skip(self))]
    pub async fn list_stargazers(
        &self,
        owner: &str,
        name: &str,
        limit: u32,
    ) -> Result<Vec<AccountProfile>> {
        let summaries: Vec<types::ContributorPayload> = self
            .paginate(&format!("repos/{owner}/{name}/stargazers"), limit)
            .await?;

        let mut profiles = Vec::with_capacity(summaries.len());
        for summary in summaries {
            match self.get_user(&summary.login).await {
                Ok(profile) => profiles.push(profile),
                Err(e) => {
                    warn!(login = %summary.login, error = %e, "stargazer profile fetch failed, keeping summary");
                    profiles.push(AccountProfile::from_summary(summary));
                }
            }
        }

        Ok(profiles)
    }

    /// Search for topically related repositories, most-starred first.
    #[instrument(skip(self))]
    pub async fn search_repositories(&self, query: &str, limit: u32) -> Result<Vec<RepoInfo>> {
        let mut url = self.endpoint("search/repositories")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("sort", "stars")
            .append_pair("order", "desc")
            .append_pair("per_page", &limit.to_string());

        let payload: types::RepoSearchPayload = self
            .gate
            .call(Provider::GitHub, || self.get_json(&url))
            .await?;
        Ok(payload.items.into_iter().map(Into::into).collect())
    }

    /// Fetch list pages until `limit` items are collected or a page comes
    /// back short.
    async fn paginate<T: DeserializeOwned>(&self, path: &str, limit: u32) -> Result<Vec<T>> {
        let mut collected: Vec<T> = Vec::new();
        let mut page: u32 = 1;

        while (collected.len() as u32) < limit {
            let per_page = PAGE_SIZE.min(limit - collected.len() as u32);
            let url = self.endpoint(&format!("{path}?per_page={per_page}&page={page}"))?;
            let mut items: Vec<T> = self
                .gate
                .call(Provider::GitHub, || self.get_json(&url))
                .await?;

            let got = items.len() as u32;
            collected.append(&mut items);
            if got < per_page {
                break;
            }
            page += 1;
        }

        Ok(collected)
    }

    /// One request attempt: send, observe quota headers, map the status
    /// onto the error taxonomy, decode JSON.
    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SourcerError::Network(format!("{url}: {e}")))?;

        self.observe_quota(&response).await;
        let status = response.status();

        if status == StatusCode::ACCEPTED {
            // Stats endpoints answer 202 while the host computes them.
            return Err(SourcerError::Network(format!(
                "{url}: response not ready yet (202)"
            )));
        }

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(retry_after) = rate_limit_retry_after(&response) {
                return Err(SourcerError::RateLimited {
                    provider: Provider::GitHub.as_str().into(),
                    retry_after_secs: Some(retry_after),
                });
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(SourcerError::RateLimited {
                    provider: Provider::GitHub.as_str().into(),
                    retry_after_secs: None,
                });
            }
        }

        if status.is_server_error() {
            return Err(SourcerError::Network(format!("{url}: HTTP {status}")));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.trim().chars().take(200).collect();
            return Err(SourcerError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().await.map_err(|e| SourcerError::Provider {
            status: status.as_u16(),
            message: format!("invalid response body: {e}"),
        })
    }

    /// Feed `x-ratelimit-*` headers back into the gate.
    async fn observe_quota(&self, response: &Response) {
        let Some(remaining) = header_i64(response, "x-ratelimit-remaining") else {
            return;
        };
        let reset_at = header_i64(response, "x-ratelimit-reset")
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single());
        self.gate
            .record_quota(Provider::GitHub, remaining, reset_at)
            .await;
    }
}

fn header_i64(response: &Response, name: &str) -> Option<i64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Seconds to wait, when the response carries an exhausted-quota signal.
fn rate_limit_retry_after(response: &Response) -> Option<u64> {
    if let Some(secs) = header_i64(response, "retry-after") {
        return Some(secs.max(0) as u64);
    }
    if header_i64(response, "x-ratelimit-remaining") == Some(0) {
        let reset = header_i64(response, "x-ratelimit-reset")?;
        let wait = reset - Utc::now().timestamp();
        return Some(wait.max(0) as u64);
    }
    None
}

// ---------------------------------------------------------------------------
// Repository URL parsing
// ---------------------------------------------------------------------------

/// Parse a repository reference — a full URL or an `owner/name` shorthand —
/// into `(owner, name)`.
pub fn parse_repo_url(input: &str) -> Result<(String, String)> {
    let path = if input.contains("://") {
        let url = Url::parse(input)
            .map_err(|e| SourcerError::validation(format!("unparseable repository URL {input}: {e}")))?;
        url.host_str()
            .ok_or_else(|| SourcerError::validation(format!("repository URL has no host: {input}")))?;
        url.path().trim_matches('/').to_string()
    } else {
        input.trim_matches('/').to_string()
    };

    let mut segments = path.split('/');
    match (segments.next(), segments.next()) {
        (Some(owner), Some(name)) if !owner.is_empty() && !name.is_empty() => {
            let name = name.trim_end_matches(".git");
            Ok((owner.to_string(), name.to_string()))
        }
        _ => Err(SourcerError::validation(format!(
            "repository reference must be owner/name or a repository URL: {input}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
