//! Web-search client for profile discovery and company intelligence.
//!
//! Speaks the Serper-style JSON search API. Results for identical queries
//! are cached in memory for the lifetime of the client, since one
//! enrichment run can ask the same question from several stages.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use leadsourcer_gate::{ApiGate, Provider};
use leadsourcer_shared::{Result, SourcerError};

/// Number of organic results requested per query.
const RESULT_COUNT: u32 = 5;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One organic search hit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganicResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Raw search response, as persisted into the enrichment payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub organic: Vec<OrganicResult>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.organic.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Query builders
// ---------------------------------------------------------------------------

/// Build a person-discovery query from name + company + username hints.
pub fn person_query(name: &str, company: Option<&str>, username: Option<&str>) -> String {
    let mut parts = vec![format!("\"{name}\""), "site:linkedin.com/in/".to_string()];
    if let Some(company) = company.filter(|c| !c.trim().is_empty()) {
        parts.push(format!("\"{}\"", company.trim()));
    }
    if let Some(username) = username.filter(|u| !u.trim().is_empty()) {
        parts.push(username.trim().to_string());
    }
    parts.join(" ")
}

/// Build a company-intelligence query.
pub fn company_query(company: &str) -> String {
    format!("\"{}\" company size OR funding OR headquarters", company.trim())
}

fn query_fingerprint(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// SearchClient
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: u32,
}

/// Client for the web-search provider.
pub struct SearchClient {
    http: Client,
    endpoint: Url,
    api_key: Option<String>,
    gate: Arc<ApiGate>,
    cache: Mutex<HashMap<String, SearchResults>>,
}

impl SearchClient {
    pub fn new(endpoint: &str, api_key: Option<String>, gate: Arc<ApiGate>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SourcerError::Network(format!("failed to build HTTP client: {e}")))?;

        let endpoint = Url::parse(endpoint)
            .map_err(|e| SourcerError::config(format!("invalid search endpoint {endpoint}: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            api_key,
            gate,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Run a search query through the gate.
    ///
    /// Without an API key this degrades to empty results so enrichment can
    /// still classify on activity alone.
    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("search API key not configured, returning empty results");
            return Ok(SearchResults::default());
        };

        let fingerprint = query_fingerprint(query);
        if let Some(cached) = self.cache.lock().await.get(&fingerprint) {
            debug!(query, "search cache hit");
            return Ok(cached.clone());
        }

        let results = self
            .gate
            .call(Provider::Search, || self.search_once(query, api_key))
            .await?;

        self.cache
            .lock()
            .await
            .insert(fingerprint, results.clone());
        Ok(results)
    }

    async fn search_once(&self, query: &str, api_key: &str) -> Result<SearchResults> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("X-API-KEY", api_key)
            .json(&SearchRequest {
                q: query,
                num: RESULT_COUNT,
            })
            .send()
            .await
            .map_err(|e| SourcerError::Network(format!("search request failed: {e}")))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(SourcerError::RateLimited {
                provider: Provider::Search.as_str().into(),
                retry_after_secs: retry_after,
            });
        }

        if status.is_server_error() {
            return Err(SourcerError::Network(format!("search: HTTP {status}")));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.trim().chars().take(200).collect();
            return Err(SourcerError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<SearchResults>()
            .await
            .map_err(|e| SourcerError::Provider {
                status: status.as_u16(),
                message: format!("invalid search response: {e}"),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use leadsourcer_gate::GatePolicy;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_gate() -> Arc<ApiGate> {
        Arc::new(ApiGate::new(GatePolicy {
            retry_attempts: 2,
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(2),
            max_quota_wait: Duration::from_millis(20),
        }))
    }

    #[test]
    fn person_query_includes_hints() {
        let q = person_query("Alice Smith", Some("Acme"), Some("asmith"));
        assert!(q.contains("\"Alice Smith\""));
        assert!(q.contains("site:linkedin.com/in/"));
        assert!(q.contains("\"Acme\""));
        assert!(q.contains("asmith"));

        let bare = person_query("Bob", None, None);
        assert_eq!(bare, "\"Bob\" site:linkedin.com/in/");
    }

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(query_fingerprint("abc"), query_fingerprint("abc"));
        assert_ne!(query_fingerprint("abc"), query_fingerprint("abd"));
        assert_eq!(query_fingerprint("abc").len(), 64);
    }

    #[tokio::test]
    async fn missing_key_returns_empty_results() {
        let client = SearchClient::new("https://search.example/q", None, test_gate()).unwrap();
        let results = client.search("anything").await.expect("empty ok");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_fixture_parses() {
        let fixture = std::fs::read_to_string("../../../fixtures/json/search.fixture.json")
            .expect("read fixture");

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-API-KEY", "test-key"))
            .and(body_partial_json(serde_json::json!({"num": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture))
            .mount(&server)
            .await;

        let client =
            SearchClient::new(&server.uri(), Some("test-key".into()), test_gate()).unwrap();
        let results = client
            .search("\"Alice Smith\" site:linkedin.com/in/")
            .await
            .expect("search ok");

        assert_eq!(results.organic.len(), 3);
        assert!(results.organic[0].link.contains("linkedin.com/in/"));
    }

    #[tokio::test]
    async fn identical_queries_hit_the_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organic": [{"title": "t", "link": "l", "snippet": "s"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            SearchClient::new(&server.uri(), Some("test-key".into()), test_gate()).unwrap();
        let first = client.search("same query").await.unwrap();
        let second = client.search("same query").await.unwrap();
        assert_eq!(first.organic.len(), second.organic.len());
    }

    #[tokio::test]
    async fn rate_limit_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "120"))
            .mount(&server)
            .await;

        let client =
            SearchClient::new(&server.uri(), Some("test-key".into()), test_gate()).unwrap();
        let err = client.search("q").await.unwrap_err();
        assert!(matches!(err, SourcerError::RateLimited { .. }));
    }
}
