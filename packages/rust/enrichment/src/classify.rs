//! Contributor classification via the oracle, with a rule-based fallback.
//!
//! The oracle is an opaque chat-completions endpoint asked to return a
//! strict JSON verdict. When it is unconfigured, or answers with something
//! unparseable, classification degrades to deterministic rules over the
//! same inputs. Rate-limit signals are the exception: they propagate so the
//! job fails visibly instead of silently downgrading every lead.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use leadsourcer_gate::{ApiGate, Provider};
use leadsourcer_shared::{Classification, Result, SourcerError};

/// Sampling temperature for the classification call.
const TEMPERATURE: f32 = 0.3;

/// Response token cap; the verdict JSON is tiny.
const MAX_TOKENS: u32 = 200;

const SYSTEM_PROMPT: &str = "You are an expert at analyzing professional profiles and \
classifying leads for B2B sales. Return only valid JSON.";

// ---------------------------------------------------------------------------
// Input / output types
// ---------------------------------------------------------------------------

/// Everything the classifier may look at, assembled by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ClassifyInput {
    pub full_name: Option<String>,
    pub username: String,
    pub company: Option<String>,
    pub bio: Option<String>,
    pub followers: i64,
    pub total_commits: i64,
    pub commits_last_3_months: i64,
    pub pull_requests: i64,
    pub is_maintainer: bool,
    pub current_position: Option<String>,
    pub current_company: Option<String>,
    pub headline: Option<String>,
}

/// Classification verdict, from the oracle or the rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub classification: Classification,
    pub confidence: f64,
    pub reasoning: String,
    pub organization: Option<String>,
    pub industry: Option<String>,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OracleVerdict {
    classification: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    industry: Option<String>,
}

// ---------------------------------------------------------------------------
// OracleClient
// ---------------------------------------------------------------------------

/// Client for the classification oracle.
pub struct OracleClient {
    http: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    gate: Arc<ApiGate>,
}

impl OracleClient {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        gate: Arc<ApiGate>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SourcerError::Network(format!("failed to build HTTP client: {e}")))?;

        let endpoint = Url::parse(endpoint)
            .map_err(|e| SourcerError::config(format!("invalid oracle endpoint {endpoint}: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            api_key,
            model: model.into(),
            gate,
        })
    }

    /// Classify a contributor. Falls back to [`rule_based`] when the oracle
    /// is unconfigured or unusable; propagates rate-limit errors.
    pub async fn classify(&self, input: &ClassifyInput) -> Result<Classified> {
        let Some(api_key) = self.api_key.as_deref() else {
            debug!("oracle not configured, using rule-based classification");
            return Ok(rule_based(input));
        };

        let prompt = build_prompt(input);
        let result = self
            .gate
            .call(Provider::Oracle, || self.classify_once(&prompt, api_key))
            .await;

        match result {
            Ok(classified) => Ok(classified),
            Err(err @ SourcerError::RateLimited { .. }) => Err(err),
            Err(err) => {
                warn!(error = %err, "oracle classification failed, falling back to rules");
                Ok(rule_based(input))
            }
        }
    }

    async fn classify_once(&self, prompt: &str, api_key: &str) -> Result<Classified> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SourcerError::Network(format!("oracle request failed: {e}")))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(SourcerError::RateLimited {
                provider: Provider::Oracle.as_str().into(),
                retry_after_secs: retry_after,
            });
        }

        if status.is_server_error() {
            return Err(SourcerError::Network(format!("oracle: HTTP {status}")));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.trim().chars().take(200).collect();
            return Err(SourcerError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let payload: ChatResponse = response.json().await.map_err(|e| SourcerError::Provider {
            status: status.as_u16(),
            message: format!("invalid oracle response: {e}"),
        })?;

        let content = payload
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| SourcerError::Enrichment("oracle returned no choices".into()))?;

        parse_verdict(content)
            .ok_or_else(|| SourcerError::Enrichment(format!("unparseable verdict: {content}")))
    }
}

// ---------------------------------------------------------------------------
// Prompt & parsing
// ---------------------------------------------------------------------------

fn field(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => "Unknown",
    }
}

/// Build the classification prompt from the assembled profile.
pub fn build_prompt(input: &ClassifyInput) -> String {
    format!(
        "Contributor Information:\n\
         - Name: {name}\n\
         - Username: {username}\n\
         - Company: {company}\n\
         - Bio: {bio}\n\
         - Followers: {followers}\n\
         \n\
         Activity Stats:\n\
         - Total Commits: {total_commits}\n\
         - Commits (Last 3 months): {commits_3m}\n\
         - Pull Requests: {pull_requests}\n\
         - Is Maintainer: {is_maintainer}\n\
         \n\
         Professional Profile:\n\
         - Current Position: {position}\n\
         - Current Company: {current_company}\n\
         - Headline: {headline}\n\
         \n\
         Based on this information:\n\
         \n\
         1. Classify this contributor into one of these categories:\n\
         - DECISION_MAKER: C-suite, VPs, Directors who can make purchasing decisions\n\
         - KEY_CONTRIBUTOR: Maintainers, core team members, architects with high influence\n\
         - HIGH_IMPACT: Active contributors with significant recent activity\n\
         \n\
         2. Infer their organization and industry from all available signals.\n\
         \n\
         Return ONLY a JSON object with these fields:\n\
         {{\"classification\": \"DECISION_MAKER|KEY_CONTRIBUTOR|HIGH_IMPACT\", \
         \"confidence\": 0.0-1.0, \"reasoning\": \"brief explanation\", \
         \"organization\": \"employer or null\", \"industry\": \"sector or null\"}}",
        name = field(input.full_name.as_deref()),
        username = input.username,
        company = field(input.company.as_deref()),
        bio = field(input.bio.as_deref()),
        followers = input.followers,
        total_commits = input.total_commits,
        commits_3m = input.commits_last_3_months,
        pull_requests = input.pull_requests,
        is_maintainer = input.is_maintainer,
        position = field(input.current_position.as_deref()),
        current_company = field(input.current_company.as_deref()),
        headline = field(input.headline.as_deref()),
    )
}

/// Parse the oracle's verdict, tolerating markdown code fences.
pub(crate) fn parse_verdict(text: &str) -> Option<Classified> {
    let mut body = text.trim();
    if body.starts_with("```") {
        body = body.trim_start_matches("```");
        body = body.strip_prefix("json").unwrap_or(body);
        if let Some(end) = body.find("```") {
            body = &body[..end];
        }
    }

    let verdict: OracleVerdict = serde_json::from_str(body.trim()).ok()?;
    let classification: Classification = verdict.classification.parse().ok()?;

    Some(Classified {
        classification,
        confidence: verdict.confidence.clamp(0.0, 1.0),
        reasoning: verdict.reasoning,
        organization: verdict.organization.filter(|o| !o.is_empty()),
        industry: verdict.industry.filter(|i| !i.is_empty()),
    })
}

// ---------------------------------------------------------------------------
// Rule-based fallback
// ---------------------------------------------------------------------------

const DECISION_MAKER_TERMS: &[&str] = &[
    "ceo",
    "cto",
    "cfo",
    "coo",
    "vp",
    "vice president",
    "director",
    "head of",
    "chief",
    "founder",
];

/// Deterministic classification over the same inputs the oracle sees.
pub fn rule_based(input: &ClassifyInput) -> Classified {
    let organization = input
        .current_company
        .clone()
        .or_else(|| input.company.clone())
        .filter(|c| !c.trim().is_empty());

    let position = input
        .current_position
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();

    if DECISION_MAKER_TERMS.iter().any(|t| position.contains(t)) {
        return Classified {
            classification: Classification::DecisionMaker,
            confidence: 0.8,
            reasoning: "Senior leadership position".into(),
            organization,
            industry: None,
        };
    }

    if input.is_maintainer || input.total_commits > 100 {
        return Classified {
            classification: Classification::KeyContributor,
            confidence: 0.7,
            reasoning: "High contribution level or maintainer status".into(),
            organization,
            industry: None,
        };
    }

    if input.commits_last_3_months >= 10 {
        return Classified {
            classification: Classification::HighImpact,
            confidence: 0.6,
            reasoning: "Recent active contributions".into(),
            organization,
            industry: None,
        };
    }

    Classified {
        classification: Classification::HighImpact,
        confidence: 0.4,
        reasoning: "Active contributor".into(),
        organization,
        industry: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use leadsourcer_gate::GatePolicy;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_gate() -> Arc<ApiGate> {
        Arc::new(ApiGate::new(GatePolicy {
            retry_attempts: 2,
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(2),
            max_quota_wait: Duration::from_millis(20),
        }))
    }

    fn maintainer_input() -> ClassifyInput {
        ClassifyInput {
            full_name: Some("Alice Smith".into()),
            username: "asmith".into(),
            company: Some("Acme".into()),
            followers: 250,
            total_commits: 400,
            commits_last_3_months: 30,
            pull_requests: 20,
            is_maintainer: true,
            ..Default::default()
        }
    }

    #[test]
    fn parse_plain_verdict() {
        let verdict = parse_verdict(
            r#"{"classification": "DECISION_MAKER", "confidence": 0.9,
                "reasoning": "VP title", "organization": "Acme", "industry": "DevTools"}"#,
        )
        .expect("parse");
        assert_eq!(verdict.classification, Classification::DecisionMaker);
        assert!((verdict.confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(verdict.organization.as_deref(), Some("Acme"));
    }

    #[test]
    fn parse_fenced_verdict() {
        let text = "```json\n{\"classification\": \"KEY_CONTRIBUTOR\", \"confidence\": 0.7, \"reasoning\": \"maintainer\"}\n```";
        let verdict = parse_verdict(text).expect("parse fenced");
        assert_eq!(verdict.classification, Classification::KeyContributor);
    }

    #[test]
    fn parse_clamps_confidence() {
        let verdict = parse_verdict(
            r#"{"classification": "HIGH_IMPACT", "confidence": 3.5, "reasoning": ""}"#,
        )
        .expect("parse");
        assert!((verdict.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_verdict("I think they are important").is_none());
        assert!(parse_verdict(r#"{"classification": "SOMETHING_ELSE"}"#).is_none());
    }

    #[test]
    fn rule_based_tiers() {
        let leader = ClassifyInput {
            current_position: Some("VP of Engineering".into()),
            ..Default::default()
        };
        assert_eq!(
            rule_based(&leader).classification,
            Classification::DecisionMaker
        );

        assert_eq!(
            rule_based(&maintainer_input()).classification,
            Classification::KeyContributor
        );

        let active = ClassifyInput {
            commits_last_3_months: 15,
            ..Default::default()
        };
        assert_eq!(rule_based(&active).classification, Classification::HighImpact);

        let quiet = ClassifyInput::default();
        let verdict = rule_based(&quiet);
        assert_eq!(verdict.classification, Classification::HighImpact);
        assert!((verdict.confidence - 0.4).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn unconfigured_oracle_uses_rules() {
        let client =
            OracleClient::new("https://oracle.example/v1", None, "gpt-4o-mini", test_gate())
                .unwrap();
        let verdict = client.classify(&maintainer_input()).await.expect("classify");
        assert_eq!(verdict.classification, Classification::KeyContributor);
    }

    #[tokio::test]
    async fn oracle_verdict_is_used_when_valid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"max_tokens": 200})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content":
                    "{\"classification\": \"DECISION_MAKER\", \"confidence\": 0.85, \
                     \"reasoning\": \"VP title and company context\", \
                     \"organization\": \"Acme Corp\", \"industry\": \"Developer Tools\"}"
                }}]
            })))
            .mount(&server)
            .await;

        let client = OracleClient::new(
            &server.uri(),
            Some("test-key".into()),
            "gpt-4o-mini",
            test_gate(),
        )
        .unwrap();

        let verdict = client.classify(&maintainer_input()).await.expect("classify");
        assert_eq!(verdict.classification, Classification::DecisionMaker);
        assert_eq!(verdict.industry.as_deref(), Some("Developer Tools"));
    }

    #[tokio::test]
    async fn garbage_oracle_output_falls_back_to_rules() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "They seem nice."}}]
            })))
            .mount(&server)
            .await;

        let client = OracleClient::new(
            &server.uri(),
            Some("test-key".into()),
            "gpt-4o-mini",
            test_gate(),
        )
        .unwrap();

        let verdict = client.classify(&maintainer_input()).await.expect("fallback");
        assert_eq!(verdict.classification, Classification::KeyContributor);
    }

    #[tokio::test]
    async fn oracle_rate_limit_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "600"))
            .mount(&server)
            .await;

        let client = OracleClient::new(
            &server.uri(),
            Some("test-key".into()),
            "gpt-4o-mini",
            test_gate(),
        )
        .unwrap();

        let err = client.classify(&maintainer_input()).await.unwrap_err();
        assert!(matches!(err, SourcerError::RateLimited { .. }));
    }
}
