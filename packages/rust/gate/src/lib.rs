//! Rate-limited gate for outbound provider calls.
//!
//! Every external request — repository host, search provider, classification
//! oracle — passes through an [`ApiGate`] shared by all running jobs. The
//! gate tracks remaining quota per provider (fed from response headers by
//! the clients), blocks with a bounded wait when a quota window is
//! exhausted, and retries transient failures with exponential backoff.
//! Permanent provider errors are surfaced immediately.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use leadsourcer_shared::{Result, SourcerError};

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// An external data provider with its own quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Repository host REST API.
    GitHub,
    /// Web-search / profile-discovery provider.
    Search,
    /// Classification oracle.
    Oracle,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Search => "search",
            Self::Oracle => "oracle",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Retry and quota-wait policy applied to every gated call.
#[derive(Debug, Clone)]
pub struct GatePolicy {
    /// Total attempts per call, first try included.
    pub retry_attempts: u32,
    /// Base delay for exponential backoff.
    pub backoff_base: Duration,
    /// Upper bound on a single backoff delay.
    pub backoff_cap: Duration,
    /// Ceiling on how long a call may wait for quota before escalating.
    pub max_quota_wait: Duration,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(10),
            max_quota_wait: Duration::from_secs(60),
        }
    }
}

impl GatePolicy {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }
}

// ---------------------------------------------------------------------------
// Quota tracking
// ---------------------------------------------------------------------------

/// Last-observed quota state for one provider.
#[derive(Debug, Clone, Default)]
struct QuotaState {
    remaining: Option<i64>,
    reset_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// ApiGate
// ---------------------------------------------------------------------------

/// Shared gate protecting fixed external quotas across all running jobs.
pub struct ApiGate {
    policy: GatePolicy,
    quotas: Mutex<HashMap<Provider, QuotaState>>,
}

impl ApiGate {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            quotas: Mutex::new(HashMap::new()),
        }
    }

    /// Record quota information observed in a provider response.
    pub async fn record_quota(
        &self,
        provider: Provider,
        remaining: i64,
        reset_at: Option<DateTime<Utc>>,
    ) {
        let mut quotas = self.quotas.lock().await;
        let state = quotas.entry(provider).or_default();
        state.remaining = Some(remaining);
        if reset_at.is_some() {
            state.reset_at = reset_at;
        }
        debug!(provider = %provider, remaining, "quota recorded");
    }

    /// How long the next call must wait for quota, if at all.
    ///
    /// Returns an error when the wait would exceed the configured ceiling.
    async fn quota_delay(&self, provider: Provider) -> Result<Option<Duration>> {
        let quotas = self.quotas.lock().await;
        let Some(state) = quotas.get(&provider) else {
            return Ok(None);
        };

        if state.remaining != Some(0) {
            return Ok(None);
        }

        let Some(reset_at) = state.reset_at else {
            return Ok(None);
        };

        let wait = (reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if wait.is_zero() {
            return Ok(None);
        }

        if wait > self.policy.max_quota_wait {
            return Err(SourcerError::RateLimited {
                provider: provider.as_str().into(),
                retry_after_secs: Some(wait.as_secs()),
            });
        }

        Ok(Some(wait))
    }

    /// Run `op` through the gate: wait for quota, then retry transient
    /// failures with exponential backoff up to the configured attempt budget.
    ///
    /// `op` is invoked once per attempt and must build a fresh request each
    /// time.
    pub async fn call<T, F, Fut>(&self, provider: Provider, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 1;

        loop {
            if let Some(wait) = self.quota_delay(provider).await? {
                debug!(provider = %provider, wait_ms = wait.as_millis() as u64, "waiting for quota window");
                tokio::time::sleep(wait).await;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.policy.retry_attempts => {
                    let delay = match &err {
                        SourcerError::RateLimited {
                            retry_after_secs: Some(secs),
                            ..
                        } => {
                            let wait = Duration::from_secs(*secs);
                            if wait > self.policy.max_quota_wait {
                                return Err(err);
                            }
                            wait
                        }
                        _ => self.policy.backoff_delay(attempt),
                    };

                    warn!(
                        provider = %provider,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient provider error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for ApiGate {
    fn default() -> Self {
        Self::new(GatePolicy::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
