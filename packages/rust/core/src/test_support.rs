//! Shared fixtures for executor and scheduler tests: a temp database plus
//! mock provider servers wired into a ready-to-run executor.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use uuid::Uuid;
use wiremock::MockServer;

use leadsourcer_enrichment::{OracleClient, SearchClient};
use leadsourcer_gate::{ApiGate, GatePolicy};
use leadsourcer_github::GithubClient;
use leadsourcer_shared::{
    Contributor, Job, JobId, JobParams, Repository, SourcingInterval, WorkerConfig,
};
use leadsourcer_storage::Storage;

use crate::executor::{JobExecutor, PipelineLimits};
use crate::scheduler::{Scheduler, WakeHandle};

pub(crate) struct Harness {
    pub storage: Arc<Storage>,
    pub executor: Arc<JobExecutor>,
    pub github: MockServer,
    pub search: MockServer,
    pub oracle: MockServer,
}

fn fast_gate() -> Arc<ApiGate> {
    Arc::new(ApiGate::new(GatePolicy {
        retry_attempts: 2,
        backoff_base: Duration::from_millis(1),
        backoff_cap: Duration::from_millis(2),
        max_quota_wait: Duration::from_millis(20),
    }))
}

async fn build(search_key: Option<&str>, oracle_key: Option<&str>) -> Harness {
    let github = MockServer::start().await;
    let search = MockServer::start().await;
    let oracle = MockServer::start().await;

    let tmp = std::env::temp_dir().join(format!("ls_core_test_{}.db", Uuid::now_v7()));
    let storage = Arc::new(Storage::open(&tmp).await.expect("open test db"));

    let gate = fast_gate();
    let github_client =
        Arc::new(GithubClient::new(&github.uri(), Some("test-token"), gate.clone()).unwrap());
    let search_client = Arc::new(
        SearchClient::new(&search.uri(), search_key.map(str::to_owned), gate.clone()).unwrap(),
    );
    let oracle_client = Arc::new(
        OracleClient::new(
            &oracle.uri(),
            oracle_key.map(str::to_owned),
            "test-model",
            gate.clone(),
        )
        .unwrap(),
    );

    let executor = Arc::new(JobExecutor::new(
        storage.clone(),
        github_client,
        search_client,
        oracle_client,
        PipelineLimits {
            contributor_limit: 10,
            stargazer_limit: 10,
            detailed_profile_limit: 2,
            fetch_pr_issue_counts: false,
        },
    ));

    Harness {
        storage,
        executor,
        github,
        search,
        oracle,
    }
}

/// Harness with search + oracle keys configured (mock servers must answer).
pub(crate) async fn harness() -> Harness {
    build(Some("test-key"), Some("test-key")).await
}

/// Harness with no provider keys: enrichment degrades to empty search
/// results and rule-based classification, so jobs run without any mocks.
pub(crate) async fn offline_harness() -> Harness {
    build(None, None).await
}

impl Harness {
    pub fn scheduler(&self, max_concurrent_jobs: usize) -> Scheduler {
        Scheduler::new(
            self.storage.clone(),
            self.executor.clone(),
            WorkerConfig {
                check_interval: Duration::from_millis(50),
                max_concurrent_jobs,
            },
            WakeHandle::new(),
        )
    }

    /// Upsert a contributor and enqueue an enrichment job for them.
    pub async fn enqueue_enrichment_job(&self, username: &str) -> JobId {
        let contributor_id = self
            .storage
            .upsert_contributor(&sample_contributor(next_account_id(), username))
            .await
            .expect("upsert contributor");

        let job = Job::new(JobParams::SocialEnrichment { contributor_id }, None);
        self.storage.enqueue_job(&job).await.expect("enqueue job");
        job.id
    }
}

static ACCOUNT_SEQ: AtomicI64 = AtomicI64::new(1_000);

pub(crate) fn next_account_id() -> i64 {
    ACCOUNT_SEQ.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn sample_repository(
    project_id: &str,
    full_name: &str,
    interval: SourcingInterval,
) -> Repository {
    let (owner, name) = full_name.split_once('/').expect("owner/name");
    Repository::new(
        project_id,
        format!("https://github.com/{full_name}"),
        owner,
        name,
        interval,
    )
}

pub(crate) fn sample_contributor(account_id: i64, username: &str) -> Contributor {
    Contributor {
        id: Uuid::now_v7().to_string(),
        account_id,
        username: username.into(),
        full_name: Some(format!("{username} Person")),
        email: None,
        company: None,
        location: None,
        bio: None,
        blog: None,
        twitter_username: None,
        avatar_url: None,
        profile_url: None,
        public_repos: 5,
        followers: 20,
        following: 3,
    }
}
