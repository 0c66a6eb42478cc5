//! Scheduler/poller: discovers due work and admits jobs under the
//! concurrency budget.
//!
//! The loop ticks on a fixed cadence as a reconciliation sweep, and wakes
//! early through a [`WakeHandle`] when the enqueue path signals new work.
//! Each tick is fault-isolated: a failed scan or claim is logged and the
//! loop keeps running. The scheduler only admits; admitted jobs execute on
//! their own tasks, each holding one [`JobLimiter`] permit.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use leadsourcer_shared::{Job, JobParams, Result, SourcerError, WorkerConfig};
use leadsourcer_storage::Storage;

use crate::executor::JobExecutor;
use crate::limiter::JobLimiter;

// ---------------------------------------------------------------------------
// WakeHandle
// ---------------------------------------------------------------------------

/// Cloneable handle used by enqueue paths to wake the scheduler before the
/// next periodic tick.
#[derive(Clone)]
pub struct WakeHandle(Arc<Notify>);

impl WakeHandle {
    pub fn new() -> Self {
        Self(Arc::new(Notify::new()))
    }

    /// Signal the scheduler that new work may be pending.
    pub fn wake(&self) {
        self.0.notify_one();
    }

    pub(crate) async fn notified(&self) {
        self.0.notified().await;
    }
}

impl Default for WakeHandle {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Single-threaded admission loop over the durable job queue.
pub struct Scheduler {
    storage: Arc<Storage>,
    executor: Arc<JobExecutor>,
    config: WorkerConfig,
    limiter: JobLimiter,
    wake: WakeHandle,
}

impl Scheduler {
    pub fn new(
        storage: Arc<Storage>,
        executor: Arc<JobExecutor>,
        config: WorkerConfig,
        wake: WakeHandle,
    ) -> Self {
        let limiter = JobLimiter::new(config.max_concurrent_jobs);
        Self {
            storage,
            executor,
            config,
            limiter,
            wake,
        }
    }

    pub fn wake_handle(&self) -> WakeHandle {
        self.wake.clone()
    }

    /// Run the scheduling loop until the process stops.
    pub async fn run(&self) {
        // Jobs left `running` by a previous crash go back to pending.
        match self.storage.recover_orphaned_jobs().await {
            Ok(0) => {}
            Ok(recovered) => info!(recovered, "recovered orphaned running jobs"),
            Err(e) => error!(error = %e, "orphaned-job recovery failed"),
        }

        info!(
            interval_secs = self.config.check_interval.as_secs(),
            max_concurrent_jobs = self.limiter.max(),
            "scheduler started"
        );

        let mut tasks: JoinSet<()> = JoinSet::new();
        loop {
            self.tick(&mut tasks).await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.check_interval) => {}
                _ = self.wake.notified() => {
                    debug!("woken by enqueue signal");
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        error!(error = %e, "job task aborted");
                    }
                }
            }
        }
    }

    /// One scheduling pass: reap finished tasks, enqueue due sourcing
    /// work, then claim pending jobs up to the admission budget.
    #[instrument(skip_all)]
    pub async fn tick(&self, tasks: &mut JoinSet<()>) {
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "job task aborted");
            }
        }

        if let Err(e) = self.scan_due_repositories().await {
            error!(error = %e, "due-repository scan failed");
        }

        if let Err(e) = self.claim_and_spawn(tasks).await {
            error!(error = %e, "job claim failed");
        }
    }

    /// Enqueue a sourcing job for every active repository whose schedule
    /// has elapsed, unless one is already pending or running.
    async fn scan_due_repositories(&self) -> Result<()> {
        let due = self.storage.list_due_repositories(Utc::now()).await?;

        for repo in due {
            let job = Job::new(
                JobParams::RepositorySourcing {
                    repository_id: repo.id.clone(),
                },
                Some(repo.project_id.clone()),
            );

            match self.storage.enqueue_job(&job).await {
                Ok(()) => info!(repository = %repo.full_name, "scheduled sourcing job"),
                Err(SourcerError::AlreadyInProgress { .. }) => {
                    debug!(repository = %repo.full_name, "sourcing already in progress");
                }
                Err(e) => warn!(repository = %repo.full_name, error = %e, "failed to enqueue sourcing job"),
            }
        }

        Ok(())
    }

    /// Claim pending jobs while slots remain, spawning one task per job.
    /// The permit travels into the task, so a slot frees exactly when the
    /// job's task finishes.
    async fn claim_and_spawn(&self, tasks: &mut JoinSet<()>) -> Result<()> {
        loop {
            let Some(permit) = self.limiter.try_acquire() else {
                break;
            };

            let claimed = self.storage.claim_pending_jobs(1).await?;
            let Some(job) = claimed.into_iter().next() else {
                drop(permit);
                break;
            };

            info!(job_id = %job.id, job_type = %job.job_type, "job admitted");
            let executor = self.executor.clone();
            tasks.spawn(async move {
                let _permit = permit;
                executor.run_job(job.id).await;
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, offline_harness, sample_repository};
    use chrono::Duration as ChronoDuration;
    use leadsourcer_shared::{JobStatus, JobType, SourcingInterval};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    #[tokio::test]
    async fn due_repository_is_scheduled_once() {
        let harness = offline_harness().await;
        let mut repo = sample_repository("proj-1", "o/r", SourcingInterval::Daily);
        repo.next_sourcing_at = Some(Utc::now() - ChronoDuration::hours(2));
        harness.storage.insert_repository(&repo).await.unwrap();

        let scheduler = harness.scheduler(2);
        scheduler.scan_due_repositories().await.unwrap();
        // A second sweep before the job finishes must not double-enqueue.
        scheduler.scan_due_repositories().await.unwrap();

        let jobs = harness.storage.list_jobs(10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_type, JobType::RepositorySourcing);
        assert_eq!(jobs[0].status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn due_daily_repository_is_sourced_and_rescheduled() {
        let h = harness().await;
        let mut repo = sample_repository("proj-1", "o/daily", SourcingInterval::Daily);
        repo.next_sourcing_at = Some(Utc::now() - ChronoDuration::hours(1));
        h.storage.insert_repository(&repo).await.unwrap();

        Mock::given(method("GET"))
            .and(path("/repos/o/daily"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "full_name": "o/daily",
                "name": "daily",
                "owner": {"login": "o"},
                "description": null,
                "stargazers_count": 10,
                "forks_count": 1,
                "open_issues_count": 0,
                "language": "Rust",
                "topics": [],
                "html_url": "https://github.com/o/daily"
            })))
            .mount(&h.github)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/o/daily/contributors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&h.github)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/o/daily/stats/contributors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&h.github)
            .await;

        // One tick: the due repository is enqueued and admitted.
        let scheduler = h.scheduler(1);
        let mut tasks = JoinSet::new();
        scheduler.tick(&mut tasks).await;
        assert_eq!(tasks.len(), 1);
        while tasks.join_next().await.is_some() {}

        let jobs = h.storage.list_jobs(10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Completed);

        // last_sourced_at was set and the schedule advanced by one day.
        let sourced = h.storage.get_repository(&repo.id).await.unwrap().unwrap();
        let last = sourced.last_sourced_at.expect("last_sourced_at");
        let next = sourced.next_sourcing_at.expect("next_sourcing_at");
        assert_eq!((next - last).num_days(), 1);
        assert!(
            h.storage
                .list_due_repositories(Utc::now())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn admission_respects_the_budget() {
        let harness = offline_harness().await;
        for i in 0..4 {
            harness.enqueue_enrichment_job(&format!("user{i}")).await;
        }

        let scheduler = harness.scheduler(2);
        let mut tasks = JoinSet::new();
        scheduler.claim_and_spawn(&mut tasks).await.unwrap();

        assert_eq!(tasks.len(), 2);
        let summary = harness.storage.jobs_summary().await.unwrap();
        assert_eq!(summary.pending, 2);
        // The two admitted jobs are either still running or just finished;
        // never more than the budget.
        assert_eq!(summary.running + summary.completed, 2);

        // Let the admitted jobs finish; their permits free up.
        while tasks.join_next().await.is_some() {}

        scheduler.claim_and_spawn(&mut tasks).await.unwrap();
        assert_eq!(tasks.len(), 2);
        while tasks.join_next().await.is_some() {}

        let summary = harness.storage.jobs_summary().await.unwrap();
        assert_eq!(summary.pending, 0);
        assert_eq!(summary.running, 0);
        assert_eq!(summary.completed, 4);
    }

    #[tokio::test]
    async fn tick_survives_enqueue_of_nothing() {
        let harness = offline_harness().await;
        let scheduler = harness.scheduler(1);
        let mut tasks = JoinSet::new();
        // Empty database: a tick is a no-op, not an error.
        scheduler.tick(&mut tasks).await;
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn wake_handle_signals_the_loop() {
        let wake = WakeHandle::new();
        let waiter = wake.clone();
        let handle = tokio::spawn(async move {
            waiter.notified().await;
            true
        });
        wake.wake();
        assert!(handle.await.unwrap());
    }
}
