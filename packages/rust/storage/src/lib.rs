//! libSQL storage layer for LeadSourcer.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the durable
//! job queue, per-step progress history, repositories, contributors and
//! their stats, social context, and lead scores.
//!
//! **Access rules:**
//! - Worker + CLI: read-write (sole writer) via [`Storage::open`]
//! - Web collaborator (dashboard reads): read-only via [`Storage::open_readonly`]
//!
//! Job claiming is a conditional `pending -> running` UPDATE, so admission
//! is atomic even with several claimants, and a repository never has two
//! running sourcing jobs.

mod migrations;

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use uuid::Uuid;

use leadsourcer_shared::{
    Contributor, ContributorSource, ContributorStats, Job, JobId, JobParams, JobStatus, JobStep,
    JobType, JobsSummary, LeadScore, Priority, Repository, Result, SocialContext, SourcerError,
    SourcingInterval, StepStatus,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn sql_err(e: impl std::fmt::Display) -> SourcerError {
    SourcerError::Storage(e.to_string())
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SourcerError::Storage(format!("invalid timestamp {s}: {e}")))
}

fn parse_ts_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.map(|v| parse_ts(&v)).transpose()
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn ts_opt(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(ts)
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SourcerError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(sql_err)?;
        let conn = db.connect().map_err(sql_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (for the web collaborator).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(sql_err)?;
        let conn = db.connect().map_err(sql_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SourcerError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(SourcerError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Repository operations
    // -----------------------------------------------------------------------

    /// Insert a newly registered repository.
    pub async fn insert_repository(&self, repo: &Repository) -> Result<()> {
        self.check_writable()?;
        let topics = serde_json::to_string(&repo.topics).map_err(sql_err)?;
        let now = ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO repositories
                   (id, project_id, url, full_name, owner, name, description, stars, forks,
                    open_issues, language, topics_json, last_sourced_at, sourcing_interval,
                    next_sourcing_at, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    repo.id.as_str(),
                    repo.project_id.as_str(),
                    repo.url.as_str(),
                    repo.full_name.as_str(),
                    repo.owner.as_str(),
                    repo.name.as_str(),
                    repo.description.as_deref(),
                    repo.stars,
                    repo.forks,
                    repo.open_issues,
                    repo.language.as_deref(),
                    topics.as_str(),
                    ts_opt(&repo.last_sourced_at),
                    repo.sourcing_interval.as_str(),
                    ts_opt(&repo.next_sourcing_at),
                    repo.is_active as i64,
                    now.as_str(),
                ],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Update all mutable repository fields.
    pub async fn update_repository(&self, repo: &Repository) -> Result<()> {
        self.check_writable()?;
        let topics = serde_json::to_string(&repo.topics).map_err(sql_err)?;
        self.conn
            .execute(
                "UPDATE repositories SET
                   description = ?1, stars = ?2, forks = ?3, open_issues = ?4, language = ?5,
                   topics_json = ?6, last_sourced_at = ?7, sourcing_interval = ?8,
                   next_sourcing_at = ?9, is_active = ?10
                 WHERE id = ?11",
                params![
                    repo.description.as_deref(),
                    repo.stars,
                    repo.forks,
                    repo.open_issues,
                    repo.language.as_deref(),
                    topics.as_str(),
                    ts_opt(&repo.last_sourced_at),
                    repo.sourcing_interval.as_str(),
                    ts_opt(&repo.next_sourcing_at),
                    repo.is_active as i64,
                    repo.id.as_str(),
                ],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Get a repository by ID.
    pub async fn get_repository(&self, id: &str) -> Result<Option<Repository>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {REPO_COLUMNS} FROM repositories WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(sql_err)?;

        match rows.next().await.map_err(sql_err)? {
            Some(row) => Ok(Some(row_to_repository(&row)?)),
            None => Ok(None),
        }
    }

    /// Find a repository by project and `owner/name`.
    pub async fn find_repository(
        &self,
        project_id: &str,
        full_name: &str,
    ) -> Result<Option<Repository>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {REPO_COLUMNS} FROM repositories
                     WHERE project_id = ?1 AND full_name = ?2"
                ),
                params![project_id, full_name],
            )
            .await
            .map_err(sql_err)?;

        match rows.next().await.map_err(sql_err)? {
            Some(row) => Ok(Some(row_to_repository(&row)?)),
            None => Ok(None),
        }
    }

    /// List all repositories, most recently registered first.
    pub async fn list_repositories(&self) -> Result<Vec<Repository>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {REPO_COLUMNS} FROM repositories ORDER BY created_at DESC"),
                params![],
            )
            .await
            .map_err(sql_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_err)? {
            results.push(row_to_repository(&row)?);
        }
        Ok(results)
    }

    /// Active repositories whose `next_sourcing_at` has elapsed.
    pub async fn list_due_repositories(&self, now: DateTime<Utc>) -> Result<Vec<Repository>> {
        let now = ts(&now);
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {REPO_COLUMNS} FROM repositories
                     WHERE is_active = 1
                       AND next_sourcing_at IS NOT NULL
                       AND next_sourcing_at <= ?1
                     ORDER BY next_sourcing_at"
                ),
                params![now.as_str()],
            )
            .await
            .map_err(sql_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_err)? {
            results.push(row_to_repository(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Contributor operations
    // -----------------------------------------------------------------------

    /// Upsert a contributor by stable account id, returning the canonical
    /// row id.
    ///
    /// Profile fields fill forward: an existing value survives when the new
    /// fetch has none. Counters (followers, repos) always take the latest
    /// observation.
    pub async fn upsert_contributor(&self, contributor: &Contributor) -> Result<String> {
        self.check_writable()?;
        let now = ts(&Utc::now());

        let existing_id: Option<String> = {
            let mut rows = self
                .conn
                .query(
                    "SELECT id FROM contributors WHERE account_id = ?1",
                    params![contributor.account_id],
                )
                .await
                .map_err(sql_err)?;
            match rows.next().await.map_err(sql_err)? {
                Some(row) => Some(row.get::<String>(0).map_err(sql_err)?),
                None => None,
            }
        };

        if let Some(id) = existing_id {
            self.conn
                .execute(
                    "UPDATE contributors SET
                       username = ?1,
                       full_name = COALESCE(?2, full_name),
                       email = COALESCE(?3, email),
                       company = COALESCE(?4, company),
                       location = COALESCE(?5, location),
                       bio = COALESCE(?6, bio),
                       blog = COALESCE(?7, blog),
                       twitter_username = COALESCE(?8, twitter_username),
                       avatar_url = COALESCE(?9, avatar_url),
                       profile_url = COALESCE(?10, profile_url),
                       public_repos = ?11,
                       followers = ?12,
                       following = ?13,
                       updated_at = ?14
                     WHERE id = ?15",
                    params![
                        contributor.username.as_str(),
                        contributor.full_name.as_deref(),
                        contributor.email.as_deref(),
                        contributor.company.as_deref(),
                        contributor.location.as_deref(),
                        contributor.bio.as_deref(),
                        contributor.blog.as_deref(),
                        contributor.twitter_username.as_deref(),
                        contributor.avatar_url.as_deref(),
                        contributor.profile_url.as_deref(),
                        contributor.public_repos,
                        contributor.followers,
                        contributor.following,
                        now.as_str(),
                        id.as_str(),
                    ],
                )
                .await
                .map_err(sql_err)?;
            Ok(id)
        } else {
            self.conn
                .execute(
                    "INSERT INTO contributors
                       (id, account_id, username, full_name, email, company, location, bio,
                        blog, twitter_username, avatar_url, profile_url, public_repos,
                        followers, following, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                    params![
                        contributor.id.as_str(),
                        contributor.account_id,
                        contributor.username.as_str(),
                        contributor.full_name.as_deref(),
                        contributor.email.as_deref(),
                        contributor.company.as_deref(),
                        contributor.location.as_deref(),
                        contributor.bio.as_deref(),
                        contributor.blog.as_deref(),
                        contributor.twitter_username.as_deref(),
                        contributor.avatar_url.as_deref(),
                        contributor.profile_url.as_deref(),
                        contributor.public_repos,
                        contributor.followers,
                        contributor.following,
                        now.as_str(),
                        now.as_str(),
                    ],
                )
                .await
                .map_err(sql_err)?;
            Ok(contributor.id.clone())
        }
    }

    /// Get a contributor by row id.
    pub async fn get_contributor(&self, id: &str) -> Result<Option<Contributor>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {CONTRIBUTOR_COLUMNS} FROM contributors WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(sql_err)?;

        match rows.next().await.map_err(sql_err)? {
            Some(row) => Ok(Some(row_to_contributor(&row)?)),
            None => Ok(None),
        }
    }

    /// Link a contributor to a repository (idempotent).
    pub async fn link_contributor(&self, repository_id: &str, contributor_id: &str) -> Result<()> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        self.conn
            .execute(
                "INSERT OR IGNORE INTO repository_contributors
                   (repository_id, contributor_id, discovered_at)
                 VALUES (?1, ?2, ?3)",
                params![repository_id, contributor_id, now.as_str()],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Contributor ids linked to a repository.
    pub async fn list_repository_contributors(&self, repository_id: &str) -> Result<Vec<String>> {
        self.collect_ids(
            "SELECT contributor_id FROM repository_contributors
             WHERE repository_id = ?1 ORDER BY discovered_at",
            repository_id,
        )
        .await
    }

    /// Contributor ids linked to a repository that have no social context yet.
    pub async fn list_unenriched_contributors(&self, repository_id: &str) -> Result<Vec<String>> {
        self.collect_ids(
            "SELECT rc.contributor_id FROM repository_contributors rc
             LEFT JOIN social_context sc ON sc.contributor_id = rc.contributor_id
             WHERE rc.repository_id = ?1 AND sc.contributor_id IS NULL
             ORDER BY rc.discovered_at",
            repository_id,
        )
        .await
    }

    /// Distinct project ids a contributor appears in.
    pub async fn list_projects_for_contributor(&self, contributor_id: &str) -> Result<Vec<String>> {
        self.collect_ids(
            "SELECT DISTINCT r.project_id FROM repositories r
             JOIN repository_contributors rc ON rc.repository_id = r.id
             WHERE rc.contributor_id = ?1",
            contributor_id,
        )
        .await
    }

    async fn collect_ids(&self, sql: &str, param: &str) -> Result<Vec<String>> {
        let mut rows = self.conn.query(sql, params![param]).await.map_err(sql_err)?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_err)? {
            results.push(row.get::<String>(0).map_err(sql_err)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Contributor stats
    // -----------------------------------------------------------------------

    /// Wholesale upsert of one (repository, contributor) stats row.
    ///
    /// The `commit` provenance is sticky: a stargazer run never downgrades a
    /// row that commit history already produced.
    pub async fn upsert_stats(&self, stats: &ContributorStats) -> Result<()> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        self.conn
            .execute(
                "INSERT INTO contributor_stats
                   (id, repository_id, contributor_id, total_commits, commits_last_3_months,
                    commits_last_6_months, commits_last_year, first_commit_date,
                    last_commit_date, pull_requests, issues_opened, code_reviews,
                    is_maintainer, source, calculated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(repository_id, contributor_id) DO UPDATE SET
                   total_commits = excluded.total_commits,
                   commits_last_3_months = excluded.commits_last_3_months,
                   commits_last_6_months = excluded.commits_last_6_months,
                   commits_last_year = excluded.commits_last_year,
                   first_commit_date = excluded.first_commit_date,
                   last_commit_date = excluded.last_commit_date,
                   pull_requests = excluded.pull_requests,
                   issues_opened = excluded.issues_opened,
                   code_reviews = excluded.code_reviews,
                   is_maintainer = excluded.is_maintainer,
                   source = CASE
                     WHEN contributor_stats.source = 'commit' THEN 'commit'
                     ELSE excluded.source
                   END,
                   calculated_at = excluded.calculated_at",
                params![
                    id.as_str(),
                    stats.repository_id.as_str(),
                    stats.contributor_id.as_str(),
                    stats.total_commits,
                    stats.commits_last_3_months,
                    stats.commits_last_6_months,
                    stats.commits_last_year,
                    ts_opt(&stats.first_commit_date),
                    ts_opt(&stats.last_commit_date),
                    stats.pull_requests,
                    stats.issues_opened,
                    stats.code_reviews,
                    stats.is_maintainer as i64,
                    stats.source.as_str(),
                    ts(&stats.calculated_at).as_str(),
                ],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Get the stats row for one (repository, contributor) pair.
    pub async fn get_stats(
        &self,
        repository_id: &str,
        contributor_id: &str,
    ) -> Result<Option<ContributorStats>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {STATS_COLUMNS} FROM contributor_stats
                     WHERE repository_id = ?1 AND contributor_id = ?2"
                ),
                params![repository_id, contributor_id],
            )
            .await
            .map_err(sql_err)?;

        match rows.next().await.map_err(sql_err)? {
            Some(row) => Ok(Some(row_to_stats(&row)?)),
            None => Ok(None),
        }
    }

    /// All stats rows for a contributor, across every repository.
    pub async fn list_contributor_stats(
        &self,
        contributor_id: &str,
    ) -> Result<Vec<ContributorStats>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {STATS_COLUMNS} FROM contributor_stats WHERE contributor_id = ?1"
                ),
                params![contributor_id],
            )
            .await
            .map_err(sql_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_err)? {
            results.push(row_to_stats(&row)?);
        }
        Ok(results)
    }

    /// All stats rows for a contributor within one project's repositories.
    pub async fn list_project_stats(
        &self,
        project_id: &str,
        contributor_id: &str,
    ) -> Result<Vec<ContributorStats>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {STATS_COLUMNS_QUALIFIED} FROM contributor_stats cs
                     JOIN repositories r ON r.id = cs.repository_id
                     WHERE r.project_id = ?1 AND cs.contributor_id = ?2"
                ),
                params![project_id, contributor_id],
            )
            .await
            .map_err(sql_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_err)? {
            results.push(row_to_stats(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Social context
    // -----------------------------------------------------------------------

    /// Upsert the social context for a contributor. Last enrichment wins.
    pub async fn upsert_social_context(&self, context: &SocialContext) -> Result<()> {
        self.check_writable()?;
        let raw_signals = context
            .raw_signals
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(sql_err)?;

        self.conn
            .execute(
                "INSERT INTO social_context
                   (contributor_id, profile_url, headline, photo_url, current_company,
                    current_position, position_level, industry, classification,
                    classification_confidence, classification_reasoning, raw_signals_json,
                    last_enriched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(contributor_id) DO UPDATE SET
                   profile_url = excluded.profile_url,
                   headline = excluded.headline,
                   photo_url = excluded.photo_url,
                   current_company = excluded.current_company,
                   current_position = excluded.current_position,
                   position_level = excluded.position_level,
                   industry = excluded.industry,
                   classification = excluded.classification,
                   classification_confidence = excluded.classification_confidence,
                   classification_reasoning = excluded.classification_reasoning,
                   raw_signals_json = excluded.raw_signals_json,
                   last_enriched_at = excluded.last_enriched_at",
                params![
                    context.contributor_id.as_str(),
                    context.profile_url.as_deref(),
                    context.headline.as_deref(),
                    context.photo_url.as_deref(),
                    context.current_company.as_deref(),
                    context.current_position.as_deref(),
                    context.position_level.map(|l| l.as_str()),
                    context.industry.as_deref(),
                    context.classification.map(|c| c.as_str()),
                    context.classification_confidence,
                    context.classification_reasoning.as_deref(),
                    raw_signals.as_deref(),
                    ts(&context.last_enriched_at).as_str(),
                ],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Get a contributor's social context.
    pub async fn get_social_context(&self, contributor_id: &str) -> Result<Option<SocialContext>> {
        let mut rows = self
            .conn
            .query(
                "SELECT contributor_id, profile_url, headline, photo_url, current_company,
                        current_position, position_level, industry, classification,
                        classification_confidence, classification_reasoning, raw_signals_json,
                        last_enriched_at
                 FROM social_context WHERE contributor_id = ?1",
                params![contributor_id],
            )
            .await
            .map_err(sql_err)?;

        match rows.next().await.map_err(sql_err)? {
            Some(row) => Ok(Some(row_to_social_context(&row)?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Lead scores
    // -----------------------------------------------------------------------

    /// Upsert one (project, contributor) lead score.
    pub async fn upsert_lead_score(&self, score: &LeadScore) -> Result<()> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        self.conn
            .execute(
                "INSERT INTO lead_scores
                   (id, project_id, contributor_id, overall_score, activity_score,
                    influence_score, position_score, engagement_score, is_qualified,
                    priority, calculated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(project_id, contributor_id) DO UPDATE SET
                   overall_score = excluded.overall_score,
                   activity_score = excluded.activity_score,
                   influence_score = excluded.influence_score,
                   position_score = excluded.position_score,
                   engagement_score = excluded.engagement_score,
                   is_qualified = excluded.is_qualified,
                   priority = excluded.priority,
                   calculated_at = excluded.calculated_at",
                params![
                    id.as_str(),
                    score.project_id.as_str(),
                    score.contributor_id.as_str(),
                    score.overall_score,
                    score.activity_score,
                    score.influence_score,
                    score.position_score,
                    score.engagement_score,
                    score.is_qualified as i64,
                    score.priority.as_str(),
                    ts(&score.calculated_at).as_str(),
                ],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Get the lead score for one (project, contributor) pair.
    pub async fn get_lead_score(
        &self,
        project_id: &str,
        contributor_id: &str,
    ) -> Result<Option<LeadScore>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM lead_scores
                     WHERE project_id = ?1 AND contributor_id = ?2"
                ),
                params![project_id, contributor_id],
            )
            .await
            .map_err(sql_err)?;

        match rows.next().await.map_err(sql_err)? {
            Some(row) => Ok(Some(row_to_lead_score(&row)?)),
            None => Ok(None),
        }
    }

    /// List lead scores for a project, best first.
    pub async fn list_lead_scores(
        &self,
        project_id: &str,
        qualified_only: bool,
    ) -> Result<Vec<LeadScore>> {
        let sql = if qualified_only {
            format!(
                "SELECT {LEAD_COLUMNS} FROM lead_scores
                 WHERE project_id = ?1 AND is_qualified = 1
                 ORDER BY overall_score DESC"
            )
        } else {
            format!(
                "SELECT {LEAD_COLUMNS} FROM lead_scores
                 WHERE project_id = ?1 ORDER BY overall_score DESC"
            )
        };

        let mut rows = self
            .conn
            .query(&sql, params![project_id])
            .await
            .map_err(sql_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_err)? {
            results.push(row_to_lead_score(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Job queue
    // -----------------------------------------------------------------------

    /// Enqueue a pending job.
    ///
    /// A sourcing job is rejected with [`SourcerError::AlreadyInProgress`]
    /// when the repository already has one pending or running.
    pub async fn enqueue_job(&self, job: &Job) -> Result<()> {
        self.check_writable()?;

        if job.job_type == JobType::RepositorySourcing {
            if let Some(repository_id) = job.repository_id.as_deref() {
                if self.has_active_sourcing_job(repository_id).await? {
                    return Err(SourcerError::AlreadyInProgress {
                        repository: repository_id.to_string(),
                    });
                }
            }
        }

        let params_json = serde_json::to_string(&job.params).map_err(sql_err)?;
        self.conn
            .execute(
                "INSERT INTO jobs
                   (id, job_type, status, project_id, repository_id, params_json, total_steps,
                    current_step, progress_percentage, started_at, completed_at, error_message,
                    created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    job.id.to_string().as_str(),
                    job.job_type.as_str(),
                    job.status.as_str(),
                    job.project_id.as_deref(),
                    job.repository_id.as_deref(),
                    params_json.as_str(),
                    job.total_steps as i64,
                    job.current_step as i64,
                    job.progress_percentage,
                    ts_opt(&job.started_at),
                    ts_opt(&job.completed_at),
                    job.error_message.as_deref(),
                    ts(&job.created_at).as_str(),
                ],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Whether a repository has a pending or running sourcing job.
    pub async fn has_active_sourcing_job(&self, repository_id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM jobs
                 WHERE repository_id = ?1
                   AND job_type = 'repository_sourcing'
                   AND status IN ('pending', 'running')",
                params![repository_id],
            )
            .await
            .map_err(sql_err)?;

        match rows.next().await.map_err(sql_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(sql_err)? > 0),
            None => Ok(false),
        }
    }

    /// Get a job by id.
    pub async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let id = id.to_string();
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id.as_str()],
            )
            .await
            .map_err(sql_err)?;

        match rows.next().await.map_err(sql_err)? {
            Some(row) => Ok(Some(row_to_job(&row)?)),
            None => Ok(None),
        }
    }

    /// List jobs, newest first.
    pub async fn list_jobs(&self, limit: u32) -> Result<Vec<Job>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(sql_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_err)? {
            results.push(row_to_job(&row)?);
        }
        Ok(results)
    }

    /// Claim up to `limit` pending jobs, atomically moving each
    /// `pending -> running`.
    ///
    /// The conditional UPDATE makes admission race-free, and skips a
    /// sourcing job whose repository already has one running; skipped jobs
    /// stay pending for the next tick.
    pub async fn claim_pending_jobs(&self, limit: usize) -> Result<Vec<Job>> {
        self.check_writable()?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let candidate_ids = {
            let mut rows = self
                .conn
                .query(
                    "SELECT id FROM jobs WHERE status = 'pending'
                     ORDER BY created_at, id LIMIT ?1",
                    params![limit as i64],
                )
                .await
                .map_err(sql_err)?;

            let mut ids = Vec::new();
            while let Some(row) = rows.next().await.map_err(sql_err)? {
                ids.push(row.get::<String>(0).map_err(sql_err)?);
            }
            ids
        };

        let now = ts(&Utc::now());
        let mut claimed = Vec::new();

        for id in candidate_ids {
            let changed = self
                .conn
                .execute(
                    "UPDATE jobs SET status = 'running', started_at = COALESCE(started_at, ?1)
                     WHERE id = ?2 AND status = 'pending'
                       AND NOT (
                         job_type = 'repository_sourcing'
                         AND repository_id IS NOT NULL
                         AND EXISTS (
                           SELECT 1 FROM jobs other
                           WHERE other.id != jobs.id
                             AND other.repository_id = jobs.repository_id
                             AND other.job_type = 'repository_sourcing'
                             AND other.status = 'running'))",
                    params![now.as_str(), id.as_str()],
                )
                .await
                .map_err(sql_err)?;

            if changed == 1 {
                let job_id: JobId = id.parse().map_err(sql_err)?;
                if let Some(job) = self.get_job(&job_id).await? {
                    claimed.push(job);
                }
            }
        }

        Ok(claimed)
    }

    /// Set the cancellation flag: a pending or running job becomes
    /// `cancelled`. Returns whether anything changed.
    pub async fn cancel_job(&self, id: &JobId) -> Result<bool> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        let id = id.to_string();
        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET status = 'cancelled', completed_at = ?1
                 WHERE id = ?2 AND status IN ('pending', 'running')",
                params![now.as_str(), id.as_str()],
            )
            .await
            .map_err(sql_err)?;
        Ok(changed > 0)
    }

    /// Cooperative cancellation check used between pipeline stages.
    pub async fn is_cancelled(&self, id: &JobId) -> Result<bool> {
        let id = id.to_string();
        let mut rows = self
            .conn
            .query(
                "SELECT status FROM jobs WHERE id = ?1",
                params![id.as_str()],
            )
            .await
            .map_err(sql_err)?;

        match rows.next().await.map_err(sql_err)? {
            Some(row) => Ok(row.get::<String>(0).map_err(sql_err)? == "cancelled"),
            None => Ok(false),
        }
    }

    /// Record the resolved stage count before the first stage runs.
    pub async fn set_total_steps(&self, id: &JobId, total_steps: u32) -> Result<()> {
        self.check_writable()?;
        let id = id.to_string();
        self.conn
            .execute(
                "UPDATE jobs SET total_steps = ?1 WHERE id = ?2",
                params![total_steps as i64, id.as_str()],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Advance the step counter and derived progress percentage.
    pub async fn update_job_progress(
        &self,
        id: &JobId,
        current_step: u32,
        total_steps: u32,
    ) -> Result<()> {
        self.check_writable()?;
        let progress = if total_steps > 0 {
            current_step as f64 / total_steps as f64 * 100.0
        } else {
            0.0
        };
        let id = id.to_string();
        self.conn
            .execute(
                "UPDATE jobs SET current_step = ?1, total_steps = ?2, progress_percentage = ?3
                 WHERE id = ?4",
                params![
                    current_step as i64,
                    total_steps as i64,
                    progress,
                    id.as_str()
                ],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Terminal transition: `running -> completed`.
    pub async fn complete_job(&self, id: &JobId) -> Result<()> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        let id = id.to_string();
        self.conn
            .execute(
                "UPDATE jobs SET status = 'completed', completed_at = ?1, progress_percentage = 100
                 WHERE id = ?2 AND status = 'running'",
                params![now.as_str(), id.as_str()],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Terminal transition: `running -> failed`, recording the error.
    pub async fn fail_job(&self, id: &JobId, error: &str) -> Result<()> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        let id = id.to_string();
        let error: String = error.chars().take(500).collect();
        self.conn
            .execute(
                "UPDATE jobs SET status = 'failed', error_message = ?1, completed_at = ?2
                 WHERE id = ?3 AND status = 'running'",
                params![error.as_str(), now.as_str(), id.as_str()],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Counts by status, for the dashboard summary.
    pub async fn jobs_summary(&self) -> Result<JobsSummary> {
        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM jobs GROUP BY status",
                params![],
            )
            .await
            .map_err(sql_err)?;

        let mut summary = JobsSummary::default();
        while let Some(row) = rows.next().await.map_err(sql_err)? {
            let status: String = row.get(0).map_err(sql_err)?;
            let count = row.get::<i64>(1).map_err(sql_err)? as u64;
            match status.as_str() {
                "pending" => summary.pending = count,
                "running" => summary.running = count,
                "completed" => summary.completed = count,
                "failed" => summary.failed = count,
                "cancelled" => summary.cancelled = count,
                other => tracing::warn!(status = other, "unknown job status in summary"),
            }
        }
        Ok(summary)
    }

    /// Reset jobs left `running` by a crashed worker back to `pending` and
    /// clear their step history. Returns the number of recovered jobs.
    pub async fn recover_orphaned_jobs(&self) -> Result<u64> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM job_steps WHERE job_id IN
                   (SELECT id FROM jobs WHERE status = 'running')",
                params![],
            )
            .await
            .map_err(sql_err)?;

        let recovered = self
            .conn
            .execute(
                "UPDATE jobs SET status = 'pending', started_at = NULL,
                   current_step = 0, progress_percentage = 0
                 WHERE status = 'running'",
                params![],
            )
            .await
            .map_err(sql_err)?;
        Ok(recovered)
    }

    // -----------------------------------------------------------------------
    // Job steps
    // -----------------------------------------------------------------------

    /// Create a step in `running` state as the pipeline enters it.
    pub async fn create_step(
        &self,
        job_id: &JobId,
        step_number: u32,
        name: &str,
    ) -> Result<JobStep> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let job_id_str = job_id.to_string();
        self.conn
            .execute(
                "INSERT INTO job_steps (id, job_id, step_number, name, status, started_at)
                 VALUES (?1, ?2, ?3, ?4, 'running', ?5)",
                params![
                    id.as_str(),
                    job_id_str.as_str(),
                    step_number as i64,
                    name,
                    ts(&now).as_str()
                ],
            )
            .await
            .map_err(sql_err)?;

        Ok(JobStep {
            id,
            job_id: *job_id,
            step_number,
            name: name.to_string(),
            status: StepStatus::Running,
            message: None,
            details: None,
            error_message: None,
            started_at: Some(now),
            completed_at: None,
        })
    }

    /// Mark a step completed with an outcome message and optional details.
    pub async fn complete_step(
        &self,
        step_id: &str,
        message: &str,
        details: Option<&serde_json::Value>,
    ) -> Result<()> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        let details = details.map(serde_json::Value::to_string);
        self.conn
            .execute(
                "UPDATE job_steps SET status = 'completed', message = ?1, details_json = ?2,
                   completed_at = ?3
                 WHERE id = ?4",
                params![message, details.as_deref(), now.as_str(), step_id],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Mark a step failed, recording the error on the step row.
    pub async fn fail_step(&self, step_id: &str, error: &str) -> Result<()> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        self.conn
            .execute(
                "UPDATE job_steps SET status = 'failed', message = ?1, error_message = ?1,
                   completed_at = ?2
                 WHERE id = ?3",
                params![error, now.as_str(), step_id],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Mark any still-open steps of a job as cancelled.
    pub async fn cancel_open_steps(&self, job_id: &JobId) -> Result<()> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        let job_id = job_id.to_string();
        self.conn
            .execute(
                "UPDATE job_steps SET status = 'cancelled', message = 'Cancelled by user',
                   completed_at = ?1
                 WHERE job_id = ?2 AND status IN ('pending', 'running')",
                params![now.as_str(), job_id.as_str()],
            )
            .await
            .map_err(sql_err)?;
        Ok(())
    }

    /// Ordered step history of a job.
    pub async fn list_steps(&self, job_id: &JobId) -> Result<Vec<JobStep>> {
        let job_id = job_id.to_string();
        let mut rows = self
            .conn
            .query(
                "SELECT id, job_id, step_number, name, status, message, details_json,
                        error_message, started_at, completed_at
                 FROM job_steps WHERE job_id = ?1 ORDER BY step_number",
                params![job_id.as_str()],
            )
            .await
            .map_err(sql_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(sql_err)? {
            results.push(row_to_step(&row)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const REPO_COLUMNS: &str = "id, project_id, url, full_name, owner, name, description, stars, \
    forks, open_issues, language, topics_json, last_sourced_at, sourcing_interval, \
    next_sourcing_at, is_active";

const CONTRIBUTOR_COLUMNS: &str = "id, account_id, username, full_name, email, company, \
    location, bio, blog, twitter_username, avatar_url, profile_url, public_repos, followers, \
    following";

const STATS_COLUMNS: &str = "repository_id, contributor_id, total_commits, \
    commits_last_3_months, commits_last_6_months, commits_last_year, first_commit_date, \
    last_commit_date, pull_requests, issues_opened, code_reviews, is_maintainer, source, \
    calculated_at";

const STATS_COLUMNS_QUALIFIED: &str = "cs.repository_id, cs.contributor_id, cs.total_commits, \
    cs.commits_last_3_months, cs.commits_last_6_months, cs.commits_last_year, \
    cs.first_commit_date, cs.last_commit_date, cs.pull_requests, cs.issues_opened, \
    cs.code_reviews, cs.is_maintainer, cs.source, cs.calculated_at";

const LEAD_COLUMNS: &str = "project_id, contributor_id, overall_score, activity_score, \
    influence_score, position_score, engagement_score, is_qualified, priority, calculated_at";

const JOB_COLUMNS: &str = "id, job_type, status, project_id, repository_id, params_json, \
    total_steps, current_step, progress_percentage, started_at, completed_at, error_message, \
    created_at";

fn row_to_repository(row: &libsql::Row) -> Result<Repository> {
    let topics_json: String = row.get(11).map_err(sql_err)?;
    let topics: Vec<String> = serde_json::from_str(&topics_json).map_err(sql_err)?;
    let interval: String = row.get(13).map_err(sql_err)?;

    Ok(Repository {
        id: row.get::<String>(0).map_err(sql_err)?,
        project_id: row.get::<String>(1).map_err(sql_err)?,
        url: row.get::<String>(2).map_err(sql_err)?,
        full_name: row.get::<String>(3).map_err(sql_err)?,
        owner: row.get::<String>(4).map_err(sql_err)?,
        name: row.get::<String>(5).map_err(sql_err)?,
        description: row.get::<String>(6).ok(),
        stars: row.get::<i64>(7).map_err(sql_err)?,
        forks: row.get::<i64>(8).map_err(sql_err)?,
        open_issues: row.get::<i64>(9).map_err(sql_err)?,
        language: row.get::<String>(10).ok(),
        topics,
        last_sourced_at: parse_ts_opt(row.get::<String>(12).ok())?,
        sourcing_interval: SourcingInterval::from_str(&interval)?,
        next_sourcing_at: parse_ts_opt(row.get::<String>(14).ok())?,
        is_active: row.get::<i64>(15).map_err(sql_err)? != 0,
    })
}

fn row_to_contributor(row: &libsql::Row) -> Result<Contributor> {
    Ok(Contributor {
        id: row.get::<String>(0).map_err(sql_err)?,
        account_id: row.get::<i64>(1).map_err(sql_err)?,
        username: row.get::<String>(2).map_err(sql_err)?,
        full_name: row.get::<String>(3).ok(),
        email: row.get::<String>(4).ok(),
        company: row.get::<String>(5).ok(),
        location: row.get::<String>(6).ok(),
        bio: row.get::<String>(7).ok(),
        blog: row.get::<String>(8).ok(),
        twitter_username: row.get::<String>(9).ok(),
        avatar_url: row.get::<String>(10).ok(),
        profile_url: row.get::<String>(11).ok(),
        public_repos: row.get::<i64>(12).map_err(sql_err)?,
        followers: row.get::<i64>(13).map_err(sql_err)?,
        following: row.get::<i64>(14).map_err(sql_err)?,
    })
}

fn row_to_stats(row: &libsql::Row) -> Result<ContributorStats> {
    let source: String = row.get(12).map_err(sql_err)?;
    let calculated_at: String = row.get(13).map_err(sql_err)?;

    Ok(ContributorStats {
        repository_id: row.get::<String>(0).map_err(sql_err)?,
        contributor_id: row.get::<String>(1).map_err(sql_err)?,
        total_commits: row.get::<i64>(2).map_err(sql_err)?,
        commits_last_3_months: row.get::<i64>(3).map_err(sql_err)?,
        commits_last_6_months: row.get::<i64>(4).map_err(sql_err)?,
        commits_last_year: row.get::<i64>(5).map_err(sql_err)?,
        first_commit_date: parse_ts_opt(row.get::<String>(6).ok())?,
        last_commit_date: parse_ts_opt(row.get::<String>(7).ok())?,
        pull_requests: row.get::<i64>(8).map_err(sql_err)?,
        issues_opened: row.get::<i64>(9).map_err(sql_err)?,
        code_reviews: row.get::<i64>(10).map_err(sql_err)?,
        is_maintainer: row.get::<i64>(11).map_err(sql_err)? != 0,
        source: ContributorSource::from_str(&source)?,
        calculated_at: parse_ts(&calculated_at)?,
    })
}

fn row_to_social_context(row: &libsql::Row) -> Result<SocialContext> {
    let position_level: Option<String> = row.get::<String>(6).ok();
    let classification: Option<String> = row.get::<String>(8).ok();
    let raw_signals_json: Option<String> = row.get::<String>(11).ok();
    let last_enriched_at: String = row.get(12).map_err(sql_err)?;

    Ok(SocialContext {
        contributor_id: row.get::<String>(0).map_err(sql_err)?,
        profile_url: row.get::<String>(1).ok(),
        headline: row.get::<String>(2).ok(),
        photo_url: row.get::<String>(3).ok(),
        current_company: row.get::<String>(4).ok(),
        current_position: row.get::<String>(5).ok(),
        position_level: position_level.map(|l| l.parse()).transpose()?,
        industry: row.get::<String>(7).ok(),
        classification: classification.map(|c| c.parse()).transpose()?,
        classification_confidence: row.get::<f64>(9).ok(),
        classification_reasoning: row.get::<String>(10).ok(),
        raw_signals: raw_signals_json
            .map(|j| serde_json::from_str(&j))
            .transpose()
            .map_err(sql_err)?,
        last_enriched_at: parse_ts(&last_enriched_at)?,
    })
}

fn row_to_lead_score(row: &libsql::Row) -> Result<LeadScore> {
    let priority: String = row.get(8).map_err(sql_err)?;
    let calculated_at: String = row.get(9).map_err(sql_err)?;

    Ok(LeadScore {
        project_id: row.get::<String>(0).map_err(sql_err)?,
        contributor_id: row.get::<String>(1).map_err(sql_err)?,
        overall_score: row.get::<f64>(2).map_err(sql_err)?,
        activity_score: row.get::<f64>(3).map_err(sql_err)?,
        influence_score: row.get::<f64>(4).map_err(sql_err)?,
        position_score: row.get::<f64>(5).map_err(sql_err)?,
        engagement_score: row.get::<f64>(6).map_err(sql_err)?,
        is_qualified: row.get::<i64>(7).map_err(sql_err)? != 0,
        priority: Priority::from_str(&priority)?,
        calculated_at: parse_ts(&calculated_at)?,
    })
}

fn row_to_job(row: &libsql::Row) -> Result<Job> {
    let id: String = row.get(0).map_err(sql_err)?;
    let job_type: String = row.get(1).map_err(sql_err)?;
    let status: String = row.get(2).map_err(sql_err)?;
    let params_json: String = row.get(5).map_err(sql_err)?;
    let created_at: String = row.get(12).map_err(sql_err)?;

    Ok(Job {
        id: id.parse().map_err(sql_err)?,
        job_type: JobType::from_str(&job_type)?,
        status: JobStatus::from_str(&status)?,
        project_id: row.get::<String>(3).ok(),
        repository_id: row.get::<String>(4).ok(),
        params: serde_json::from_str::<JobParams>(&params_json).map_err(sql_err)?,
        total_steps: row.get::<i64>(6).map_err(sql_err)? as u32,
        current_step: row.get::<i64>(7).map_err(sql_err)? as u32,
        progress_percentage: row.get::<f64>(8).map_err(sql_err)?,
        started_at: parse_ts_opt(row.get::<String>(9).ok())?,
        completed_at: parse_ts_opt(row.get::<String>(10).ok())?,
        error_message: row.get::<String>(11).ok(),
        created_at: parse_ts(&created_at)?,
    })
}

fn row_to_step(row: &libsql::Row) -> Result<JobStep> {
    let job_id: String = row.get(1).map_err(sql_err)?;
    let status: String = row.get(4).map_err(sql_err)?;
    let details_json: Option<String> = row.get::<String>(6).ok();

    Ok(JobStep {
        id: row.get::<String>(0).map_err(sql_err)?,
        job_id: job_id.parse().map_err(sql_err)?,
        step_number: row.get::<i64>(2).map_err(sql_err)? as u32,
        name: row.get::<String>(3).map_err(sql_err)?,
        status: StepStatus::from_str(&status)?,
        message: row.get::<String>(5).ok(),
        details: details_json
            .map(|j| serde_json::from_str(&j))
            .transpose()
            .map_err(sql_err)?,
        error_message: row.get::<String>(7).ok(),
        started_at: parse_ts_opt(row.get::<String>(8).ok())?,
        completed_at: parse_ts_opt(row.get::<String>(9).ok())?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use leadsourcer_shared::{Classification, JobParams};

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ls_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn sample_repo(project: &str, full_name: &str) -> Repository {
        let (owner, name) = full_name.split_once('/').expect("owner/name");
        Repository::new(
            project,
            format!("https://github.com/{full_name}"),
            owner,
            name,
            SourcingInterval::Daily,
        )
    }

    fn sample_contributor(account_id: i64, username: &str) -> Contributor {
        Contributor {
            id: Uuid::now_v7().to_string(),
            account_id,
            username: username.into(),
            full_name: Some(format!("{username} full")),
            email: None,
            company: Some("Acme".into()),
            location: None,
            bio: None,
            blog: None,
            twitter_username: None,
            avatar_url: None,
            profile_url: None,
            public_repos: 10,
            followers: 50,
            following: 5,
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("ls_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn repository_lifecycle_and_due_scan() {
        let storage = test_storage().await;
        let mut repo = sample_repo("proj-1", "rust-lang/rust");
        storage.insert_repository(&repo).await.expect("insert");

        // Freshly registered repo is due immediately.
        let due = storage.list_due_repositories(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].full_name, "rust-lang/rust");

        // After a sourcing run the schedule advances out of the window.
        let now = Utc::now();
        repo.last_sourced_at = Some(now);
        repo.next_sourcing_at = Some(repo.sourcing_interval.advance(now));
        repo.stars = 99_000;
        storage.update_repository(&repo).await.expect("update");

        let due = storage.list_due_repositories(Utc::now()).await.unwrap();
        assert!(due.is_empty());

        let loaded = storage.get_repository(&repo.id).await.unwrap().unwrap();
        assert_eq!(loaded.stars, 99_000);
        assert!(loaded.last_sourced_at.is_some());

        let found = storage
            .find_repository("proj-1", "rust-lang/rust")
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn contributor_upsert_fills_forward() {
        let storage = test_storage().await;

        let detailed = sample_contributor(7, "alice");
        let id = storage.upsert_contributor(&detailed).await.unwrap();

        // A later summary-only observation must not erase profile fields.
        let summary = Contributor {
            id: Uuid::now_v7().to_string(),
            account_id: 7,
            username: "alice".into(),
            full_name: None,
            email: None,
            company: None,
            location: None,
            bio: None,
            blog: None,
            twitter_username: None,
            avatar_url: None,
            profile_url: None,
            public_repos: 0,
            followers: 0,
            following: 0,
        };
        let second_id = storage.upsert_contributor(&summary).await.unwrap();
        assert_eq!(id, second_id, "account id is the stable key");

        let loaded = storage.get_contributor(&id).await.unwrap().unwrap();
        assert_eq!(loaded.full_name.as_deref(), Some("alice full"));
        assert_eq!(loaded.company.as_deref(), Some("Acme"));
    }

    #[tokio::test]
    async fn links_and_unenriched_selection() {
        let storage = test_storage().await;
        let repo = sample_repo("proj-1", "o/r");
        storage.insert_repository(&repo).await.unwrap();

        let a = storage
            .upsert_contributor(&sample_contributor(1, "a"))
            .await
            .unwrap();
        let b = storage
            .upsert_contributor(&sample_contributor(2, "b"))
            .await
            .unwrap();
        storage.link_contributor(&repo.id, &a).await.unwrap();
        storage.link_contributor(&repo.id, &a).await.unwrap(); // idempotent
        storage.link_contributor(&repo.id, &b).await.unwrap();

        let mut linked = storage.list_repository_contributors(&repo.id).await.unwrap();
        linked.sort();
        let mut expected = vec![a.clone(), b.clone()];
        expected.sort();
        assert_eq!(linked, expected);

        // Enrich one of them; only the other remains selectable.
        storage
            .upsert_social_context(&SocialContext::empty(&a))
            .await
            .unwrap();
        assert_eq!(
            storage.list_unenriched_contributors(&repo.id).await.unwrap(),
            vec![b.clone()]
        );

        assert_eq!(
            storage.list_projects_for_contributor(&a).await.unwrap(),
            vec!["proj-1".to_string()]
        );
    }

    #[tokio::test]
    async fn stats_overwrite_and_sticky_commit_source() {
        let storage = test_storage().await;
        let repo = sample_repo("proj-1", "o/r");
        storage.insert_repository(&repo).await.unwrap();
        let c = storage
            .upsert_contributor(&sample_contributor(1, "a"))
            .await
            .unwrap();

        let mut stats = ContributorStats::zeroed(&repo.id, &c, ContributorSource::Commit);
        stats.total_commits = 42;
        storage.upsert_stats(&stats).await.unwrap();

        // A stargazer pass over the same pair must not downgrade provenance.
        let sg = ContributorStats::zeroed(&repo.id, &c, ContributorSource::Stargazer);
        storage.upsert_stats(&sg).await.unwrap();

        let loaded = storage.get_stats(&repo.id, &c).await.unwrap().unwrap();
        assert_eq!(loaded.source, ContributorSource::Commit);
        assert_eq!(loaded.total_commits, 0, "counters are overwritten wholesale");

        let in_project = storage.list_project_stats("proj-1", &c).await.unwrap();
        assert_eq!(in_project.len(), 1);
    }

    #[tokio::test]
    async fn social_context_last_enrichment_wins() {
        let storage = test_storage().await;
        let c = storage
            .upsert_contributor(&sample_contributor(1, "a"))
            .await
            .unwrap();

        let mut first = SocialContext::empty(&c);
        first.profile_url = Some("https://linkedin.com/in/a".into());
        storage.upsert_social_context(&first).await.unwrap();

        let mut second = SocialContext::empty(&c);
        second.profile_url = Some("https://linkedin.com/in/a-new".into());
        second.classification = Some(Classification::DecisionMaker);
        second.classification_confidence = Some(0.9);
        second.raw_signals = Some(serde_json::json!({"network": {"followers": 10}}));
        storage.upsert_social_context(&second).await.unwrap();

        let loaded = storage.get_social_context(&c).await.unwrap().unwrap();
        assert_eq!(
            loaded.profile_url.as_deref(),
            Some("https://linkedin.com/in/a-new")
        );
        assert_eq!(loaded.classification, Some(Classification::DecisionMaker));
        assert!(loaded.raw_signals.is_some());
    }

    #[tokio::test]
    async fn lead_score_upsert_and_listing() {
        let storage = test_storage().await;
        let c = storage
            .upsert_contributor(&sample_contributor(1, "a"))
            .await
            .unwrap();

        let score = LeadScore {
            project_id: "proj-1".into(),
            contributor_id: c.clone(),
            overall_score: 72.0,
            activity_score: 80.0,
            influence_score: 50.0,
            position_score: 90.0,
            engagement_score: 40.0,
            is_qualified: true,
            priority: Priority::Medium,
            calculated_at: Utc::now(),
        };
        storage.upsert_lead_score(&score).await.unwrap();

        // Recompute overwrites in place.
        let mut updated = score.clone();
        updated.overall_score = 55.0;
        updated.is_qualified = false;
        updated.priority = Priority::Low;
        storage.upsert_lead_score(&updated).await.unwrap();

        let loaded = storage.get_lead_score("proj-1", &c).await.unwrap().unwrap();
        assert!((loaded.overall_score - 55.0).abs() < f64::EPSILON);
        assert!(!loaded.is_qualified);

        assert_eq!(storage.list_lead_scores("proj-1", false).await.unwrap().len(), 1);
        assert!(storage.list_lead_scores("proj-1", true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_sourcing_enqueue_is_rejected() {
        let storage = test_storage().await;
        let repo = sample_repo("proj-1", "o/r");
        storage.insert_repository(&repo).await.unwrap();

        let first = Job::new(
            JobParams::RepositorySourcing {
                repository_id: repo.id.clone(),
            },
            Some("proj-1".into()),
        );
        storage.enqueue_job(&first).await.expect("first enqueue");

        let second = Job::new(
            JobParams::RepositorySourcing {
                repository_id: repo.id.clone(),
            },
            Some("proj-1".into()),
        );
        let err = storage.enqueue_job(&second).await.unwrap_err();
        assert!(matches!(err, SourcerError::AlreadyInProgress { .. }));

        // Other job types for the same repository are fine.
        let stars = Job::new(
            JobParams::StargazerAnalysis {
                repository_id: repo.id.clone(),
                limit: None,
            },
            Some("proj-1".into()),
        );
        storage.enqueue_job(&stars).await.expect("stargazers enqueue");
    }

    #[tokio::test]
    async fn claim_is_bounded_and_ordered() {
        let storage = test_storage().await;
        for i in 0..5 {
            let job = Job::new(
                JobParams::SocialEnrichment {
                    contributor_id: format!("c-{i}"),
                },
                None,
            );
            storage.enqueue_job(&job).await.unwrap();
        }

        let claimed = storage.claim_pending_jobs(3).await.unwrap();
        assert_eq!(claimed.len(), 3);
        assert!(claimed.iter().all(|j| j.status == JobStatus::Running));
        assert!(claimed.iter().all(|j| j.started_at.is_some()));

        let summary = storage.jobs_summary().await.unwrap();
        assert_eq!(summary.running, 3);
        assert_eq!(summary.pending, 2);

        // Creation order is preserved.
        let rest = storage.claim_pending_jobs(10).await.unwrap();
        assert_eq!(rest.len(), 2);
    }

    #[tokio::test]
    async fn claim_skips_repo_with_running_sourcing_job() {
        let storage = test_storage().await;
        let repo = sample_repo("proj-1", "o/r");
        storage.insert_repository(&repo).await.unwrap();

        let first = Job::new(
            JobParams::RepositorySourcing {
                repository_id: repo.id.clone(),
            },
            None,
        );
        storage.enqueue_job(&first).await.unwrap();
        let claimed = storage.claim_pending_jobs(1).await.unwrap();
        assert_eq!(claimed.len(), 1);

        // Force a second pending sourcing job for the same repository in
        // (bypassing the enqueue guard, as a second scheduler would).
        let mut second = Job::new(
            JobParams::RepositorySourcing {
                repository_id: repo.id.clone(),
            },
            None,
        );
        second.repository_id = Some(repo.id.clone());
        let params_json = serde_json::to_string(&second.params).unwrap();
        storage
            .conn
            .execute(
                "INSERT INTO jobs (id, job_type, status, repository_id, params_json, created_at)
                 VALUES (?1, 'repository_sourcing', 'pending', ?2, ?3, ?4)",
                params![
                    second.id.to_string().as_str(),
                    repo.id.as_str(),
                    params_json.as_str(),
                    ts(&Utc::now()).as_str()
                ],
            )
            .await
            .unwrap();

        // While the first is running, the duplicate stays pending.
        let claimed = storage.claim_pending_jobs(5).await.unwrap();
        assert!(claimed.is_empty());

        // Once the first finishes, the duplicate becomes claimable.
        storage.complete_job(&first.id).await.unwrap();
        let claimed = storage.claim_pending_jobs(5).await.unwrap();
        assert_eq!(claimed.len(), 1);
    }

    #[tokio::test]
    async fn job_progress_and_terminal_transitions() {
        let storage = test_storage().await;
        let job = Job::new(
            JobParams::SocialEnrichment {
                contributor_id: "c-1".into(),
            },
            None,
        );
        storage.enqueue_job(&job).await.unwrap();
        storage.claim_pending_jobs(1).await.unwrap();

        storage.set_total_steps(&job.id, 4).await.unwrap();
        storage.update_job_progress(&job.id, 1, 4).await.unwrap();

        let loaded = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_step, 1);
        assert!((loaded.progress_percentage - 25.0).abs() < f64::EPSILON);

        storage.complete_job(&job.id).await.unwrap();
        let loaded = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert!(loaded.completed_at.is_some());

        // Terminal is terminal: a late fail must not overwrite completed.
        storage.fail_job(&job.id, "too late").await.unwrap();
        let loaded = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert!(loaded.error_message.is_none());
    }

    #[tokio::test]
    async fn cancellation_flag_and_open_steps() {
        let storage = test_storage().await;
        let job = Job::new(
            JobParams::SocialEnrichment {
                contributor_id: "c-1".into(),
            },
            None,
        );
        storage.enqueue_job(&job).await.unwrap();
        storage.claim_pending_jobs(1).await.unwrap();

        let step = storage
            .create_step(&job.id, 1, "Discovering social profile")
            .await
            .unwrap();
        storage
            .complete_step(&step.id, "Profile found", None)
            .await
            .unwrap();
        let step2 = storage
            .create_step(&job.id, 2, "Deriving sub-signals")
            .await
            .unwrap();
        let _ = step2;

        assert!(storage.cancel_job(&job.id).await.unwrap());
        assert!(storage.is_cancelled(&job.id).await.unwrap());
        storage.cancel_open_steps(&job.id).await.unwrap();

        let steps = storage.list_steps(&job.id).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].status, StepStatus::Completed);
        assert_eq!(steps[1].status, StepStatus::Cancelled);

        // Cancelling a terminal job is a no-op.
        assert!(!storage.cancel_job(&job.id).await.unwrap());
    }

    #[tokio::test]
    async fn failed_job_keeps_error_and_history() {
        let storage = test_storage().await;
        let job = Job::new(
            JobParams::SocialEnrichment {
                contributor_id: "c-1".into(),
            },
            None,
        );
        storage.enqueue_job(&job).await.unwrap();
        storage.claim_pending_jobs(1).await.unwrap();

        let step = storage
            .create_step(&job.id, 1, "Discovering social profile")
            .await
            .unwrap();
        storage
            .fail_step(&step.id, "rate limited by search")
            .await
            .unwrap();
        storage
            .fail_job(&job.id, "rate limited by search")
            .await
            .unwrap();

        let loaded = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.error_message.as_deref(), Some("rate limited by search"));
        assert!(loaded.completed_at.is_some());

        let steps = storage.list_steps(&job.id).await.unwrap();
        assert_eq!(steps[0].status, StepStatus::Failed);
        assert!(steps[0].error_message.is_some());
    }

    #[tokio::test]
    async fn orphaned_jobs_are_recovered() {
        let storage = test_storage().await;
        let job = Job::new(
            JobParams::SocialEnrichment {
                contributor_id: "c-1".into(),
            },
            None,
        );
        storage.enqueue_job(&job).await.unwrap();
        storage.claim_pending_jobs(1).await.unwrap();
        storage.create_step(&job.id, 1, "Searching").await.unwrap();

        let recovered = storage.recover_orphaned_jobs().await.unwrap();
        assert_eq!(recovered, 1);

        let loaded = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert!(loaded.started_at.is_none());
        assert_eq!(loaded.current_step, 0);
        assert!(storage.list_steps(&job.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("ls_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_repository(&sample_repo("proj-1", "o/r"))
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_repositories().await.unwrap().len(), 1);

        let result = ro.insert_repository(&sample_repo("proj-1", "o/r2")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
