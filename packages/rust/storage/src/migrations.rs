//! SQL migration definitions for the LeadSourcer database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: repositories, contributors, stats, social context, lead scores, jobs, job steps",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Tracked repositories
CREATE TABLE IF NOT EXISTS repositories (
    id                TEXT PRIMARY KEY,
    project_id        TEXT NOT NULL,
    url               TEXT NOT NULL,
    full_name         TEXT NOT NULL,
    owner             TEXT NOT NULL,
    name              TEXT NOT NULL,
    description       TEXT,
    stars             INTEGER NOT NULL DEFAULT 0,
    forks             INTEGER NOT NULL DEFAULT 0,
    open_issues       INTEGER NOT NULL DEFAULT 0,
    language          TEXT,
    topics_json       TEXT NOT NULL DEFAULT '[]',
    last_sourced_at   TEXT,
    sourcing_interval TEXT NOT NULL DEFAULT 'monthly',
    next_sourcing_at  TEXT,
    is_active         INTEGER NOT NULL DEFAULT 1,
    created_at        TEXT NOT NULL,
    UNIQUE(project_id, full_name)
);

CREATE INDEX IF NOT EXISTS idx_repositories_due
    ON repositories(next_sourcing_at) WHERE is_active = 1;

-- People discovered via repositories
CREATE TABLE IF NOT EXISTS contributors (
    id               TEXT PRIMARY KEY,
    account_id       INTEGER NOT NULL UNIQUE,
    username         TEXT NOT NULL UNIQUE,
    full_name        TEXT,
    email            TEXT,
    company          TEXT,
    location         TEXT,
    bio              TEXT,
    blog             TEXT,
    twitter_username TEXT,
    avatar_url       TEXT,
    profile_url      TEXT,
    public_repos     INTEGER NOT NULL DEFAULT 0,
    followers        INTEGER NOT NULL DEFAULT 0,
    following        INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

-- Repository <-> contributor links
CREATE TABLE IF NOT EXISTS repository_contributors (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    repository_id  TEXT NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    contributor_id TEXT NOT NULL REFERENCES contributors(id) ON DELETE CASCADE,
    discovered_at  TEXT NOT NULL,
    UNIQUE(repository_id, contributor_id)
);

CREATE INDEX IF NOT EXISTS idx_repo_contributors_contributor
    ON repository_contributors(contributor_id);

-- Per-(repository, contributor) activity facts
CREATE TABLE IF NOT EXISTS contributor_stats (
    id                    TEXT PRIMARY KEY,
    repository_id         TEXT NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    contributor_id        TEXT NOT NULL REFERENCES contributors(id) ON DELETE CASCADE,
    total_commits         INTEGER NOT NULL DEFAULT 0,
    commits_last_3_months INTEGER NOT NULL DEFAULT 0,
    commits_last_6_months INTEGER NOT NULL DEFAULT 0,
    commits_last_year     INTEGER NOT NULL DEFAULT 0,
    first_commit_date     TEXT,
    last_commit_date      TEXT,
    pull_requests         INTEGER NOT NULL DEFAULT 0,
    issues_opened         INTEGER NOT NULL DEFAULT 0,
    code_reviews          INTEGER NOT NULL DEFAULT 0,
    is_maintainer         INTEGER NOT NULL DEFAULT 0,
    source                TEXT NOT NULL DEFAULT 'commit',
    calculated_at         TEXT NOT NULL,
    UNIQUE(repository_id, contributor_id)
);

CREATE INDEX IF NOT EXISTS idx_stats_contributor ON contributor_stats(contributor_id);

-- Enrichment results, at most one row per contributor
CREATE TABLE IF NOT EXISTS social_context (
    contributor_id            TEXT PRIMARY KEY REFERENCES contributors(id) ON DELETE CASCADE,
    profile_url               TEXT,
    headline                  TEXT,
    photo_url                 TEXT,
    current_company           TEXT,
    current_position          TEXT,
    position_level            TEXT,
    industry                  TEXT,
    classification            TEXT,
    classification_confidence REAL,
    classification_reasoning  TEXT,
    raw_signals_json          TEXT,
    last_enriched_at          TEXT NOT NULL
);

-- Composite scores per (project, contributor)
CREATE TABLE IF NOT EXISTS lead_scores (
    id               TEXT PRIMARY KEY,
    project_id       TEXT NOT NULL,
    contributor_id   TEXT NOT NULL REFERENCES contributors(id) ON DELETE CASCADE,
    overall_score    REAL NOT NULL DEFAULT 0,
    activity_score   REAL NOT NULL DEFAULT 0,
    influence_score  REAL NOT NULL DEFAULT 0,
    position_score   REAL NOT NULL DEFAULT 0,
    engagement_score REAL NOT NULL DEFAULT 0,
    is_qualified     INTEGER NOT NULL DEFAULT 0,
    priority         TEXT NOT NULL DEFAULT 'low',
    calculated_at    TEXT NOT NULL,
    UNIQUE(project_id, contributor_id)
);

CREATE INDEX IF NOT EXISTS idx_lead_scores_project ON lead_scores(project_id);

-- Durable job queue and progress
CREATE TABLE IF NOT EXISTS jobs (
    id                  TEXT PRIMARY KEY,
    job_type            TEXT NOT NULL,
    status              TEXT NOT NULL DEFAULT 'pending',
    project_id          TEXT,
    repository_id       TEXT,
    params_json         TEXT NOT NULL,
    total_steps         INTEGER NOT NULL DEFAULT 0,
    current_step        INTEGER NOT NULL DEFAULT 0,
    progress_percentage REAL NOT NULL DEFAULT 0,
    started_at          TEXT,
    completed_at        TEXT,
    error_message       TEXT,
    created_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_repository ON jobs(repository_id, job_type, status);

-- Append-only per-step execution history
CREATE TABLE IF NOT EXISTS job_steps (
    id            TEXT PRIMARY KEY,
    job_id        TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    step_number   INTEGER NOT NULL,
    name          TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending',
    message       TEXT,
    details_json  TEXT,
    error_message TEXT,
    started_at    TEXT,
    completed_at  TEXT,
    UNIQUE(job_id, step_number)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
