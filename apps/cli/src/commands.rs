//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use leadsourcer_core::{JobExecutor, PipelineLimits, Scheduler, WakeHandle};
use leadsourcer_enrichment::{OracleClient, SearchClient};
use leadsourcer_gate::{ApiGate, GatePolicy};
use leadsourcer_github::{GithubClient, parse_repo_url};
use leadsourcer_shared::{
    AppConfig, Job, JobId, JobParams, Repository, SourcingInterval, WorkerConfig, init_config,
    load_config, resolve_api_key, validate_github_token,
};
use leadsourcer_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LeadSourcer — turn repository activity into ranked sales leads.
#[derive(Parser)]
#[command(
    name = "leadsourcer",
    version,
    about = "Source repositories, enrich contributors, and rank leads for outreach.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start the background worker (scheduler + job executor).
    Run {
        /// Override the poll cadence in seconds.
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Override the concurrent-job budget.
        #[arg(long)]
        max_jobs: Option<u32>,
    },

    /// Repository registry management.
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Enqueue a repository sourcing job.
    Source {
        /// Repository id, owner/name, or URL.
        repository: String,
    },

    /// Enqueue a stargazer analysis job.
    Stargazers {
        /// Repository id, owner/name, or URL.
        repository: String,

        /// Maximum stargazers to analyze.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Enqueue a social enrichment job for one contributor.
    Enrich {
        /// Contributor id.
        contributor_id: String,
    },

    /// Enqueue a similar-repositories discovery job.
    Similar {
        /// Seed repository id, owner/name, or URL.
        repository: String,

        /// Explicit search query (derived from the seed if omitted).
        #[arg(long)]
        query: Option<String>,

        /// Maximum repositories registered per run.
        #[arg(long, default_value_t = 5)]
        fanout: u32,

        /// Auto-enqueue sourcing jobs for discovered repositories.
        #[arg(long)]
        auto_source: bool,
    },

    /// Job queue inspection.
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// List lead scores for a project, best first.
    Leads {
        /// Project id.
        project: String,

        /// Only show qualified leads.
        #[arg(long)]
        qualified: bool,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Repository subcommands.
#[derive(Subcommand)]
pub(crate) enum RepoAction {
    /// Register a repository for sourcing.
    Add {
        /// Owning project id.
        project: String,

        /// Repository URL or owner/name.
        reference: String,

        /// Sourcing cadence: daily, weekly, or monthly.
        #[arg(long, default_value = "monthly")]
        interval: String,
    },

    /// List registered repositories.
    List {
        /// Only repositories due for sourcing.
        #[arg(long)]
        due: bool,
    },
}

/// Job subcommands.
#[derive(Subcommand)]
pub(crate) enum JobsAction {
    /// List recent jobs.
    List {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show one job with its step history.
    Show { id: String },

    /// Follow a job's progress until it finishes.
    Watch { id: String },

    /// Request cancellation of a job.
    Cancel { id: String },

    /// Counts by status.
    Summary,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default config file.
    Init,

    /// Print the effective configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Install the tracing subscriber according to CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::EnvFilter;

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    match cli.log_format {
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Dispatch the parsed CLI to its command handler.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config()?;

    match cli.command {
        Command::Run {
            interval_secs,
            max_jobs,
        } => cmd_run(config, interval_secs, max_jobs).await,
        Command::Repo { action } => match action {
            RepoAction::Add {
                project,
                reference,
                interval,
            } => cmd_repo_add(&config, &project, &reference, &interval).await,
            RepoAction::List { due } => cmd_repo_list(&config, due).await,
        },
        Command::Source { repository } => {
            let storage = open_storage(&config).await?;
            let repo = resolve_repository(&storage, &repository).await?;
            enqueue(
                &storage,
                JobParams::RepositorySourcing {
                    repository_id: repo.id.clone(),
                },
                Some(repo.project_id.clone()),
            )
            .await
        }
        Command::Stargazers { repository, limit } => {
            let storage = open_storage(&config).await?;
            let repo = resolve_repository(&storage, &repository).await?;
            enqueue(
                &storage,
                JobParams::StargazerAnalysis {
                    repository_id: repo.id.clone(),
                    limit,
                },
                Some(repo.project_id.clone()),
            )
            .await
        }
        Command::Enrich { contributor_id } => {
            let storage = open_storage(&config).await?;
            if storage.get_contributor(&contributor_id).await?.is_none() {
                return Err(eyre!("contributor {contributor_id} not found"));
            }
            enqueue(&storage, JobParams::SocialEnrichment { contributor_id }, None).await
        }
        Command::Similar {
            repository,
            query,
            fanout,
            auto_source,
        } => {
            let storage = open_storage(&config).await?;
            let repo = resolve_repository(&storage, &repository).await?;
            enqueue(
                &storage,
                JobParams::SimilarRepos {
                    repository_id: repo.id.clone(),
                    query,
                    fanout_limit: fanout,
                    auto_source,
                },
                Some(repo.project_id.clone()),
            )
            .await
        }
        Command::Jobs { action } => match action {
            JobsAction::List { limit } => cmd_jobs_list(&config, limit).await,
            JobsAction::Show { id } => cmd_jobs_show(&config, &id).await,
            JobsAction::Watch { id } => cmd_jobs_watch(&config, &id).await,
            JobsAction::Cancel { id } => cmd_jobs_cancel(&config, &id).await,
            JobsAction::Summary => cmd_jobs_summary(&config).await,
        },
        Command::Leads { project, qualified } => cmd_leads(&config, &project, qualified).await,
        Command::Config { action } => match action {
            ConfigAction::Init => {
                let path = init_config()?;
                println!("Wrote {}", path.display());
                Ok(())
            }
            ConfigAction::Show => {
                let rendered = toml::to_string_pretty(&config)
                    .map_err(|e| eyre!("config serialization failed: {e}"))?;
                println!("{rendered}");
                Ok(())
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let db_path = config.db_path()?;
    Ok(Storage::open(&db_path).await?)
}

/// Resolve a repository by id, owner/name, or URL.
async fn resolve_repository(storage: &Storage, reference: &str) -> Result<Repository> {
    if let Some(repo) = storage.get_repository(reference).await? {
        return Ok(repo);
    }

    let (owner, name) = parse_repo_url(reference)?;
    let full_name = format!("{owner}/{name}");
    let matched = storage
        .list_repositories()
        .await?
        .into_iter()
        .find(|r| r.full_name == full_name);

    matched.ok_or_else(|| eyre!("repository {full_name} is not registered (use `repo add`)"))
}

async fn enqueue(storage: &Storage, params: JobParams, project_id: Option<String>) -> Result<()> {
    let job = Job::new(params, project_id);
    storage.enqueue_job(&job).await?;
    println!("Enqueued {} job {}", job.job_type, job.id);
    Ok(())
}

async fn cmd_run(
    config: AppConfig,
    interval_secs: Option<u64>,
    max_jobs: Option<u32>,
) -> Result<()> {
    validate_github_token(&config)?;

    let mut worker = WorkerConfig::from(&config);
    if let Some(secs) = interval_secs {
        worker.check_interval = Duration::from_secs(secs);
    }
    if let Some(max) = max_jobs {
        worker.max_concurrent_jobs = max as usize;
    }

    let storage = Arc::new(open_storage(&config).await?);
    let gate = Arc::new(ApiGate::new(GatePolicy {
        retry_attempts: config.gate.retry_attempts,
        backoff_base: Duration::from_millis(config.gate.backoff_base_ms),
        backoff_cap: Duration::from_millis(config.gate.backoff_cap_ms),
        max_quota_wait: Duration::from_secs(config.gate.max_quota_wait_secs),
    }));

    let token = resolve_api_key(&config.github.token_env);
    let github = Arc::new(GithubClient::new(
        &config.github.api_base,
        token.as_deref(),
        gate.clone(),
    )?);
    let search = Arc::new(SearchClient::new(
        &config.search.endpoint,
        resolve_api_key(&config.search.api_key_env),
        gate.clone(),
    )?);
    let oracle = Arc::new(OracleClient::new(
        &config.oracle.endpoint,
        resolve_api_key(&config.oracle.api_key_env),
        config.oracle.model.clone(),
        gate.clone(),
    )?);

    let wake = WakeHandle::new();
    let executor = Arc::new(
        JobExecutor::new(
            storage.clone(),
            github,
            search,
            oracle,
            PipelineLimits::from(&config),
        )
        .with_wake(wake.clone()),
    );

    let scheduler = Scheduler::new(storage, executor, worker, wake);
    info!("worker starting");
    scheduler.run().await;
    Ok(())
}

async fn cmd_repo_add(
    config: &AppConfig,
    project: &str,
    reference: &str,
    interval: &str,
) -> Result<()> {
    let (owner, name) = parse_repo_url(reference)?;
    let interval: SourcingInterval = interval.parse()?;

    let storage = open_storage(config).await?;
    let full_name = format!("{owner}/{name}");
    if storage.find_repository(project, &full_name).await?.is_some() {
        return Err(eyre!("{full_name} is already registered in {project}"));
    }

    let url = if reference.contains("://") {
        reference.to_string()
    } else {
        format!("https://github.com/{full_name}")
    };
    let repo = Repository::new(project, url, owner, name, interval);
    storage.insert_repository(&repo).await?;

    println!(
        "Registered {} ({}) for {} sourcing",
        repo.full_name,
        repo.id,
        repo.sourcing_interval.as_str()
    );
    Ok(())
}

async fn cmd_repo_list(config: &AppConfig, due_only: bool) -> Result<()> {
    let storage = open_storage(config).await?;
    let repos = if due_only {
        storage.list_due_repositories(chrono::Utc::now()).await?
    } else {
        storage.list_repositories().await?
    };

    if repos.is_empty() {
        println!("No repositories registered.");
        return Ok(());
    }

    for repo in repos {
        let next = repo
            .next_sourcing_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".into());
        println!(
            "{}  {}  project={}  interval={}  next={}",
            repo.id,
            repo.full_name,
            repo.project_id,
            repo.sourcing_interval.as_str(),
            next
        );
    }
    Ok(())
}

fn parse_job_id(id: &str) -> Result<JobId> {
    id.parse().map_err(|e| eyre!("invalid job id {id}: {e}"))
}

async fn cmd_jobs_list(config: &AppConfig, limit: u32) -> Result<()> {
    let storage = open_storage(config).await?;
    let jobs = storage.list_jobs(limit).await?;

    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{}  {:<20}  {:<9}  {:>3.0}%  {}",
            job.id,
            job.job_type.as_str(),
            job.status.as_str(),
            job.progress_percentage,
            job.error_message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn cmd_jobs_show(config: &AppConfig, id: &str) -> Result<()> {
    let storage = open_storage(config).await?;
    let job_id = parse_job_id(id)?;
    let job = storage
        .get_job(&job_id)
        .await?
        .ok_or_else(|| eyre!("job {id} not found"))?;

    println!("Job {}", job.id);
    println!("  type:     {}", job.job_type);
    println!("  status:   {}", job.status);
    println!(
        "  progress: {}/{} ({:.0}%)",
        job.current_step, job.total_steps, job.progress_percentage
    );
    if let Some(error) = &job.error_message {
        println!("  error:    {error}");
    }

    for step in storage.list_steps(&job_id).await? {
        println!(
            "  [{}] {:<40} {:<9} {}",
            step.step_number,
            step.name,
            step.status.as_str(),
            step.message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn cmd_jobs_watch(config: &AppConfig, id: &str) -> Result<()> {
    let storage = open_storage(config).await?;
    let job_id = parse_job_id(id)?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {percent:>3}%  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    loop {
        let Some(job) = storage.get_job(&job_id).await? else {
            bar.abandon_with_message("job disappeared");
            return Err(eyre!("job {id} not found"));
        };

        bar.set_position(job.progress_percentage.round() as u64);
        bar.set_message(format!(
            "{} step {}/{}",
            job.status, job.current_step, job.total_steps
        ));

        if job.status.is_terminal() {
            bar.finish_with_message(format!(
                "{}{}",
                job.status,
                job.error_message
                    .map(|e| format!(": {e}"))
                    .unwrap_or_default()
            ));
            return Ok(());
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn cmd_jobs_cancel(config: &AppConfig, id: &str) -> Result<()> {
    let storage = open_storage(config).await?;
    let job_id = parse_job_id(id)?;
    if storage.cancel_job(&job_id).await? {
        println!("Cancellation requested for {id}");
    } else {
        println!("Job {id} is not pending or running");
    }
    Ok(())
}

async fn cmd_jobs_summary(config: &AppConfig) -> Result<()> {
    let storage = open_storage(config).await?;
    let summary = storage.jobs_summary().await?;
    println!("pending:   {}", summary.pending);
    println!("running:   {}", summary.running);
    println!("completed: {}", summary.completed);
    println!("failed:    {}", summary.failed);
    println!("cancelled: {}", summary.cancelled);
    Ok(())
}

async fn cmd_leads(config: &AppConfig, project: &str, qualified: bool) -> Result<()> {
    let storage = open_storage(config).await?;
    let scores = storage.list_lead_scores(project, qualified).await?;

    if scores.is_empty() {
        println!("No leads scored for project {project}.");
        return Ok(());
    }

    for score in scores {
        let contributor = storage.get_contributor(&score.contributor_id).await?;
        let username = contributor
            .map(|c| c.username)
            .unwrap_or_else(|| score.contributor_id.clone());
        println!(
            "{:>5.1}  {:<6}  {}{}",
            score.overall_score,
            score.priority.as_str(),
            username,
            if score.is_qualified { "  [qualified]" } else { "" }
        );
    }
    Ok(())
}
