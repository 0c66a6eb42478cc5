//! Application configuration for LeadSourcer.
//!
//! User config lives at `~/.leadsourcer/leadsourcer.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are referenced by environment-variable name and never stored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SourcerError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadsourcer.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadsourcer";

// ---------------------------------------------------------------------------
// Config structs (matching leadsourcer.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Worker/scheduler defaults.
    #[serde(default)]
    pub worker: WorkerDefaults,

    /// Repository host settings.
    #[serde(default)]
    pub github: GithubConfig,

    /// Web-search provider settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Classification oracle settings.
    #[serde(default)]
    pub oracle: OracleConfig,

    /// API-gate retry/quota policy.
    #[serde(default)]
    pub gate: GateConfig,
}

/// `[worker]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDefaults {
    /// Directory holding the local database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Poll cadence of the scheduler loop, in seconds.
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,

    /// Global admission budget for concurrently running jobs.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,
}

impl Default for WorkerDefaults {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            check_interval_seconds: default_check_interval(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

fn default_data_dir() -> String {
    "~/.leadsourcer".into()
}
fn default_check_interval() -> u64 {
    30
}
fn default_max_concurrent_jobs() -> u32 {
    3
}

/// `[github]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// Name of the env var holding the API token (never store the token).
    #[serde(default = "default_github_token_env")]
    pub token_env: String,

    /// API base URL (overridable for tests).
    #[serde(default = "default_github_api_base")]
    pub api_base: String,

    /// Maximum contributors fetched per sourcing run.
    #[serde(default = "default_contributor_limit")]
    pub contributor_limit: u32,

    /// Maximum stargazers fetched per analysis run.
    #[serde(default = "default_stargazer_limit")]
    pub stargazer_limit: u32,

    /// How many contributors get a detailed profile fetch.
    #[serde(default = "default_detailed_profile_limit")]
    pub detailed_profile_limit: u32,

    /// Whether to issue per-contributor PR/issue search queries.
    #[serde(default)]
    pub fetch_pr_issue_counts: bool,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token_env: default_github_token_env(),
            api_base: default_github_api_base(),
            contributor_limit: default_contributor_limit(),
            stargazer_limit: default_stargazer_limit(),
            detailed_profile_limit: default_detailed_profile_limit(),
            fetch_pr_issue_counts: false,
        }
    }
}

fn default_github_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_github_api_base() -> String {
    "https://api.github.com".into()
}
fn default_contributor_limit() -> u32 {
    100
}
fn default_stargazer_limit() -> u32 {
    200
}
fn default_detailed_profile_limit() -> u32 {
    20
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the search API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Search endpoint URL.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            endpoint: default_search_endpoint(),
        }
    }
}

fn default_search_key_env() -> String {
    "SERPER_API_KEY".into()
}
fn default_search_endpoint() -> String {
    "https://google.serper.dev/search".into()
}

/// `[oracle]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Name of the env var holding the oracle API key.
    #[serde(default = "default_oracle_key_env")]
    pub api_key_env: String,

    /// Chat-completions endpoint URL.
    #[serde(default = "default_oracle_endpoint")]
    pub endpoint: String,

    /// Model used for contributor classification.
    #[serde(default = "default_oracle_model")]
    pub model: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_oracle_key_env(),
            endpoint: default_oracle_endpoint(),
            model: default_oracle_model(),
        }
    }
}

fn default_oracle_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_oracle_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}
fn default_oracle_model() -> String {
    "gpt-4o-mini".into()
}

/// `[gate]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Total attempts per call (first try included).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff delay in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff cap in milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Ceiling on how long a call may wait for quota before escalating.
    #[serde(default = "default_max_quota_wait_secs")]
    pub max_quota_wait_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            max_quota_wait_secs: default_max_quota_wait_secs(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1_000
}
fn default_backoff_cap_ms() -> u64 {
    10_000
}
fn default_max_quota_wait_secs() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// Worker config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime scheduler configuration — merged from config file + CLI flags.
///
/// Constructed once at startup and passed explicitly to the scheduler and
/// the concurrency limiter; there is no ambient mutable settings state.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Poll cadence of the scheduler loop.
    pub check_interval: Duration,
    /// Global admission budget for concurrently running jobs.
    pub max_concurrent_jobs: usize,
}

impl From<&AppConfig> for WorkerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            check_interval: Duration::from_secs(config.worker.check_interval_seconds),
            max_concurrent_jobs: config.worker.max_concurrent_jobs as usize,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadsourcer/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SourcerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadsourcer/leadsourcer.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SourcerError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SourcerError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SourcerError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SourcerError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SourcerError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

impl AppConfig {
    /// Resolve the data directory, expanding a leading `~/`.
    pub fn data_dir(&self) -> Result<PathBuf> {
        expand_home(&self.worker.data_dir)
    }

    /// Path to the local database file.
    pub fn db_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("leadsourcer.db"))
    }
}

/// Expand a leading `~/` in a configured path.
fn expand_home(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| SourcerError::config("could not determine home directory"))?;
        Ok(home.join(rest))
    } else {
        Ok(PathBuf::from(path))
    }
}

/// Read an API key from the named environment variable, if set and non-empty.
pub fn resolve_api_key(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Some(val),
        _ => None,
    }
}

/// Check that the repository-host token env var is set and non-empty.
pub fn validate_github_token(config: &AppConfig) -> Result<()> {
    let var_name = &config.github.token_env;
    match resolve_api_key(var_name) {
        Some(_) => Ok(()),
        None => Err(SourcerError::config(format!(
            "GitHub token not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("check_interval_seconds"));
        assert!(toml_str.contains("GITHUB_TOKEN"));
        assert!(toml_str.contains("SERPER_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.worker.check_interval_seconds, 30);
        assert_eq!(parsed.worker.max_concurrent_jobs, 3);
        assert_eq!(parsed.github.contributor_limit, 100);
        assert_eq!(parsed.gate.retry_attempts, 3);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[worker]
max_concurrent_jobs = 8

[github]
api_base = "http://localhost:9999"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.worker.max_concurrent_jobs, 8);
        assert_eq!(config.worker.check_interval_seconds, 30);
        assert_eq!(config.github.api_base, "http://localhost:9999");
        assert_eq!(config.github.stargazer_limit, 200);
    }

    #[test]
    fn worker_config_from_app_config() {
        let app = AppConfig::default();
        let worker = WorkerConfig::from(&app);
        assert_eq!(worker.check_interval, Duration::from_secs(30));
        assert_eq!(worker.max_concurrent_jobs, 3);
    }

    #[test]
    fn github_token_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.github.token_env = "LS_TEST_NONEXISTENT_TOKEN_12345".into();
        let result = validate_github_token(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("token not found"));
    }

    #[test]
    fn home_expansion() {
        let expanded = expand_home("~/some/dir").expect("expand");
        assert!(!expanded.to_string_lossy().starts_with('~'));

        let absolute = expand_home("/tmp/ls").expect("absolute");
        assert_eq!(absolute, PathBuf::from("/tmp/ls"));
    }
}
