use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use ws_orchestrator::OrchestratorConfig;

/// Daemon configuration, read from `WSD_*` environment variables.
/// Provider endpoints and tokens have no sane defaults and are required;
/// everything else falls back to a working local setup.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,

    pub compute_api_url: Url,
    pub compute_token: String,
    pub network_api_url: Url,
    pub network_token: String,

    pub poll_interval_secs: u64,
    pub max_concurrent: usize,
    pub max_attempts: u32,

    pub reconciler_interval_secs: u64,
    pub reconciler_min_age_secs: u64,
    /// Dry-run unless explicitly enabled
    pub reconciler_delete: bool,

    pub server_image: String,
    pub server_location: String,
    pub volume_rate: f64,
    pub server_rate: f64,
}

fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("WSD_DB_PATH") {
        return PathBuf::from(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".workspaced")
        .join("workspaces.db")
}

fn require_url(var: &str) -> Result<Url> {
    let value =
        std::env::var(var).with_context(|| format!("{} must be set", var))?;
    Url::parse(&value).with_context(|| format!("{} is not a valid URL", var))
}

fn require_var(var: &str) -> Result<String> {
    std::env::var(var).with_context(|| format!("{} must be set", var))
}

fn env_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            db_path: default_db_path(),

            compute_api_url: require_url("WSD_COMPUTE_API_URL")?,
            compute_token: require_var("WSD_COMPUTE_TOKEN")?,
            network_api_url: require_url("WSD_NETWORK_API_URL")?,
            network_token: require_var("WSD_NETWORK_TOKEN")?,

            poll_interval_secs: env_or("WSD_POLL_INTERVAL", 5),
            max_concurrent: env_or("WSD_MAX_CONCURRENT", 4),
            max_attempts: env_or("WSD_MAX_ATTEMPTS", 3),

            reconciler_interval_secs: env_or("WSD_RECONCILER_INTERVAL", 3600),
            reconciler_min_age_secs: env_or("WSD_RECONCILER_MIN_AGE", 86400),
            reconciler_delete: env_or("WSD_RECONCILER_DELETE", false),

            server_image: std::env::var("WSD_SERVER_IMAGE")
                .unwrap_or_else(|_| "ubuntu-24.04".to_string()),
            server_location: std::env::var("WSD_SERVER_LOCATION")
                .unwrap_or_else(|_| "fsn1".to_string()),
            volume_rate: env_or("WSD_VOLUME_RATE", 0.0048),
            server_rate: env_or("WSD_SERVER_RATE", 0.0082),
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            server_image: self.server_image.clone(),
            server_location: self.server_location.clone(),
            volume_rate: self.volume_rate,
            server_rate: self.server_rate,
            ..OrchestratorConfig::default()
        }
    }

    pub fn worker_config(&self) -> ws_worker::WorkerConfig {
        ws_worker::WorkerConfig::new(
            Duration::from_secs(self.poll_interval_secs),
            self.max_concurrent,
            self.max_attempts,
        )
    }
}
