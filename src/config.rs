use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const FACEIT_DATA_API_URL: &str = "https://open.faceit.com/data/v4";
pub const FACEIT_WEB_API_URL: &str = "https://www.faceit.com";
pub const FACEIT_ROOM_URL: &str = "https://www.faceit.com/en/cs2/room";

/// Game identifier used on every FACEIT data API call.
pub const GAME_ID: &str = "cs2";

/// Marker prefixing the resolve worker's JSON line on stdout.
pub const MATCHID_MARKER: &str = "__MATCHID_JSON__";

/// Marker prefixing the compute worker's JSON line on stdout.
pub const WINPROB_MARKER: &str = "__WINPROB_JSON__";

/// Recent matches pulled per player for the stats aggregate.
pub const STATS_LIMIT: u32 = 30;

/// Steepness of the logistic combiner. Empirical; changing it shifts every
/// reported probability.
pub const LOGISTIC_K: f64 = 10.0;

/// Hard bounds on any reported probability.
pub const PROBABILITY_FLOOR: f64 = 0.05;
pub const PROBABILITY_CEIL: f64 = 0.95;

/// Tracker dead-band, in percentage points.
pub const TREND_DEAD_BAND_PCT: f64 = 0.05;

/// Default tracker poll interval (seconds).
pub const TRACKER_INTERVAL_SECS: u64 = 115;

/// Active-match groups in the order they are preferred.
pub const STATE_PRIORITY: &[&str] = &[
    "ONGOING",
    "READY",
    "CONFIGURING",
    "VOTING",
    "LIVE",
    "STARTED",
    "IN_PROGRESS",
];

/// FACEIT skill level thresholds: elo below `ELO_LEVELS[i]` is level `i + 1`.
pub const ELO_LEVELS: &[i64] = &[500, 750, 900, 1050, 1200, 1350, 1530, 1750, 2000, 2250];

/// Where a probability computation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Child process speaking the marker protocol.
    Process,
    /// Supervised in-process task with a typed result.
    Task,
}

impl Isolation {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(Isolation::Process),
            "task" => Ok(Isolation::Task),
            other => Err(AppError::Config(format!(
                "ISOLATION must be 'process' or 'task', got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Isolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Isolation::Process => write!(f, "process"),
            Isolation::Task => write!(f, "task"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub data_api_url: String,
    pub web_api_url: String,
    pub log_level: String,
    pub api_port: u16,
    /// Per-call budget for every upstream HTTP request (UPSTREAM_TIMEOUT_MS).
    pub upstream_timeout: Duration,
    /// Whole identity + active-match chain (RESOLVE_BUDGET_MS).
    pub resolve_budget: Duration,
    /// Compute worker wall clock (WORKER_TIMEOUT_MS).
    pub worker_timeout: Duration,
    /// Resolve worker wall clock (RESOLVE_WORKER_TIMEOUT_MS).
    pub resolve_worker_timeout: Duration,
    /// Program run as the worker; defaults to this executable (WORKER_PROGRAM).
    pub worker_program: PathBuf,
    /// Working directory for workers (WORKER_DIR).
    pub worker_dir: Option<PathBuf>,
    pub isolation: Isolation,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let worker_program = match std::env::var("WORKER_PROGRAM") {
            Ok(p) if !p.trim().is_empty() => PathBuf::from(p.trim()),
            _ => std::env::current_exe()?,
        };

        let cfg = Self {
            api_key: std::env::var("FACEIT_API_KEY")
                .unwrap_or_default()
                .trim()
                .to_string(),
            data_api_url: std::env::var("FACEIT_DATA_API_URL")
                .unwrap_or_else(|_| FACEIT_DATA_API_URL.to_string()),
            web_api_url: std::env::var("FACEIT_WEB_API_URL")
                .unwrap_or_else(|_| FACEIT_WEB_API_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            upstream_timeout: env_millis("UPSTREAM_TIMEOUT_MS", 12_000)?,
            resolve_budget: env_millis("RESOLVE_BUDGET_MS", 25_000)?,
            worker_timeout: env_millis("WORKER_TIMEOUT_MS", 90_000)?,
            resolve_worker_timeout: env_millis("RESOLVE_WORKER_TIMEOUT_MS", 30_000)?,
            worker_program,
            worker_dir: std::env::var("WORKER_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            isolation: Isolation::parse(
                &std::env::var("ISOLATION").unwrap_or_else(|_| "process".to_string()),
            )?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Upstream budgets must sit strictly inside the budgets that enclose them.
    pub fn validate(&self) -> Result<()> {
        if self.upstream_timeout >= self.resolve_budget {
            return Err(AppError::Config(format!(
                "UPSTREAM_TIMEOUT_MS ({}ms) must be shorter than RESOLVE_BUDGET_MS ({}ms)",
                self.upstream_timeout.as_millis(),
                self.resolve_budget.as_millis(),
            )));
        }
        if self.resolve_budget >= self.resolve_worker_timeout {
            return Err(AppError::Config(format!(
                "RESOLVE_BUDGET_MS ({}ms) must be shorter than RESOLVE_WORKER_TIMEOUT_MS ({}ms)",
                self.resolve_budget.as_millis(),
                self.resolve_worker_timeout.as_millis(),
            )));
        }
        if self.resolve_budget >= self.worker_timeout {
            return Err(AppError::Config(format!(
                "RESOLVE_BUDGET_MS ({}ms) must be shorter than WORKER_TIMEOUT_MS ({}ms)",
                self.resolve_budget.as_millis(),
                self.worker_timeout.as_millis(),
            )));
        }
        Ok(())
    }

    /// The API key is only needed by code that talks to FACEIT directly.
    pub fn require_api_key(&self) -> Result<&str> {
        if self.api_key.is_empty() {
            return Err(AppError::Config("FACEIT_API_KEY is not set".to_string()));
        }
        Ok(&self.api_key)
    }
}

fn env_millis(name: &str, default_ms: u64) -> Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| AppError::Config(format!("{name} must be a whole number of milliseconds"))),
        Err(_) => Ok(Duration::from_millis(default_ms)),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        api_key: "test-key".to_string(),
        data_api_url: "http://127.0.0.1:9".to_string(),
        web_api_url: "http://127.0.0.1:9".to_string(),
        log_level: "debug".to_string(),
        api_port: 0,
        upstream_timeout: Duration::from_millis(500),
        resolve_budget: Duration::from_millis(1_000),
        worker_timeout: Duration::from_millis(3_000),
        resolve_worker_timeout: Duration::from_millis(2_000),
        worker_program: PathBuf::from("sh"),
        worker_dir: None,
        isolation: Isolation::Process,
    }
}
