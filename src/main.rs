mod api;
mod compute;
mod config;
mod error;
mod faceit;
mod orchestrator;
mod resolver;
mod scorer;
mod stats;
mod tracker;
mod types;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState};
use crate::compute::ComputeRequest;
use crate::config::{Config, TRACKER_INTERVAL_SECS};
use crate::error::Result;
use crate::faceit::aliases::{validate_alias_table, STAT_ALIASES};
use crate::orchestrator::Orchestrator;
use crate::tracker::Tracker;

#[derive(Parser)]
#[command(name = "winprob", version, about = "FACEIT CS2 live win-probability service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Resolve a player's active match and print the result marker line
    Resolve { nickname: String },
    /// Compute the win probability for a player's match and print the result marker line
    Compute {
        nickname: String,
        /// Use this match instead of resolving the active one
        #[arg(long)]
        match_id: Option<String>,
        /// The match id came from an earlier `resolve` run
        #[arg(long, requires = "match_id")]
        resolved: bool,
    },
    /// Poll a running API and report how the probability moves
    Track {
        nickname: String,
        /// Defaults to the local server on API_PORT
        #[arg(long)]
        api_url: Option<String>,
        #[arg(long, default_value_t = TRACKER_INTERVAL_SECS)]
        interval_secs: u64,
        /// Take a single sample and exit
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the environment may be set directly.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    // Workers keep stdout for the marker line.
    let is_worker = matches!(cli.command, Some(Command::Resolve { .. } | Command::Compute { .. }));
    let subscriber = tracing_subscriber::fmt().with_env_filter(EnvFilter::new(&cfg.log_level));
    if is_worker {
        subscriber.with_writer(std::io::stderr).init();
    } else {
        subscriber.init();
    }

    if let Err(e) = validate_alias_table(STAT_ALIASES) {
        error!("Invalid stat alias table: {e}");
        std::process::exit(1);
    }

    let code = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => match serve(cfg).await {
            Ok(()) => 0,
            Err(e) => {
                error!("Fatal error: {e}");
                1
            }
        },
        Command::Resolve { nickname } => worker::run_resolve(&cfg, &nickname).await,
        Command::Compute { nickname, match_id, resolved } => {
            worker::run_compute(&cfg, ComputeRequest { nickname, match_id, resolved }).await
        }
        Command::Track { nickname, api_url, interval_secs, once } => {
            let api_url = api_url.unwrap_or_else(|| format!("http://127.0.0.1:{}", cfg.api_port));
            match track(&cfg, &api_url, &nickname, interval_secs, once).await {
                Ok(()) => 0,
                Err(e) => {
                    error!("Tracker error: {e}");
                    1
                }
            }
        }
    };
    std::process::exit(code);
}

async fn serve(cfg: Config) -> Result<()> {
    if cfg.api_key.is_empty() {
        warn!("FACEIT_API_KEY not set, every computation will fail upstream");
    }
    let cfg = Arc::new(cfg);
    let health = Arc::new(HealthState::new());
    let orchestrator = Orchestrator::from_config(Arc::clone(&cfg), Arc::clone(&health))?;
    info!(
        isolation = %cfg.isolation,
        worker = %cfg.worker_program.display(),
        worker_timeout_ms = cfg.worker_timeout.as_millis() as u64,
        upstream_timeout_ms = cfg.upstream_timeout.as_millis() as u64,
        "orchestrator ready"
    );

    let app = router(ApiState { orchestrator, health });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn track(cfg: &Config, api_url: &str, nickname: &str, interval_secs: u64, once: bool) -> Result<()> {
    // One poll may run a resolve worker and then a compute worker.
    let request_timeout = cfg.resolve_worker_timeout + cfg.worker_timeout + Duration::from_secs(5);
    let tracker = Tracker::new(api_url, nickname, Duration::from_secs(interval_secs.max(1)), request_timeout)?;
    info!(nickname, api_url, interval_secs, "tracking win probability");
    let session = tracker.run(once.then_some(1)).await;
    if let Some(last) = session.previous() {
        println!("{}", serde_json::to_string(last)?);
    }
    Ok(())
}
