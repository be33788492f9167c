//! X market crawler: binary entrypoint.
//! Loads config and the seen store, wires fetcher, scorer and notifier into
//! the pipeline, then runs the scheduler until Ctrl+C / SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use x_market_crawler::analyze::{build_provider_from_config, RelevanceFilter, Scorer};
use x_market_crawler::config::{self, AppConfig, LogConfig, LogFormat};
use x_market_crawler::fetch::x_api::XApiClient;
use x_market_crawler::notify::build_notifier;
use x_market_crawler::scheduler::{run_scheduler, shutdown_signal, SchedulerCfg};
use x_market_crawler::{metrics, Pipeline, SeenStore};

#[derive(Parser, Debug)]
#[command(name = "x-market-crawler", version, about = "Watch X accounts and searches, score posts and alert a chat webhook")]
struct Cli {
    /// Path to the TOML config.
    #[arg(long, short, env = "CRAWLER_CONFIG", default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Path to the seen-ids JSON file.
    #[arg(long, env = "CRAWLER_SEEN_PATH", default_value = config::DEFAULT_SEEN_PATH)]
    seen: PathBuf,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9100).
    #[arg(long, env = "CRAWLER_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("x_market_crawler={},warn", log.level)));

    let registry = tracing_subscriber::registry().with(filter);
    match log.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer().compact()).init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let cfg = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&cfg.log);

    match run(cli, cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, cfg: AppConfig) -> Result<()> {
    let token = config::x_bearer_token()?;
    let interval = cfg.interval()?;
    let cycle_budget = cfg.cycle_timeout()?;

    let seen = SeenStore::load(&cli.seen).context("loading seen store")?;
    info!(path = %cli.seen.display(), loaded = seen.len(), "seen store ready");

    let fetcher = Arc::new(XApiClient::new(token).context("building X API client")?);
    let notifier = build_notifier(&cfg.notify)?;

    let scorer: Option<Arc<dyn Scorer>> = if cfg.ai.enabled {
        build_provider_from_config(&cfg.ai)
            .map(|p| Arc::new(RelevanceFilter::new(p)) as Arc<dyn Scorer>)
    } else {
        None
    };
    let filter_enabled = scorer.is_some();
    if cfg.ai.enabled && !filter_enabled {
        warn!("AI filtering is enabled in config but no provider is available; sending every new post");
    }

    if let Some(addr) = cli.metrics_addr {
        metrics::install_exporter(addr)?;
        info!(%addr, "metrics exporter listening");
    }

    let pipeline = Pipeline::new(fetcher, notifier, seen)
        .with_scorer(scorer)
        .with_min_score(cfg.ai.min_score)
        .with_fetch_limit(cfg.fetch_limit)
        .with_notify_delay(cfg.notify_delay())
        .with_mark_seen_on_failure(cfg.notify.mark_seen_on_failure);

    let targets = cfg.targets();
    info!(
        accounts = cfg.accounts.len(),
        queries = cfg.queries.len(),
        interval_secs = interval.as_secs(),
        filter = filter_enabled,
        min_score = cfg.ai.min_score,
        notifier = ?cfg.notify.kind,
        "crawler starting"
    );

    let sched = SchedulerCfg {
        interval,
        cycle_budget,
        filter_enabled,
        run_once: cli.once,
    };
    let summary = run_scheduler(&pipeline, &targets, sched, shutdown_signal()).await;
    info!(cycles = summary.cycles, saved = summary.final_persist_ok, "crawler stopped");
    Ok(())
}
