// src/scheduler.rs
use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::pipeline::Pipeline;
use crate::types::WatchTarget;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
    pub cycle_budget: Duration,
    pub filter_enabled: bool,
    /// Stop after the first cycle.
    pub run_once: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSummary {
    /// Cycles that ran to completion (or to their budget).
    pub cycles: u64,
    pub final_persist_ok: bool,
}

/// Drive the pipeline: one eager cycle, then one per `interval` until
/// `shutdown` resolves. Cycles never overlap; a tick missed while a cycle runs
/// is delayed, not burst. A shutdown during a cycle abandons it. The seen store
/// gets one last persist on the way out, and a failure there is only logged.
pub async fn run_scheduler<F>(
    pipeline: &Pipeline,
    targets: &[WatchTarget],
    cfg: SchedulerCfg,
    shutdown: F,
) -> SchedulerSummary
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    // the first tick completes immediately, which gives the eager run
    let mut ticker = tokio::time::interval(cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut cycles = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            _ = ticker.tick() => {}
        }

        if cycles == 0 {
            info!(targets = targets.len(), "running initial crawl");
        } else {
            info!("running scheduled crawl");
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                warn!("shutdown requested mid-cycle; abandoning in-flight work");
                break;
            }
            _report = pipeline.run_cycle_with_budget(targets, cfg.filter_enabled, cfg.cycle_budget) => {
                cycles += 1;
            }
        }

        if cfg.run_once {
            break;
        }
    }

    let final_persist_ok = match pipeline.seen().persist() {
        Ok(()) => {
            info!(total_seen = pipeline.seen().len(), path = %pipeline.seen().path().display(), "seen store saved");
            true
        }
        Err(e) => {
            error!(error = %e, "failed to save seen store at shutdown");
            false
        }
    };

    SchedulerSummary {
        cycles,
        final_persist_ok,
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
