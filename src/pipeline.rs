// src/pipeline.rs
//! # Dedup and notification pipeline
//!
//! Per watch target: fetch → dedup → optional scoring → threshold → compose →
//! deliver → mark seen. Every new post ends with its id in the seen store
//! (unless `mark_seen_on_failure` is off and delivery failed); posts already
//! in the store are skipped without any collaborator call.
//!
//! Failures are contained: a fetch error skips one target, a scoring error
//! downgrades to a plain notification, a delivery error is logged. Nothing is
//! retried within a cycle. The store is persisted once at the end of every
//! cycle, whatever happened before.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::analyze::Scorer;
pub use crate::config::ai::DEFAULT_MIN_SCORE;
use crate::fetch::{FetchError, Fetcher};
use crate::notify::{compose_plain, compose_rich, Message, MessageKind, Notifier};
use crate::seen::SeenStore;
use crate::types::{Post, WatchTarget};

pub const DEFAULT_NOTIFY_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_FETCH_LIMIT: u32 = 10;

/// Terminal state of one fetched post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// Already in the seen store.
    Skipped,
    /// Scored below the minimum; marked seen, not notified.
    Filtered { score: u8 },
    Delivered { rich: bool },
    DeliveryFailed { rich: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetErrorKind {
    Fetch(String),
    /// The cycle budget ran out while this target was in flight.
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetError {
    pub target: String,
    pub kind: TargetErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// New (previously unseen) posts handled this cycle.
    pub processed: usize,
    /// Successful deliveries.
    pub notified: usize,
    pub filtered_out: usize,
    pub delivery_failures: usize,
    /// Posts whose scoring failed and fell back to a plain message.
    pub eval_fallbacks: usize,
    pub target_errors: Vec<TargetError>,
    /// False when the end-of-cycle persist failed.
    pub persisted: bool,
    pub timed_out: bool,
}

impl CycleReport {
    fn record(&mut self, outcome: PostOutcome) {
        match outcome {
            PostOutcome::Skipped => {}
            PostOutcome::Filtered { .. } => {
                self.processed += 1;
                self.filtered_out += 1;
            }
            PostOutcome::Delivered { .. } => {
                self.processed += 1;
                self.notified += 1;
            }
            PostOutcome::DeliveryFailed { .. } => {
                self.processed += 1;
                self.delivery_failures += 1;
            }
        }
    }
}

/// Owns the seen store; nothing else mutates it.
pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    scorer: Option<Arc<dyn Scorer>>,
    notifier: Arc<dyn Notifier>,
    seen: SeenStore,
    min_score: u8,
    fetch_limit: u32,
    notify_delay: Duration,
    mark_seen_on_failure: bool,
}

impl Pipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, notifier: Arc<dyn Notifier>, seen: SeenStore) -> Self {
        Self {
            fetcher,
            scorer: None,
            notifier,
            seen,
            min_score: DEFAULT_MIN_SCORE,
            fetch_limit: DEFAULT_FETCH_LIMIT,
            notify_delay: DEFAULT_NOTIFY_DELAY,
            mark_seen_on_failure: true,
        }
    }

    pub fn with_scorer(mut self, scorer: Option<Arc<dyn Scorer>>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_min_score(mut self, min_score: u8) -> Self {
        self.min_score = min_score.min(100);
        self
    }

    pub fn with_fetch_limit(mut self, limit: u32) -> Self {
        self.fetch_limit = limit.max(1);
        self
    }

    pub fn with_notify_delay(mut self, delay: Duration) -> Self {
        self.notify_delay = delay;
        self
    }

    pub fn with_mark_seen_on_failure(mut self, on: bool) -> Self {
        self.mark_seen_on_failure = on;
        self
    }

    pub fn seen(&self) -> &SeenStore {
        &self.seen
    }

    /// Whether a scorer is wired in (filtering can only happen if so).
    pub fn has_scorer(&self) -> bool {
        self.scorer.is_some()
    }

    /// One full pass over `targets` with no time budget.
    pub async fn run_cycle(&self, targets: &[WatchTarget], filter_enabled: bool) -> CycleReport {
        self.run_cycle_until(targets, filter_enabled, None).await
    }

    /// One full pass bounded by `budget`. When it expires the in-flight target
    /// is abandoned, the rest are skipped, and whatever was already marked
    /// seen stands. The persist still runs.
    pub async fn run_cycle_with_budget(
        &self,
        targets: &[WatchTarget],
        filter_enabled: bool,
        budget: Duration,
    ) -> CycleReport {
        // a budget too large to represent is no budget at all
        let deadline = Instant::now().checked_add(budget);
        self.run_cycle_until(targets, filter_enabled, deadline).await
    }

    async fn run_cycle_until(
        &self,
        targets: &[WatchTarget],
        filter_enabled: bool,
        deadline: Option<Instant>,
    ) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        if filter_enabled && self.scorer.is_none() {
            debug!("filtering requested but no scorer is available; sending plain notifications");
        }

        for target in targets {
            let result = match deadline {
                Some(d) => {
                    let bounded = tokio::time::timeout_at(
                        d,
                        self.process_target(target, filter_enabled, &mut report),
                    )
                    .await;
                    match bounded {
                        Ok(r) => r,
                        Err(_) => {
                            warn!(watch = %target, "cycle budget exhausted; abandoning remaining targets");
                            report.timed_out = true;
                            report.target_errors.push(TargetError {
                                target: target.to_string(),
                                kind: TargetErrorKind::Timeout,
                                message: "cycle budget exhausted".to_string(),
                            });
                            break;
                        }
                    }
                }
                None => self.process_target(target, filter_enabled, &mut report).await,
            };

            if let Err(e) = result {
                error!(watch = %target, target_kind = target.kind(), kind = e.kind(), error = %e, "fetch failed; skipping target this cycle");
                counter!("crawler_fetch_errors_total", "kind" => e.kind()).increment(1);
                report.target_errors.push(TargetError {
                    target: target.to_string(),
                    kind: TargetErrorKind::Fetch(e.kind().to_string()),
                    message: e.to_string(),
                });
            }
        }

        report.persisted = match self.seen.persist() {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "failed to persist seen store; keeping in-memory state");
                counter!("crawler_persist_errors_total").increment(1);
                false
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        counter!("crawler_cycles_total").increment(1);
        histogram!("crawler_cycle_duration_ms").record(elapsed_ms);
        gauge!("crawler_seen_ids").set(self.seen.len() as f64);
        gauge!("crawler_last_cycle_ts").set(chrono::Utc::now().timestamp() as f64);

        info!(
            processed = report.processed,
            notified = report.notified,
            filtered = report.filtered_out,
            delivery_failures = report.delivery_failures,
            target_errors = report.target_errors.len(),
            total_seen = self.seen.len(),
            "crawl complete"
        );

        report
    }

    async fn fetch(&self, target: &WatchTarget) -> Result<Vec<Post>, FetchError> {
        match target {
            WatchTarget::Account(a) => self.fetcher.fetch_for_account(&a.handle, self.fetch_limit).await,
            WatchTarget::Query(q) => self.fetcher.fetch_for_query(&q.query, self.fetch_limit).await,
        }
    }

    async fn process_target(
        &self,
        target: &WatchTarget,
        filter_enabled: bool,
        report: &mut CycleReport,
    ) -> Result<(), FetchError> {
        let mut posts = self.fetch(target).await?;
        // oldest first so alerts arrive in posting order
        posts.sort_by_key(|p| p.created_at);

        let source = target.source_tag();
        let context = target.context_label();
        let scorer = if filter_enabled { self.scorer.as_deref() } else { None };
        let mut delivered_once = false;

        debug!(watch = %target, fetched = posts.len(), "fetched posts");

        for mut post in posts {
            if self.seen.contains(&post.id) {
                report.record(PostOutcome::Skipped);
                continue;
            }
            post.source = source.clone();
            counter!("crawler_posts_processed_total").increment(1);

            let message = match scorer {
                None => compose_plain(&post, &context),
                Some(s) => match s.score(&post, &context).await {
                    Err(e) => {
                        warn!(post_id = %post.id, kind = e.kind(), error = %e, "scoring failed; falling back to plain notification");
                        counter!("crawler_eval_errors_total").increment(1);
                        report.eval_fallbacks += 1;
                        compose_plain(&post, &context)
                    }
                    Ok(j) if j.score < self.min_score => {
                        info!(post_id = %post.id, source = %post.source, score = j.score, min_score = self.min_score, "score below minimum; not notifying");
                        counter!("crawler_posts_filtered_total").increment(1);
                        self.seen.mark_seen(&post.id);
                        report.record(PostOutcome::Filtered { score: j.score });
                        continue;
                    }
                    Ok(j) => compose_rich(&post, &j),
                },
            };

            if delivered_once && !self.notify_delay.is_zero() {
                tokio::time::sleep(self.notify_delay).await;
            }
            delivered_once = true;

            let outcome = self.deliver(&post, &message).await;
            report.record(outcome);
        }

        Ok(())
    }

    async fn deliver(&self, post: &Post, message: &Message) -> PostOutcome {
        let rich = message.kind == MessageKind::Rich;
        match self.notifier.send(message).await {
            Ok(()) => {
                self.seen.mark_seen(&post.id);
                counter!("crawler_posts_notified_total").increment(1);
                info!(post_id = %post.id, author = %post.author, source = %post.source, rich, "notified");
                PostOutcome::Delivered { rich }
            }
            Err(e) => {
                counter!("crawler_delivery_errors_total").increment(1);
                if self.mark_seen_on_failure {
                    self.seen.mark_seen(&post.id);
                }
                error!(
                    post_id = %post.id,
                    notifier = self.notifier.name(),
                    marked_seen = self.mark_seen_on_failure,
                    error = %format!("{e:#}"),
                    "delivery failed"
                );
                PostOutcome::DeliveryFailed { rich }
            }
        }
    }
}
