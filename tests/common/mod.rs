// tests/common/mod.rs
// Shared in-memory doubles for the pipeline tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

use x_market_crawler::analyze::{EvalError, Scorer};
use x_market_crawler::fetch::{FetchError, Fetcher};
use x_market_crawler::notify::{Message, Notifier};
use x_market_crawler::types::{Post, Priority, RelevanceJudgment, WatchTarget};
use x_market_crawler::{Pipeline, SeenStore};

/// Post with a deterministic timestamp `minute` minutes after a fixed epoch.
pub fn post(id: &str, author: &str, minute: u32) -> Post {
    let ts = Utc.with_ymd_and_hms(2025, 3, 4, 14, 0, 0).unwrap() + chrono::Duration::minutes(minute as i64);
    Post::new(id, author, format!("post {id} from {author}")).with_created_at(ts)
}

pub fn account(handle: &str) -> WatchTarget {
    WatchTarget::account(handle, "", Priority::High)
}

pub fn query(q: &str) -> WatchTarget {
    WatchTarget::query(q, "")
}

enum Canned {
    Posts(Vec<Post>),
    Fail(fn() -> FetchError),
    /// Never resolves; for budget tests.
    Hang,
}

/// Fetcher with canned answers keyed by handle or query string.
#[derive(Default)]
pub struct StubFetcher {
    canned: Mutex<HashMap<String, Canned>>,
    pub calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(self, key: &str, posts: Vec<Post>) -> Self {
        self.canned.lock().insert(key.to_string(), Canned::Posts(posts));
        self
    }

    pub fn with_error(self, key: &str, err: fn() -> FetchError) -> Self {
        self.canned.lock().insert(key.to_string(), Canned::Fail(err));
        self
    }

    pub fn hanging(self, key: &str) -> Self {
        self.canned.lock().insert(key.to_string(), Canned::Hang);
        self
    }

    pub fn set_posts(&self, key: &str, posts: Vec<Post>) {
        self.canned.lock().insert(key.to_string(), Canned::Posts(posts));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    async fn answer(&self, key: &str) -> Result<Vec<Post>, FetchError> {
        self.calls.lock().push(key.to_string());
        let reply = match self.canned.lock().get(key) {
            None => Some(Ok(Vec::new())),
            Some(Canned::Posts(p)) => Some(Ok(p.clone())),
            Some(Canned::Fail(f)) => Some(Err(f())),
            Some(Canned::Hang) => None,
        };
        match reply {
            Some(r) => r,
            None => std::future::pending().await,
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for StubFetcher {
    async fn fetch_for_account(&self, handle: &str, _limit: u32) -> Result<Vec<Post>, FetchError> {
        self.answer(handle).await
    }

    async fn fetch_for_query(&self, query: &str, _limit: u32) -> Result<Vec<Post>, FetchError> {
        self.answer(query).await
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Scorer returning a fixed score per post id; ids listed in `failing` error out.
pub struct StubScorer {
    scores: HashMap<String, u8>,
    default_score: u8,
    failing: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
}

impl StubScorer {
    pub fn new(default_score: u8) -> Self {
        Self {
            scores: HashMap::new(),
            default_score,
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn score_for(mut self, id: &str, score: u8) -> Self {
        self.scores.insert(id.to_string(), score);
        self
    }

    pub fn fail_for(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl Scorer for StubScorer {
    async fn score(&self, post: &Post, _context: &str) -> Result<RelevanceJudgment, EvalError> {
        self.calls.lock().push(post.id.clone());
        if self.failing.contains(&post.id) {
            return Err(EvalError::Upstream("stub scorer down".into()));
        }
        Ok(RelevanceJudgment {
            score: *self.scores.get(&post.id).unwrap_or(&self.default_score),
            summary: format!("summary of {}", post.id),
            tickers: vec!["SPY".into()],
            ..Default::default()
        })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Records every message it is handed, with the (tokio) instant it arrived.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(Message, Instant)>>,
    failing: HashSet<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, post_id: &str) -> Self {
        self.failing.insert(post_id.to_string());
        self
    }

    pub fn messages(&self) -> Vec<Message> {
        self.sent.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(m, _)| m.post_id.clone()).collect()
    }

    pub fn gaps(&self) -> Vec<Duration> {
        let sent = self.sent.lock();
        sent.windows(2).map(|w| w[1].1 - w[0].1).collect()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, msg: &Message) -> Result<()> {
        self.sent.lock().push((msg.clone(), Instant::now()));
        if self.failing.contains(&msg.post_id) {
            return Err(anyhow!("webhook returned 500"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub struct Harness {
    pub fetcher: Arc<StubFetcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub pipeline: Pipeline,
}

/// Pipeline over the given doubles with a seen store at `seen_path` and no delay.
pub fn harness(
    fetcher: StubFetcher,
    notifier: RecordingNotifier,
    scorer: Option<Arc<StubScorer>>,
    seen_path: &Path,
) -> Harness {
    let seen = SeenStore::load(seen_path).expect("seen store");
    harness_with_store(fetcher, notifier, scorer, seen)
}

/// Same as `harness`, for stores that cannot be loaded from disk (unwritable paths).
pub fn harness_with_store(
    fetcher: StubFetcher,
    notifier: RecordingNotifier,
    scorer: Option<Arc<StubScorer>>,
    seen: SeenStore,
) -> Harness {
    let fetcher = Arc::new(fetcher);
    let notifier = Arc::new(notifier);
    let pipeline = Pipeline::new(fetcher.clone(), notifier.clone(), seen)
        .with_scorer(scorer.map(|s| s as Arc<dyn Scorer>))
        .with_notify_delay(Duration::ZERO);
    Harness {
        fetcher,
        notifier,
        pipeline,
    }
}
