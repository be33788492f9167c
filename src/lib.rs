// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod config;
pub mod fetch;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod seen;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::analyze::{EvalError, RelevanceFilter, Scorer};
pub use crate::config::AppConfig;
pub use crate::fetch::{FetchError, Fetcher};
pub use crate::notify::{Message, MessageKind, Notifier};
pub use crate::pipeline::{CycleReport, Pipeline, TargetError, TargetErrorKind};
pub use crate::scheduler::{run_scheduler, SchedulerCfg, SchedulerSummary};
pub use crate::seen::{SeenStore, SeenStoreError};
pub use crate::types::{Post, RelevanceJudgment, WatchTarget};
