// src/analyze/mod.rs
//! Relevance scoring: the `Scorer` seam used by the pipeline, the LLM provider
//! abstraction behind it, and the filter that turns model output into judgments.

pub mod ai_adapter;
pub mod relevance;

use thiserror::Error;

use crate::types::{Post, RelevanceJudgment};

pub use ai_adapter::{build_provider_from_config, ClaudeProvider, DynProvider, MockProvider, Provider};
pub use relevance::RelevanceFilter;

/// Both variants are non-fatal for the pipeline: the post falls back to a plain notification.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The model answered, but not with a judgment we can parse.
    #[error("malformed scoring response: {0}")]
    ResponseFormat(String),
    /// Transport, auth or non-2xx status from the scoring API.
    #[error("scoring upstream error: {0}")]
    Upstream(String),
}

impl EvalError {
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::ResponseFormat(_) => "response_format",
            EvalError::Upstream(_) => "upstream",
        }
    }
}

/// Produces a raw relevance judgment for a post. No threshold logic here;
/// the pipeline compares `score` against its configured minimum.
#[async_trait::async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, post: &Post, context: &str) -> Result<RelevanceJudgment, EvalError>;
    fn name(&self) -> &'static str;
}
