// src/fetch/mod.rs
pub mod x_api;

use thiserror::Error;

use crate::types::Post;

/// Upstream failure classes. The pipeline treats them all the same way
/// (log, skip the target for this cycle); the class only feeds logs and metrics.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited (reset at {reset_at:?})")]
    RateLimited { reset_at: Option<i64> },
    #[error("unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::RateLimited { .. } => "rate_limited",
            FetchError::Unauthorized { .. } => "unauthorized",
            FetchError::NotFound(_) => "not_found",
            FetchError::Upstream { .. } => "upstream",
            FetchError::Transport(_) => "transport",
            FetchError::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

/// Source of raw posts for accounts and search queries.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_for_account(&self, handle: &str, limit: u32) -> Result<Vec<Post>, FetchError>;
    async fn fetch_for_query(&self, query: &str, limit: u32) -> Result<Vec<Post>, FetchError>;
    fn name(&self) -> &'static str;
}
