//! AI adapter: completion provider abstraction + Anthropic implementation + mock.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::EvalError;
use crate::config::ai::AiConfig;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Low-level provider: sends one prompt, returns the model's raw text.
/// Parsing lives in `RelevanceFilter` so every provider shares it.
pub trait Provider: Send + Sync + 'static {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, EvalError>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

pub type DynProvider = Arc<dyn Provider>;

/// Factory: build a provider according to config and environment variables.
///
/// * `AI_TEST_MODE=mock` returns a deterministic mock provider.
/// * Disabled config, unknown provider or a missing API key yields `None`
///   (the pipeline then sends plain notifications).
pub fn build_provider_from_config(config: &AiConfig) -> Option<DynProvider> {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Some(Arc::new(MockProvider::neutral()));
    }

    if !config.enabled {
        return None;
    }

    match config.provider.as_str() {
        "claude" | "anthropic" => {
            let Some(key) = config.resolve_api_key() else {
                warn!("AI filter is enabled but no API key is set; scoring will be skipped");
                return None;
            };
            match ClaudeProvider::new(key, &config.model, config.timeout_secs) {
                Ok(p) => Some(Arc::new(p)),
                Err(e) => {
                    warn!(error = %e, "could not build Claude provider; scoring will be skipped");
                    None
                }
            }
        }
        other => {
            warn!(provider = other, "unsupported AI provider; scoring will be skipped");
            None
        }
    }
}

// ------------------------------------------------------------
// Anthropic Messages API
// ------------------------------------------------------------

pub struct ClaudeProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: &str, timeout_secs: u64) -> Result<Self, EvalError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("x-market-crawler/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| EvalError::Upstream(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            model: model.to_string(),
            base_url: ANTHROPIC_API_URL.to_string(),
            max_tokens: 2048,
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn complete_impl(&self, prompt: &str) -> Result<String, EvalError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            messages: Vec<Msg<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            content: Vec<Block>,
        }
        #[derive(Deserialize)]
        struct Block {
            #[serde(default)]
            text: Option<String>,
        }

        let req = Req {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: 0.2,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
        };

        debug!(model = %self.model, "Claude scoring request");

        let resp = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&req)
            .send()
            .await
            .map_err(|e| EvalError::Upstream(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EvalError::Upstream(format!("Claude API error ({status}): {body}")));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| EvalError::ResponseFormat(e.to_string()))?;

        body.content
            .into_iter()
            .find_map(|b| b.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| EvalError::ResponseFormat("empty response from Claude API".to_string()))
    }
}

impl Provider for ClaudeProvider {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, EvalError>> + Send + 'a>> {
        Box::pin(self.complete_impl(prompt))
    }
    fn name(&self) -> &'static str {
        "claude"
    }
}

// ------------------------------------------------------------
// Mock provider
// ------------------------------------------------------------

/// Replies with a fixed text (or a fixed upstream failure). Used for local
/// runs via `AI_TEST_MODE=mock` and in tests.
#[derive(Clone)]
pub struct MockProvider {
    reply: Result<String, String>,
}

impl MockProvider {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
        }
    }

    /// A mid-range judgment, enough to exercise the rich notification path.
    pub fn neutral() -> Self {
        Self::replying(
            r#"{"score": 75, "category": "market_news", "sentiment": "neutral", "tickers": [],
"summary": "Mock judgment", "key_points": [], "urgency": "normal", "reasoning": "mock"}"#,
        )
    }
}

impl Provider for MockProvider {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, EvalError>> + Send + 'a>> {
        let out = self.reply.clone().map_err(EvalError::Upstream);
        Box::pin(async move { out })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}
