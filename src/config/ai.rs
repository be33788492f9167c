// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_MIN_SCORE: u8 = 70;

fn default_provider() -> String {
    "claude".to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_min_score() -> u8 {
    DEFAULT_MIN_SCORE
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "claude" (case-insensitive); "anthropic" is accepted as an alias
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Inclusive: a judgment scoring exactly `min_score` is delivered.
    #[serde(default = "default_min_score")]
    pub min_score: u8,
    /// "ENV" means: read from ANTHROPIC_API_KEY (or CLAUDE_API_KEY)
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: default_model(),
            min_score: default_min_score(),
            api_key: default_api_key(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AiConfig {
    /// Normalize provider casing and sanitize the model name.
    pub fn normalize(&mut self) {
        self.provider = self.provider.trim().to_lowercase();
        if self.model.trim().is_empty() {
            self.model = default_model();
        }
    }

    /// Resolve the API key. A missing key is not an error here: the caller
    /// downgrades to plain notifications.
    pub fn resolve_api_key(&self) -> Option<String> {
        let raw = self.api_key.trim();
        let key = if raw.is_empty() || raw.eq_ignore_ascii_case("env") {
            env::var("ANTHROPIC_API_KEY")
                .or_else(|_| env::var("CLAUDE_API_KEY"))
                .ok()?
        } else {
            raw.to_string()
        };
        let key = key.trim().to_string();
        (!key.is_empty()).then_some(key)
    }
}
