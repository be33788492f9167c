// src/types.rs
//! Shared data model: posts, watch targets and relevance judgments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A single post as returned by the fetcher. `id` is the only dedup key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub author: String, // handle without '@'
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Which watch target produced the post (set by the pipeline).
    #[serde(default)]
    pub source: String,
}

impl Post {
    pub fn new(id: impl Into<String>, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            text: text.into(),
            created_at: Utc::now(),
            source: String::new(),
        }
    }

    pub fn with_created_at(mut self, ts: DateTime<Utc>) -> Self {
        self.created_at = ts;
        self
    }

    /// Permalink on x.com.
    pub fn url(&self) -> String {
        let author = if self.author.is_empty() {
            "i"
        } else {
            self.author.as_str()
        };
        format!("https://x.com/{}/status/{}", author, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Low,
    #[default]
    #[serde(other)]
    Normal,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub handle: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub query: String,
    #[serde(default)]
    pub label: String,
}

/// A configured source to poll. The pipeline dispatches on the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    Account(Account),
    Query(Query),
}

impl WatchTarget {
    pub fn account(handle: &str, label: &str, priority: Priority) -> Self {
        WatchTarget::Account(Account {
            handle: handle.to_string(),
            label: label.to_string(),
            priority,
        })
    }

    pub fn query(query: &str, label: &str) -> Self {
        WatchTarget::Query(Query {
            query: query.to_string(),
            label: label.to_string(),
        })
    }

    /// Short identifier used in logs and as the post source tag.
    pub fn source_tag(&self) -> String {
        match self {
            WatchTarget::Account(a) => format!("@{}", a.handle),
            WatchTarget::Query(q) => format!("query:{}", q.query),
        }
    }

    /// Free-text context handed to the scorer and shown in plain notifications.
    pub fn context_label(&self) -> String {
        match self {
            WatchTarget::Account(a) => {
                let name = if a.label.is_empty() { &a.handle } else { &a.label };
                format!("{} (Priority: {})", name, a.priority)
            }
            WatchTarget::Query(q) => {
                let name = if q.label.is_empty() { &q.query } else { &q.label };
                format!("Keyword: {name}")
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WatchTarget::Account(_) => "account",
            WatchTarget::Query(_) => "query",
        }
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source_tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    BuySignal,
    SellSignal,
    EarningsBeat,
    EarningsMiss,
    SecFiling,
    MergerAcquisition,
    AnalystUpgrade,
    AnalystDowngrade,
    MarketNews,
    ExecutiveTrade,
    #[default]
    #[serde(other)]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::BuySignal => "buy_signal",
            Category::SellSignal => "sell_signal",
            Category::EarningsBeat => "earnings_beat",
            Category::EarningsMiss => "earnings_miss",
            Category::SecFiling => "sec_filing",
            Category::MergerAcquisition => "merger_acquisition",
            Category::AnalystUpgrade => "analyst_upgrade",
            Category::AnalystDowngrade => "analyst_downgrade",
            Category::MarketNews => "market_news",
            Category::ExecutiveTrade => "executive_trade",
            Category::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Critical,
    High,
    #[default]
    Normal,
    Low,
    /// Anything the model made up; rendered like `Normal`.
    #[serde(other)]
    Unrecognized,
}

/// Structured output of the scoring step. Only `score` gates delivery.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelevanceJudgment {
    #[serde(deserialize_with = "deserialize_score")]
    pub score: u8,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub reasoning: String,
}

/// Accepts integers, floats and numeric strings; clamps into 0..=100.
fn deserialize_score<'de, D>(de: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw = serde_json::Value::deserialize(de)?;
    let n = match &raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| D::Error::custom(format!("score is not numeric: {raw}")))?;

    if !n.is_finite() {
        return Err(D::Error::custom("score is not finite"));
    }
    Ok(n.round().clamp(0.0, 100.0) as u8)
}
