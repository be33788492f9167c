// src/analyze/relevance.rs
//! Relevance filter: prompt construction, JSON extraction from model output,
//! and judgment hygiene (score clamp, ticker cleanup).

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::ai_adapter::DynProvider;
use super::{EvalError, Scorer};
use crate::types::{Post, RelevanceJudgment};

static TICKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9]{0,5}(\.[A-Z]{1,2})?$").expect("static regex"));

const MAX_KEY_POINTS: usize = 5;

/// Stateless wrapper around a completion provider.
pub struct RelevanceFilter {
    provider: DynProvider,
}

impl RelevanceFilter {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }

    pub async fn evaluate(&self, post: &Post, context: &str) -> Result<RelevanceJudgment, EvalError> {
        let prompt = build_prompt(post, context);
        let raw = self.provider.complete(&prompt).await?;
        let judgment = parse_judgment(&raw)?;
        debug!(
            post_id = %post.id,
            score = judgment.score,
            category = judgment.category.as_str(),
            provider = self.provider.name(),
            "post scored"
        );
        Ok(judgment)
    }
}

#[async_trait::async_trait]
impl Scorer for RelevanceFilter {
    async fn score(&self, post: &Post, context: &str) -> Result<RelevanceJudgment, EvalError> {
        self.evaluate(post, context).await
    }

    fn name(&self) -> &'static str {
        self.provider.name()
    }
}

pub fn build_prompt(post: &Post, context: &str) -> String {
    format!(
        r#"You are an experienced financial analyst. Analyze the following post from X.

Author: @{author}
Author context: {context}
Posted at: {ts}
Content:
{text}

Return JSON only, in exactly this shape:
{{
  "score": 0-100,
  "category": "buy_signal|sell_signal|earnings_beat|earnings_miss|sec_filing|merger_acquisition|analyst_upgrade|analyst_downgrade|market_news|executive_trade|other",
  "sentiment": "bullish|bearish|neutral",
  "tickers": ["AAPL", "TSLA"],
  "summary": "one or two line summary",
  "key_points": ["point 1", "point 2"],
  "urgency": "critical|high|normal|low",
  "reasoning": "why this score"
}}

Scoring criteria:
1. Credibility and reach of the author
2. Specificity (numbers, ticker symbols, price targets)
3. Timeliness (breaking news scores higher)
4. Actionability (can a trade decision be made from it right away)
5. Primary sourcing (first-hand information)

High scores (80-100): earnings flashes, SEC filing alerts, trades disclosed by well-known investors, M&A announcements, large block trades.
Medium scores (60-79): analyst notes, market commentary, sector news.
Low scores (0-59): generic market chatter, personal opinion, already-known information."#,
        author = post.author,
        context = context,
        ts = post.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        text = post.text,
    )
}

/// Pull the JSON object out of a model reply: a fenced ```json block if
/// present, otherwise the span from the first '{' to the last '}'.
pub fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => text.trim(),
    }
}

pub fn parse_judgment(raw: &str) -> Result<RelevanceJudgment, EvalError> {
    let json = extract_json(raw);
    let mut j: RelevanceJudgment = serde_json::from_str(json).map_err(|e| {
        EvalError::ResponseFormat(format!("{e} (response: {})", truncate(json, 200)))
    })?;
    j.tickers = clean_tickers(&j.tickers);
    j.key_points.retain(|p| !p.trim().is_empty());
    j.key_points.truncate(MAX_KEY_POINTS);
    j.summary = j.summary.trim().to_string();
    Ok(j)
}

/// Upper-case, strip `$`, drop duplicates and anything that is not a plausible symbol.
fn clean_tickers(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for t in raw {
        let sym = t.trim().trim_start_matches('$').to_ascii_uppercase();
        if TICKER_RE.is_match(&sym) && !out.contains(&sym) {
            out.push(sym);
        }
    }
    out
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
