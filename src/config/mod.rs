// src/config/mod.rs
//! Crawler configuration: TOML file with `${VAR}` expansion, defaults and
//! startup validation. Any error returned from here is fatal at startup.

pub mod ai;

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::types::{Account, Query, WatchTarget};
use ai::AiConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/crawler.toml";
pub const DEFAULT_SEEN_PATH: &str = "seen_tweets.json";
pub const ENV_X_BEARER_TOKEN: &str = "X_API_BEARER_TOKEN";

/// Upper bound for `interval` and `cycle_timeout`.
pub const MAX_PERIOD: Duration = Duration::from_secs(7 * 24 * 3600);

static ENV_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"));
static DURATION_PART_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)(ms|s|m|h)").expect("static regex"));

fn default_interval() -> String {
    "5m".to_string()
}
fn default_cycle_timeout() -> String {
    "5m".to_string()
}
fn default_fetch_limit() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Budget for one full cycle; in-flight work is abandoned after it.
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout: String,
    /// Posts requested per target per cycle.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub queries: Vec<Query>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Slack,
    Discord,
}

impl NotifierKind {
    fn webhook_env(&self) -> &'static str {
        match self {
            NotifierKind::Slack => "SLACK_WEBHOOK_URL",
            NotifierKind::Discord => "DISCORD_WEBHOOK_URL",
        }
    }
}

fn default_username() -> String {
    "X Trading Bot".to_string()
}
fn default_icon_emoji() -> String {
    ":chart_with_upwards_trend:".to_string()
}
fn default_delay_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}
fn default_notify_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub kind: NotifierKind,
    /// Falls back to SLACK_WEBHOOK_URL / DISCORD_WEBHOOK_URL when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_icon_emoji")]
    pub icon_emoji: String,
    /// Pause between successive deliveries within one target.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// When false, a failed delivery leaves the post unseen so the next cycle retries it.
    #[serde(default = "default_true")]
    pub mark_seen_on_failure: bool,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::default(),
            webhook_url: None,
            username: default_username(),
            icon_emoji: default_icon_emoji(),
            delay_ms: default_delay_ms(),
            mark_seen_on_failure: true,
            timeout_secs: default_notify_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// debug, info, warn, error (RUST_LOG takes precedence)
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Read, expand, parse and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("loading config {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let expanded = expand_env(raw);
        let mut cfg: AppConfig = toml::from_str(&expanded).context("parsing config TOML")?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    fn normalize(&mut self) {
        self.ai.normalize();

        for a in self.accounts.iter_mut() {
            a.handle = a.handle.trim().trim_start_matches('@').to_string();
            a.label = a.label.trim().to_string();
        }
        for q in self.queries.iter_mut() {
            q.query = q.query.trim().to_string();
            q.label = q.label.trim().to_string();
        }

        let url = self
            .notify
            .webhook_url
            .take()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .or_else(|| {
                env::var(self.notify.kind.webhook_env())
                    .ok()
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty())
            });
        self.notify.webhook_url = url;
    }

    fn validate(&self) -> Result<()> {
        let interval = self.interval()?;
        if interval.is_zero() {
            bail!("interval must be greater than zero");
        }
        if interval > MAX_PERIOD {
            bail!("interval must be at most {}s (got {}s)", MAX_PERIOD.as_secs(), interval.as_secs());
        }
        let cycle_timeout = self.cycle_timeout()?;
        if cycle_timeout.is_zero() {
            bail!("cycle_timeout must be greater than zero");
        }
        if cycle_timeout > MAX_PERIOD {
            bail!(
                "cycle_timeout must be at most {}s (got {}s)",
                MAX_PERIOD.as_secs(),
                cycle_timeout.as_secs()
            );
        }
        if self.ai.min_score > 100 {
            bail!("ai.min_score must be within 0..=100 (got {})", self.ai.min_score);
        }
        if self.fetch_limit == 0 {
            bail!("fetch_limit must be at least 1");
        }
        if self.notify.webhook_url.is_none() {
            bail!(
                "{} is required (notify.webhook_url or environment variable)",
                self.notify.kind.webhook_env()
            );
        }
        if let Some(a) = self.accounts.iter().find(|a| a.handle.is_empty()) {
            bail!("account with label {:?} has an empty handle", a.label);
        }
        if let Some(q) = self.queries.iter().find(|q| q.query.is_empty()) {
            bail!("query with label {:?} has an empty expression", q.label);
        }
        Ok(())
    }

    pub fn interval(&self) -> Result<Duration> {
        parse_duration(&self.interval).context("invalid interval")
    }

    pub fn cycle_timeout(&self) -> Result<Duration> {
        parse_duration(&self.cycle_timeout).context("invalid cycle_timeout")
    }

    pub fn notify_delay(&self) -> Duration {
        Duration::from_millis(self.notify.delay_ms)
    }

    /// Accounts first, then queries, each in file order.
    pub fn targets(&self) -> Vec<WatchTarget> {
        self.accounts
            .iter()
            .cloned()
            .map(WatchTarget::Account)
            .chain(self.queries.iter().cloned().map(WatchTarget::Query))
            .collect()
    }
}

/// Bearer token for the X API; required.
pub fn x_bearer_token() -> Result<String> {
    env::var(ENV_X_BEARER_TOKEN)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| anyhow!("{ENV_X_BEARER_TOKEN} environment variable is required"))
}

/// Replace `${VAR}` with the variable's value (empty when unset).
/// Bare `$VAR` is left alone so cashtags like `$TSLA` in queries survive.
pub fn expand_env(raw: &str) -> String {
    ENV_REF_RE
        .replace_all(raw, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Parse Go-style durations: `250ms`, `90s`, `5m`, `1h30m`, `1.5h`.
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("empty duration");
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = 0f64;
    let mut pos = 0usize;
    for caps in DURATION_PART_RE.captures_iter(s) {
        let m = caps.get(0).ok_or_else(|| anyhow!("bad duration {s:?}"))?;
        if m.start() != pos {
            bail!("bad duration {s:?}");
        }
        pos = m.end();
        let n: f64 = caps[1].parse().with_context(|| format!("bad duration {s:?}"))?;
        total += match &caps[2] {
            "ms" => n / 1000.0,
            "s" => n,
            "m" => n * 60.0,
            _ => n * 3600.0,
        };
    }
    if pos != s.len() {
        bail!("bad duration {s:?}");
    }
    match Duration::try_from_secs_f64(total) {
        Ok(d) => Ok(d),
        Err(e) => bail!("bad duration {s:?}: {e}"),
    }
}
