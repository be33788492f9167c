// src/notify/mod.rs
//! Outbound messages: a chat-agnostic `Message` model, the composer that
//! builds it, and webhook senders that render it for Slack or Discord.

pub mod compose;
pub mod discord;
pub mod slack;

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use crate::config::{NotifierKind, NotifyConfig};

pub use compose::{compose_plain, compose_rich};
pub use discord::DiscordNotifier;
pub use slack::SlackNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Built from a relevance judgment.
    Rich,
    /// Author, body and link only.
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Links(Vec<Link>),
    Bullets(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageField {
    pub title: String,
    pub value: FieldValue,
    /// Renders side by side with the neighbouring short field where supported.
    pub short: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub label: String,
    pub url: String,
    pub primary: bool,
}

/// What the composer produces and a notifier delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub post_id: String,
    pub author: String,
    pub title: Option<String>,
    pub text: String,
    /// Context line (plain messages): which watch target produced the post.
    pub context: Option<String>,
    /// Hex colour, e.g. "#FF0000".
    pub color: Option<&'static str>,
    pub fields: Vec<MessageField>,
    pub actions: Vec<Action>,
    pub timestamp: DateTime<Utc>,
}

/// Webhook delivery. One attempt per call; the pipeline never retries.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, msg: &Message) -> Result<()>;
    fn name(&self) -> &'static str;
}

pub type DynNotifier = Arc<dyn Notifier>;

/// Build the configured webhook notifier. The URL must already be resolved.
pub fn build_notifier(cfg: &NotifyConfig) -> Result<DynNotifier> {
    let Some(url) = cfg.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) else {
        bail!("notify.webhook_url is not set");
    };
    let notifier: DynNotifier = match cfg.kind {
        NotifierKind::Slack => Arc::new(
            SlackNotifier::new(url.to_string())
                .with_username(&cfg.username)
                .with_icon_emoji(&cfg.icon_emoji)
                .with_timeout(cfg.timeout_secs),
        ),
        NotifierKind::Discord => Arc::new(
            DiscordNotifier::new(url.to_string())
                .with_username(&cfg.username)
                .with_timeout(cfg.timeout_secs),
        ),
    };
    Ok(notifier)
}
