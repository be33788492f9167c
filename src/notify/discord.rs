use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{FieldValue, Message, Notifier};

// Discord embed limits
const MAX_DESCRIPTION: usize = 4096;
const MAX_FIELD_VALUE: usize = 1024;
const MAX_TITLE: usize = 256;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    username: String,
    client: Client,
    timeout: Duration,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            username: String::new(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    fn payload(&self, msg: &Message) -> DiscordWebhookPayload {
        let title = msg
            .title
            .clone()
            .unwrap_or_else(|| format!("New post from @{}", msg.author));

        let mut description = msg.text.clone();
        if let Some(ctx) = &msg.context {
            description.push_str(&format!("\n\n*{ctx}*"));
        }
        let links: Vec<String> = msg
            .actions
            .iter()
            .map(|a| format!("[{}]({})", a.label, a.url))
            .collect();
        if !links.is_empty() {
            description.push_str("\n\n");
            description.push_str(&links.join(" · "));
        }

        let fields = msg
            .fields
            .iter()
            .map(|f| DiscordField {
                name: f.title.clone(),
                value: clip(&field_value(&f.value), MAX_FIELD_VALUE),
                inline: f.short,
            })
            .collect();

        DiscordWebhookPayload {
            username: (!self.username.is_empty()).then(|| self.username.clone()),
            content: None,
            embeds: vec![DiscordEmbed {
                title: clip(&title, MAX_TITLE),
                description: clip(&description, MAX_DESCRIPTION),
                url: msg.actions.first().map(|a| a.url.clone()),
                color: msg.color.and_then(hex_color),
                timestamp: msg.timestamp.to_rfc3339(),
                fields,
            }],
        }
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, msg: &Message) -> Result<()> {
        let payload = self.payload(msg);
        let rsp = self
            .client
            .post(&self.webhook)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("Discord webhook request failed: {e}"))?;
        rsp.error_for_status_ref()
            .map_err(|e| anyhow!("Discord webhook HTTP error: {e}"))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

fn field_value(v: &FieldValue) -> String {
    match v {
        FieldValue::Text(t) => t.clone(),
        FieldValue::Links(links) => links
            .iter()
            .map(|l| format!("[{}]({})", l.label, l.url))
            .collect::<Vec<_>>()
            .join(", "),
        FieldValue::Bullets(items) => items
            .iter()
            .map(|i| format!("• {i}"))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn hex_color(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex.trim_start_matches('#'), 16).ok()
}

fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

#[derive(Serialize)]
struct DiscordField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<u32>,
    timestamp: String,
    fields: Vec<DiscordField>,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}
