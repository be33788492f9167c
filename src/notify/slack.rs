use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

use super::{FieldValue, Message, MessageKind, Notifier};

pub struct SlackNotifier {
    webhook_url: String,
    username: String,
    icon_emoji: String,
    client: Client,
    timeout: Duration,
}

impl SlackNotifier {
    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            username: String::new(),
            icon_emoji: String::new(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    pub fn with_icon_emoji(mut self, icon: &str) -> Self {
        self.icon_emoji = icon.to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    /// Webhook payload for `msg`: an attachment for rich messages, mrkdwn text for plain ones.
    pub fn render(&self, msg: &Message) -> Value {
        let mut body = match msg.kind {
            MessageKind::Rich => json!({ "attachments": [self.attachment(msg)] }),
            MessageKind::Plain => json!({ "text": plain_text(msg) }),
        };
        if !self.username.is_empty() {
            body["username"] = json!(self.username);
        }
        if !self.icon_emoji.is_empty() {
            body["icon_emoji"] = json!(self.icon_emoji);
        }
        body
    }

    fn attachment(&self, msg: &Message) -> Value {
        let fields: Vec<Value> = msg
            .fields
            .iter()
            .map(|f| {
                json!({
                    "title": f.title,
                    "value": field_value(&f.value),
                    "short": f.short,
                })
            })
            .collect();

        let actions: Vec<Value> = msg
            .actions
            .iter()
            .map(|a| {
                let mut b = json!({ "type": "button", "text": a.label, "url": a.url });
                if a.primary {
                    b["style"] = json!("primary");
                }
                b
            })
            .collect();

        json!({
            "color": msg.color.unwrap_or("#36A64F"),
            "author_name": format!("@{}", msg.author),
            "title": msg.title.clone().unwrap_or_default(),
            "text": escape(&msg.text),
            "fields": fields,
            "footer": "X Trading Crawler",
            "ts": msg.timestamp.timestamp(),
            "actions": actions,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, msg: &Message) -> Result<()> {
        let body = self.render(msg);
        self.client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}

/// Slack only needs `&`, `<` and `>` escaped in mrkdwn text.
fn escape(s: &str) -> String {
    html_escape::encode_text(s).into_owned()
}

fn field_value(v: &FieldValue) -> String {
    match v {
        FieldValue::Text(t) => escape(t),
        FieldValue::Links(links) => links
            .iter()
            .map(|l| format!("<{}|{}>", l.url, escape(&l.label)))
            .collect::<Vec<_>>()
            .join(", "),
        FieldValue::Bullets(items) => items
            .iter()
            .map(|i| format!("• {}", escape(i)))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn plain_text(msg: &Message) -> String {
    let mut out = format!("*@{}* posted:\n{}", msg.author, escape(&msg.text));
    if let Some(ctx) = &msg.context {
        out.push_str(&format!("\n_{}_", escape(ctx)));
    }
    for a in &msg.actions {
        out.push_str(&format!("\n\n{} <{}|open>", a.label, a.url));
    }
    out
}
