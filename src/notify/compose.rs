// src/notify/compose.rs
//! Message composition for rich (scored) and plain posts.

use super::{Action, FieldValue, Link, Message, MessageField, MessageKind};
use crate::types::{Post, RelevanceJudgment, Sentiment, Urgency};

pub fn urgency_icon(u: Urgency) -> &'static str {
    match u {
        Urgency::Critical => "🚨",
        Urgency::High => "⚠️",
        Urgency::Low => "ℹ️",
        Urgency::Normal | Urgency::Unrecognized => "💡",
    }
}

pub fn urgency_color(u: Urgency) -> &'static str {
    match u {
        Urgency::Critical => "#FF0000",
        Urgency::High => "#FF9900",
        Urgency::Low => "#808080",
        Urgency::Normal | Urgency::Unrecognized => "#36A64F",
    }
}

pub fn sentiment_label(s: Sentiment) -> &'static str {
    match s {
        Sentiment::Bullish => "📈 Bullish",
        Sentiment::Bearish => "📉 Bearish",
        Sentiment::Neutral => "➡️ Neutral",
        Sentiment::Unknown => "❓ Unknown",
    }
}

pub fn quote_url(ticker: &str) -> String {
    format!("https://finance.yahoo.com/quote/{ticker}")
}

pub fn chart_url(ticker: &str) -> String {
    format!("https://www.tradingview.com/chart/?symbol={ticker}")
}

pub fn compose_rich(post: &Post, j: &RelevanceJudgment) -> Message {
    let mut fields = vec![MessageField {
        title: "📝 Summary".to_string(),
        value: FieldValue::Text(j.summary.clone()),
        short: false,
    }];

    if let Some(s) = j.sentiment {
        fields.push(MessageField {
            title: "💹 Sentiment".to_string(),
            value: FieldValue::Text(sentiment_label(s).to_string()),
            short: true,
        });
    }

    if !j.tickers.is_empty() {
        let links = j
            .tickers
            .iter()
            .map(|t| Link {
                label: format!("${t}"),
                url: quote_url(t),
            })
            .collect();
        fields.push(MessageField {
            title: "🎯 Tickers".to_string(),
            value: FieldValue::Links(links),
            short: true,
        });
    }

    if !j.key_points.is_empty() {
        fields.push(MessageField {
            title: "📌 Key points".to_string(),
            value: FieldValue::Bullets(j.key_points.clone()),
            short: false,
        });
    }

    let mut actions = vec![Action {
        label: "🔗 View post".to_string(),
        url: post.url(),
        primary: true,
    }];
    if let Some(first) = j.tickers.first() {
        actions.push(Action {
            label: "📊 Chart".to_string(),
            url: chart_url(first),
            primary: false,
        });
    }

    Message {
        kind: MessageKind::Rich,
        post_id: post.id.clone(),
        author: post.author.clone(),
        title: Some(format!(
            "{} [{}] Score: {}/100",
            urgency_icon(j.urgency),
            j.category.as_str(),
            j.score
        )),
        text: post.text.clone(),
        context: None,
        color: Some(urgency_color(j.urgency)),
        fields,
        actions,
        timestamp: post.created_at,
    }
}

pub fn compose_plain(post: &Post, context: &str) -> Message {
    Message {
        kind: MessageKind::Plain,
        post_id: post.id.clone(),
        author: post.author.clone(),
        title: None,
        text: post.text.clone(),
        context: (!context.is_empty()).then(|| context.to_string()),
        color: None,
        fields: Vec::new(),
        actions: vec![Action {
            label: "🔗 View post".to_string(),
            url: post.url(),
            primary: true,
        }],
        timestamp: post.created_at,
    }
}
