// src/fetch/x_api.rs
//! X (Twitter) API v2 client: user timelines and recent search.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{FetchError, Fetcher};
use crate::types::Post;

const X_API_URL: &str = "https://api.twitter.com/2";
const TWEET_FIELDS: &str = "created_at,author_id";

pub struct XApiClient {
    http: reqwest::Client,
    bearer_token: String,
    base_url: String,
    // handle (lowercase) -> user id; ids never change so no expiry
    user_ids: Mutex<HashMap<String, String>>,
}

impl XApiClient {
    pub fn new(bearer_token: impl Into<String>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("x-market-crawler/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            bearer_token: bearer_token.into(),
            base_url: X_API_URL.to_string(),
            user_ids: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String, FetchError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.text().await?)
    }

    async fn user_id(&self, handle: &str) -> Result<String, FetchError> {
        let key = handle.to_ascii_lowercase();
        let cached = self.user_ids.lock().get(&key).cloned();
        if let Some(id) = cached {
            return Ok(id);
        }

        let url = format!("{}/users/by/username/{}", self.base_url, handle);
        let body = self.get(&url, &[]).await?;
        let id = parse_user_lookup(&body).ok_or_else(|| FetchError::NotFound(format!("@{handle}")))?;
        debug!(%handle, user_id = %id, "resolved user id");

        self.user_ids.lock().insert(key, id.clone());
        Ok(id)
    }
}

#[async_trait]
impl Fetcher for XApiClient {
    async fn fetch_for_account(&self, handle: &str, limit: u32) -> Result<Vec<Post>, FetchError> {
        let handle = handle.trim_start_matches('@');
        let user_id = self.user_id(handle).await?;

        let url = format!("{}/users/{}/tweets", self.base_url, user_id);
        let body = self
            .get(
                &url,
                &[
                    ("max_results", clamp_max_results(limit).to_string()),
                    ("tweet.fields", TWEET_FIELDS.to_string()),
                    ("exclude", "retweets,replies".to_string()),
                ],
            )
            .await?;

        let mut posts = parse_timeline(&body)?;
        for p in posts.iter_mut() {
            p.author = handle.to_string();
        }
        Ok(posts)
    }

    async fn fetch_for_query(&self, query: &str, limit: u32) -> Result<Vec<Post>, FetchError> {
        let url = format!("{}/tweets/search/recent", self.base_url);
        let body = self
            .get(
                &url,
                &[
                    ("query", query.to_string()),
                    ("max_results", clamp_max_results(limit).to_string()),
                    ("tweet.fields", TWEET_FIELDS.to_string()),
                    ("expansions", "author_id".to_string()),
                    ("user.fields", "username".to_string()),
                ],
            )
            .await?;
        parse_timeline(&body)
    }

    fn name(&self) -> &'static str {
        "x-api"
    }
}

/// Both endpoints reject `max_results` outside 10..=100 (timelines take 5, search does not).
fn clamp_max_results(limit: u32) -> u32 {
    limit.clamp(10, 100)
}

async fn check_status(resp: Response) -> Result<Response, FetchError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let reset_at = resp
        .headers()
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());
    let message = resp.text().await.unwrap_or_default();
    Err(classify_status(status, reset_at, message))
}

fn classify_status(status: StatusCode, reset_at: Option<i64>, message: String) -> FetchError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited { reset_at },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        StatusCode::NOT_FOUND => FetchError::NotFound(message),
        _ => FetchError::Upstream {
            status: status.as_u16(),
            message,
        },
    }
}

// --- wire types ---

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    data: Vec<WireTweet>,
    #[serde(default)]
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct WireTweet {
    id: String,
    text: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    username: String,
}

fn parse_user_lookup(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Lookup {
        data: Option<WireUser>,
    }
    serde_json::from_str::<Lookup>(body)
        .ok()
        .and_then(|l| l.data)
        .map(|u| u.id)
}

/// Map a timeline/search payload to posts. Authors come from `includes.users`
/// when the author expansion was requested.
fn parse_timeline(body: &str) -> Result<Vec<Post>, FetchError> {
    let resp: TimelineResponse = serde_json::from_str(body)?;

    let usernames: HashMap<String, String> = resp
        .includes
        .map(|i| i.users.into_iter().map(|u| (u.id, u.username)).collect())
        .unwrap_or_default();

    Ok(resp
        .data
        .into_iter()
        .map(|t| {
            let author = t
                .author_id
                .as_ref()
                .and_then(|id| usernames.get(id))
                .cloned()
                .unwrap_or_default();
            Post {
                id: t.id,
                author,
                text: t.text,
                created_at: t.created_at.unwrap_or_else(Utc::now),
                source: String::new(),
            }
        })
        .collect())
}
