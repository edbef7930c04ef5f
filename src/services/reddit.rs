// src/services/reddit.rs

//! Reddit API client.
//!
//! Application-only OAuth (client credentials grant). The bearer token is
//! cached per client and refreshed shortly before it expires, or right away
//! after a 401.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{CommentSort, Listing, RedditConfig, TimeFilter};
use crate::utils::http;
use crate::utils::url::endpoint;

use super::api::{CommentThread, ForumApi, ListingPage, RawListing};

/// Largest page the listing endpoints serve.
pub const MAX_PAGE: usize = 100;

/// Seconds shaved off the advertised token lifetime.
const TOKEN_SLACK_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// HTTPS implementation of [`ForumApi`].
pub struct RedditClient {
    config: RedditConfig,
    client: Client,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    /// Create a client. Credentials are checked on first use.
    pub fn new(config: &RedditConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            client: http::create_async_client(config)?,
            token: Mutex::new(None),
        })
    }

    async fn bearer(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(t) = token.as_ref() {
            if t.expires_at > Instant::now() {
                return Ok(t.value.clone());
            }
        }

        let response = self
            .client
            .post(&self.config.auth_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::Auth(format!(
                "token request failed: HTTP {}",
                response.status()
            )));
        }

        let body: TokenResponse = response.json().await?;
        let ttl = body.expires_in.saturating_sub(TOKEN_SLACK_SECS);
        log::debug!("Obtained access token, valid for {}s", ttl);

        let fresh = AccessToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(ttl),
        };
        let value = fresh.value.clone();
        *token = Some(fresh);
        Ok(value)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = endpoint(&self.config.api_base, path)?;

        for attempt in 0..2 {
            let token = self.bearer().await?;
            let response = self
                .client
                .get(url.clone())
                .bearer_auth(token)
                .query(&[("raw_json", "1")])
                .query(query)
                .send()
                .await?;

            if response.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                log::warn!("Access token rejected for {}; refreshing", path);
                *self.token.lock().await = None;
                continue;
            }

            let response = http::error_for_status(path, response).await?;
            return Ok(response.json().await?);
        }
        Err(AppError::Auth(format!("unauthorized for {}", path)))
    }
}

#[async_trait]
impl ForumApi for RedditClient {
    async fn fetch_listing(
        &self,
        subreddit: &str,
        listing: Listing,
        time_filter: Option<TimeFilter>,
        limit: usize,
        after: Option<&str>,
    ) -> Result<ListingPage> {
        let path = format!("/r/{}/{}", subreddit, listing.as_str());

        let mut query = vec![("limit", limit.clamp(1, MAX_PAGE).to_string())];
        if let (Listing::Top, Some(t)) = (listing, time_filter) {
            query.push(("t", t.as_str().to_string()));
        }
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let listing: RawListing = self.get_json(&path, &query).await?;
        Ok(listing.into())
    }

    async fn fetch_comments(&self, post_id: &str, sort: CommentSort) -> Result<CommentThread> {
        let path = format!("/comments/{}", post_id);
        let query = [("sort", sort.as_str().to_string())];

        let thread: (RawListing, RawListing) = self.get_json(&path, &query).await?;
        Ok(thread.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_default_expiry() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token": "abc"}"#).unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_in, 3600);
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let client = RedditClient::new(&RedditConfig::default()).unwrap();
        *client.token.lock().await = Some(AccessToken {
            value: "cached".into(),
            expires_at: Instant::now() + Duration::from_secs(60),
        });
        assert_eq!(client.bearer().await.unwrap(), "cached");
    }
}
