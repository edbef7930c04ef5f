// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;
use crate::models::RedditConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &RedditConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Turn a non-success response into a fetch error carrying the status and body head.
pub async fn error_for_status(context: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let head: String = body.chars().take(200).collect();
    Err(crate::error::AppError::fetch(
        context,
        format!("HTTP {}: {}", status, head),
    ))
}
