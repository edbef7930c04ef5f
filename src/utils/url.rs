// src/utils/url.rs

//! URL helpers for forum endpoints and links.

use url::Url;

use crate::error::Result;

const SITE: &str = "https://reddit.com";

/// Absolute link for a site-relative permalink; empty stays empty.
///
/// # Examples
/// ```
/// use collector::utils::url::permalink;
///
/// assert_eq!(permalink("/r/rust/comments/x/"), "https://reddit.com/r/rust/comments/x/");
/// assert_eq!(permalink(""), "");
/// ```
pub fn permalink(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{SITE}{path}")
}

/// Join an API path onto the configured base.
pub fn endpoint(base: &str, path: &str) -> Result<Url> {
    let base = Url::parse(base)?;
    Ok(base.join(path)?)
}
