//! Community tiers with their own fetch limits.

use serde::{Deserialize, Serialize};

use super::Listing;

/// A named group of communities sharing fetch limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// Tier name (e.g., "FAST")
    pub name: String,

    /// Community names without the `r/` prefix
    pub subreddits: Vec<String>,

    /// Posts to pull per community, by listing
    #[serde(default)]
    pub limits: ListingLimits,

    /// Seed posts per community for comment jobs
    #[serde(default = "default_comment_seeds")]
    pub comment_seeds: usize,
}

impl Tier {
    pub fn new(name: &str, subreddits: &[&str], limits: ListingLimits, comment_seeds: usize) -> Self {
        Self {
            name: name.to_string(),
            subreddits: subreddits.iter().map(|s| s.to_string()).collect(),
            limits,
            comment_seeds,
        }
    }

    pub fn limit_for(&self, listing: Listing) -> usize {
        self.limits.get(listing)
    }
}

/// Per-listing post limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingLimits {
    #[serde(default = "default_limit")]
    pub new: usize,
    #[serde(default = "default_limit")]
    pub hot: usize,
    #[serde(default = "default_limit")]
    pub top: usize,
}

impl ListingLimits {
    pub fn get(&self, listing: Listing) -> usize {
        match listing {
            Listing::New => self.new,
            Listing::Hot => self.hot,
            Listing::Top => self.top,
        }
    }
}

impl Default for ListingLimits {
    fn default() -> Self {
        Self {
            new: default_limit(),
            hot: default_limit(),
            top: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    100
}

fn default_comment_seeds() -> usize {
    25
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_for_listing() {
        let tier = Tier::new(
            "FAST",
            &["ChatGPT"],
            ListingLimits {
                new: 80,
                hot: 80,
                top: 150,
            },
            30,
        );
        assert_eq!(tier.limit_for(Listing::Top), 150);
        assert_eq!(tier.limit_for(Listing::Hot), 80);
    }

    #[test]
    fn test_tier_toml_defaults() {
        let tier: Tier = toml::from_str(
            r#"
            name = "CORE"
            subreddits = ["artificial"]
            "#,
        )
        .unwrap();
        assert_eq!(tier.limits, ListingLimits::default());
        assert_eq!(tier.comment_seeds, 25);
    }
}
