//! Listing modes, top-N time windows, and comment orderings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Upstream ordering used to select candidate posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Listing {
    New,
    Hot,
    Top,
}

impl Listing {
    pub const ALL: [Listing; 3] = [Listing::New, Listing::Hot, Listing::Top];

    pub fn as_str(&self) -> &'static str {
        match self {
            Listing::New => "new",
            Listing::Hot => "hot",
            Listing::Top => "top",
        }
    }
}

impl FromStr for Listing {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(Listing::New),
            "hot" => Ok(Listing::Hot),
            "top" => Ok(Listing::Top),
            _ => Err(AppError::InvalidMode {
                kind: "listing",
                value: s.to_string(),
                expected: "hot, new, top",
            }),
        }
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time window for the `top` listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

impl FromStr for TimeFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hour" => Ok(TimeFilter::Hour),
            "day" => Ok(TimeFilter::Day),
            "week" => Ok(TimeFilter::Week),
            "month" => Ok(TimeFilter::Month),
            "year" => Ok(TimeFilter::Year),
            "all" => Ok(TimeFilter::All),
            _ => Err(AppError::InvalidMode {
                kind: "time filter",
                value: s.to_string(),
                expected: "hour, day, week, month, year, all",
            }),
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering of a post's comment tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommentSort {
    #[serde(alias = "best")]
    Confidence,
    Top,
    #[default]
    New,
    Old,
    Qa,
    Controversial,
    Hot,
}

impl CommentSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentSort::Confidence => "confidence",
            CommentSort::Top => "top",
            CommentSort::New => "new",
            CommentSort::Old => "old",
            CommentSort::Qa => "qa",
            CommentSort::Controversial => "controversial",
            CommentSort::Hot => "hot",
        }
    }
}

impl FromStr for CommentSort {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" | "confidence" => Ok(CommentSort::Confidence),
            "top" => Ok(CommentSort::Top),
            "new" => Ok(CommentSort::New),
            "old" => Ok(CommentSort::Old),
            "qa" => Ok(CommentSort::Qa),
            "controversial" => Ok(CommentSort::Controversial),
            "hot" => Ok(CommentSort::Hot),
            _ => Err(AppError::InvalidMode {
                kind: "sort",
                value: s.to_string(),
                expected: "confidence, controversial, hot, new, old, qa, top",
            }),
        }
    }
}

impl fmt::Display for CommentSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_parse() {
        assert_eq!("hot".parse::<Listing>().unwrap(), Listing::Hot);
        assert_eq!(" TOP ".parse::<Listing>().unwrap(), Listing::Top);
        assert!("rising".parse::<Listing>().is_err());
    }

    #[test]
    fn test_best_is_confidence() {
        assert_eq!(
            "best".parse::<CommentSort>().unwrap(),
            CommentSort::Confidence
        );
        let sort: CommentSort = serde_json::from_str("\"best\"").unwrap();
        assert_eq!(sort, CommentSort::Confidence);
    }

    #[test]
    fn test_unknown_sort_is_config_error() {
        let err = "random".parse::<CommentSort>().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_time_filter_roundtrip_str() {
        for tf in ["hour", "day", "week", "month", "year", "all"] {
            assert_eq!(tf.parse::<TimeFilter>().unwrap().as_str(), tf);
        }
    }
}
