//! Content filters shared by the post and comment collectors.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

use crate::models::{CollectorConfig, RedditConfig};

/// Why a fetched item was not yielded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Older than the collection window
    Old,
    /// Removed, deleted, or authorless
    Removed,
    Bot,
    Nsfw,
    /// Not English-like
    Language,
    /// Could not be decoded
    Malformed,
}

/// Per-pass fetch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub seen: u64,
    pub yielded: u64,
    pub skipped_old: u64,
    pub skipped_removed: u64,
    pub skipped_bots: u64,
    pub skipped_nsfw: u64,
    pub skipped_lang: u64,
    pub skipped_malformed: u64,
}

impl FetchStats {
    pub fn skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Old => self.skipped_old += 1,
            SkipReason::Removed => self.skipped_removed += 1,
            SkipReason::Bot => self.skipped_bots += 1,
            SkipReason::Nsfw => self.skipped_nsfw += 1,
            SkipReason::Language => self.skipped_lang += 1,
            SkipReason::Malformed => self.skipped_malformed += 1,
        }
    }

    /// Count records that never made it past decoding.
    pub fn skip_malformed(&mut self, count: usize) {
        self.seen += count as u64;
        self.skipped_malformed += count as u64;
    }

    pub fn skipped(&self) -> u64 {
        self.skipped_old
            + self.skipped_removed
            + self.skipped_bots
            + self.skipped_nsfw
            + self.skipped_lang
            + self.skipped_malformed
    }

    pub fn merge(&mut self, other: &FetchStats) {
        self.seen += other.seen;
        self.yielded += other.yielded;
        self.skipped_old += other.skipped_old;
        self.skipped_removed += other.skipped_removed;
        self.skipped_bots += other.skipped_bots;
        self.skipped_nsfw += other.skipped_nsfw;
        self.skipped_lang += other.skipped_lang;
        self.skipped_malformed += other.skipped_malformed;
    }
}

impl fmt::Display for FetchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seen={} yielded={} skipped(old={}, removed={}, bots={}, nsfw={}, lang={}, malformed={})",
            self.seen,
            self.yielded,
            self.skipped_old,
            self.skipped_removed,
            self.skipped_bots,
            self.skipped_nsfw,
            self.skipped_lang,
            self.skipped_malformed
        )
    }
}

/// Filter switches and pacing for one collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOptions {
    pub include_nsfw: bool,
    pub skip_bots: bool,
    pub english_only: bool,
    pub debug_samples: usize,
    pub pace_every: usize,
    pub pace_delay: Duration,
}

impl FilterOptions {
    pub fn from_config(collector: &CollectorConfig, reddit: &RedditConfig) -> Self {
        Self {
            include_nsfw: collector.include_nsfw,
            skip_bots: collector.skip_bots,
            english_only: collector.english_only,
            debug_samples: collector.debug_samples,
            pace_every: reddit.pace_every,
            pace_delay: Duration::from_millis(reddit.pace_delay_ms),
        }
    }

    /// True when a pause is due after `seen` items.
    pub fn pace_due(&self, seen: u64) -> bool {
        self.pace_every > 0 && !self.pace_delay.is_zero() && seen % self.pace_every as u64 == 0
    }
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self::from_config(&CollectorConfig::default(), &RedditConfig::default())
    }
}

const TOMBSTONES: [&str; 2] = ["[deleted]", "[removed]"];

/// Author or body replaced by a deletion marker.
pub fn is_tombstone(text: &str) -> bool {
    TOMBSTONES.contains(&text.trim().to_lowercase().as_str())
}

/// Authors that look automated. `strict` also catches the moderation bot.
pub fn is_bot(author: &str, strict: bool) -> bool {
    let low = author.to_lowercase();
    low.contains("bot") || (strict && low == "automoderator")
}

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "any", "are", "as", "at", "be", "but", "can", "do", "does", "for",
    "from", "get", "has", "have", "how", "i", "if", "in", "is", "it", "just", "like", "me", "my",
    "not", "of", "on", "or", "so", "that", "the", "there", "they", "this", "to", "was", "we",
    "what", "when", "which", "why", "will", "with", "would", "you", "your",
];

/// Share of non-ASCII letters above which text is never English-like.
const MAX_FOREIGN_SHARE: f64 = 0.3;
/// Share tolerated when no stopword vouches for the text.
const LOOSE_FOREIGN_SHARE: f64 = 0.1;

/// Cheap English-likeness check.
///
/// Rejects letterless text and text with a high share of non-ASCII letters.
/// With at least three words, one English stopword is enough. Otherwise the
/// text must be almost entirely ASCII letters.
pub fn is_englishish(text: &str) -> bool {
    let mut letters = 0usize;
    let mut foreign = 0usize;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        if !c.is_ascii() {
            foreign += 1;
        }
    }
    if letters == 0 {
        return false;
    }

    let share = foreign as f64 / letters as f64;
    if share > MAX_FOREIGN_SHARE {
        return false;
    }

    let words: Vec<String> = text.unicode_words().map(str::to_lowercase).collect();
    if words.len() >= 3 && words.iter().any(|w| STOPWORDS.contains(&w.as_str())) {
        return true;
    }
    share <= LOOSE_FOREIGN_SHARE
}
