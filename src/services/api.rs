//! Forum API seam and its wire types.
//!
//! Listings arrive as `{"kind": "Listing", "data": {"after": ..., "children": [...]}}`.
//! A comment thread is a two-element array: the post listing, then the
//! comment forest where each node is either a `t1` comment or a `more` stub.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::Result;
use crate::models::{CommentSort, Listing, TimeFilter};

/// Read access to a forum.
#[async_trait]
pub trait ForumApi: Send + Sync {
    /// Fetch one page of a community listing.
    ///
    /// `time_filter` only applies to [`Listing::Top`].
    async fn fetch_listing(
        &self,
        subreddit: &str,
        listing: Listing,
        time_filter: Option<TimeFilter>,
        limit: usize,
        after: Option<&str>,
    ) -> Result<ListingPage>;

    /// Fetch the comment tree of one post.
    async fn fetch_comments(&self, post_id: &str, sort: CommentSort) -> Result<CommentThread>;
}

/// One page of posts plus the cursor for the next page.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub posts: Vec<RawPost>,
    pub after: Option<String>,
    /// Children that could not be decoded
    pub malformed: usize,
}

/// Comment tree of a post.
#[derive(Debug, Clone, Default)]
pub struct CommentThread {
    /// Community the post belongs to
    pub subreddit: Option<String>,
    pub comments: Vec<CommentNode>,
}

impl CommentThread {
    /// Top-level comments in display order, `more` stubs dropped.
    pub fn top_level(&self) -> Vec<&RawComment> {
        self.comments
            .iter()
            .filter_map(CommentNode::as_comment)
            .collect()
    }

    /// Nodes that could not be decoded, at the top level or anywhere.
    pub fn malformed(&self, top_level_only: bool) -> usize {
        if top_level_only {
            return self.comments.iter().filter(|n| n.is_malformed()).count();
        }
        let mut count = 0;
        let mut level: Vec<&CommentNode> = self.comments.iter().collect();
        while !level.is_empty() {
            let mut next = Vec::new();
            for node in level {
                match node {
                    CommentNode::Comment(comment) => next.extend(comment.replies.iter()),
                    CommentNode::Malformed => count += 1,
                    CommentNode::More(_) => {}
                }
            }
            level = next;
        }
        count
    }

    /// Every loaded comment, breadth first.
    pub fn flatten(&self) -> Vec<&RawComment> {
        let mut out = Vec::new();
        let mut level: Vec<&CommentNode> = self.comments.iter().collect();
        while !level.is_empty() {
            let mut next = Vec::new();
            for node in level {
                if let CommentNode::Comment(comment) = node {
                    out.push(comment);
                    next.extend(comment.replies.iter());
                }
            }
            level = next;
        }
        out
    }
}

/// Post as returned by a listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPost {
    pub id: String,
    #[serde(default)]
    pub subreddit: String,
    pub title: Option<String>,
    pub selftext: Option<String>,
    pub author: Option<String>,
    pub score: Option<i64>,
    pub upvote_ratio: Option<f64>,
    pub num_comments: Option<i64>,
    pub permalink: Option<String>,
    pub created_utc: Option<f64>,
    #[serde(default)]
    pub over_18: bool,
    pub removed_by_category: Option<String>,
}

/// Node of a comment forest.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum CommentNode {
    #[serde(rename = "t1")]
    Comment(RawComment),
    /// Unexpanded "load more comments" stub
    #[serde(rename = "more")]
    More(MoreStub),
    /// Node that failed to decode
    #[serde(skip_deserializing)]
    Malformed,
}

impl CommentNode {
    pub fn as_comment(&self) -> Option<&RawComment> {
        match self {
            CommentNode::Comment(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, CommentNode::Malformed)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoreStub {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub children: Vec<String>,
}

/// Comment as returned in a thread.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawComment {
    pub id: String,
    pub author: Option<String>,
    pub body: Option<String>,
    pub score: Option<i64>,
    pub permalink: Option<String>,
    pub created_utc: Option<f64>,
    pub parent_id: Option<String>,
    pub link_id: Option<String>,
    pub depth: Option<u32>,
    #[serde(default, deserialize_with = "replies")]
    pub replies: Vec<CommentNode>,
}

impl RawComment {
    /// Top-level when depth is 0, else when the parent is the post itself.
    pub fn is_top_level(&self) -> bool {
        if let Some(depth) = self.depth {
            return depth == 0;
        }
        let parent = self.parent_id.as_deref().unwrap_or_default();
        let link = self.link_id.as_deref().unwrap_or_default();
        parent.starts_with("t3_") || (!parent.is_empty() && parent == link)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

/// Listing body. Children stay raw and are decoded one by one.
#[derive(Debug, Deserialize)]
pub(crate) struct ListingData {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub children: Vec<Value>,
}

pub(crate) type RawListing = Envelope<ListingData>;

/// Decode each child on its own; failures are logged and counted.
fn decode_children<T: DeserializeOwned>(children: Vec<Value>) -> (Vec<T>, usize) {
    let mut items = Vec::with_capacity(children.len());
    let mut malformed = 0;
    for child in children {
        let id = child
            .pointer("/data/id")
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string();
        match serde_json::from_value(child) {
            Ok(item) => items.push(item),
            Err(e) => {
                log::warn!("Skipping malformed record {}: {}", id, e);
                malformed += 1;
            }
        }
    }
    (items, malformed)
}

fn decode_nodes(children: Vec<Value>) -> Vec<CommentNode> {
    children
        .into_iter()
        .map(|child| {
            let (mut nodes, _) = decode_children::<CommentNode>(vec![child]);
            nodes.pop().unwrap_or(CommentNode::Malformed)
        })
        .collect()
}

impl From<RawListing> for ListingPage {
    fn from(listing: RawListing) -> Self {
        let (posts, malformed) = decode_children::<Envelope<RawPost>>(listing.data.children);
        ListingPage {
            posts: posts.into_iter().map(|c| c.data).collect(),
            after: listing.data.after.filter(|a| !a.is_empty()),
            malformed,
        }
    }
}

impl From<(RawListing, RawListing)> for CommentThread {
    fn from((post, comments): (RawListing, RawListing)) -> Self {
        let (posts, _) = decode_children::<Envelope<RawPost>>(post.data.children);
        CommentThread {
            subreddit: posts.into_iter().next().map(|c| c.data.subreddit),
            comments: decode_nodes(comments.data.children),
        }
    }
}

/// `replies` is an empty string when a comment has none.
fn replies<'de, D>(deserializer: D) -> std::result::Result<Vec<CommentNode>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match serde_json::from_value::<RawListing>(value) {
        Ok(listing) => decode_nodes(listing.data.children),
        Err(_) => Vec::new(),
    })
}
