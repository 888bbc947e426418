//! Relational community store: users, posts, replies, votes and stories.
//!
//! All filtering, soft deletion and counting happens in the backing store;
//! callers only shape requests and read the typed rows back.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("store error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed store response: {0}")]
    Parse(String),

    #[error("{0}")]
    Rejected(String),
}

/// Identity fields used to find or create a backing user record.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileRequest {
    pub id: Option<String>,
    pub email: String,
    pub username: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserProfile {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
}

/// Author columns joined onto posts and stories.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct AuthorRef {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CountRef {
    #[serde(default)]
    pub count: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(deserialize_with = "de_id")]
    pub author_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "de_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub attributes: serde_json::Value,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, rename = "users", skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<CountRef>,
}

impl Post {
    pub fn author_name(&self) -> &str {
        self.author
            .as_ref()
            .and_then(|a| a.username.as_deref())
            .unwrap_or("Unknown")
    }

    pub fn reply_count(&self) -> u64 {
        self.replies.first().map(|r| r.count).unwrap_or(0)
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct NewPost {
    pub author_id: String,
    pub text: String,
    pub category: String,
    pub attributes: serde_json::Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Reply {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(deserialize_with = "de_id")]
    pub author_id: String,
    #[serde(deserialize_with = "de_id")]
    pub parent_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct NewReply {
    pub author_id: String,
    pub parent_id: String,
    pub text: String,
    pub attributes: serde_json::Value,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Vote {
    pub user_id: String,
    pub target_type: String,
    pub target_id: String,
    pub vote_type: String,
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoryRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(deserialize_with = "de_id")]
    pub author_id: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub attributes: serde_json::Value,
    #[serde(default)]
    pub play_count: i64,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub fork_count: i64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, rename = "users", skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorRef>,
}

impl StoryRecord {
    pub fn author_name(&self) -> &str {
        self.author
            .as_ref()
            .and_then(|a| a.username.as_deref())
            .unwrap_or("Unknown")
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct NewStory {
    pub author_id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub is_public: bool,
    pub tags: Vec<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct StoryUpdate {
    pub title: String,
    pub description: String,
}

#[async_trait]
pub trait CommunityStore: Send + Sync {
    /// Returns the user record for `request`, creating it on first use.
    async fn ensure_user_profile(&self, request: &ProfileRequest)
        -> Result<UserProfile, StoreError>;

    async fn user_emoji(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    async fn set_user_emoji(&self, user_id: &str, emoji: &str) -> Result<(), StoreError>;

    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError>;

    /// Newest first, soft-deleted posts excluded.
    async fn list_posts(&self, limit: usize) -> Result<Vec<Post>, StoreError>;

    async fn get_post(&self, id: &str) -> Result<Post, StoreError>;

    async fn create_reply(&self, reply: NewReply) -> Result<Reply, StoreError>;

    /// Insert or replace the vote keyed by user and target.
    async fn vote(&self, vote: Vote) -> Result<(), StoreError>;

    /// Matches title or text, highest upvoted first.
    async fn search_posts(&self, query: &str, limit: usize) -> Result<Vec<Post>, StoreError>;

    /// Marks the post deleted when `author_id` wrote it.
    async fn delete_post(&self, id: &str, author_id: &str) -> Result<Post, StoreError>;

    async fn create_story(&self, story: NewStory) -> Result<StoryRecord, StoreError>;

    async fn list_stories(
        &self,
        limit: usize,
        public_only: bool,
    ) -> Result<Vec<StoryRecord>, StoreError>;

    async fn story_by_slug(&self, slug: &str) -> Result<StoryRecord, StoreError>;

    async fn update_story(
        &self,
        id: &str,
        update: StoryUpdate,
    ) -> Result<StoryRecord, StoreError>;

    /// Public stories whose title or description matches, most played first.
    async fn search_stories(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StoryRecord>, StoreError>;

    /// Creates `fork` carrying the original's tags and provenance attributes
    /// and bumps the original's fork count.
    async fn fork_story(
        &self,
        original_id: &str,
        fork: NewStory,
    ) -> Result<StoryRecord, StoreError>;
}

/// `<base>_<millis in base 36>`, lowercased. The base is the requested
/// username, else the email's local part, else `aiuser`.
pub fn unique_username(request: &ProfileRequest, now_millis: u64) -> String {
    let base = Some(request.username.trim())
        .filter(|s| !s.is_empty())
        .or_else(|| request.email.split('@').next().filter(|s| !s.is_empty()))
        .unwrap_or("aiuser");
    format!("{base}_{}", to_base36(now_millis)).to_lowercase()
}

/// Attributes recorded on a forked story.
pub fn fork_attributes(original: &StoryRecord, now: &str) -> serde_json::Value {
    let mut attributes = match &original.attributes {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    attributes.insert(
        "forked_from".into(),
        serde_json::Value::String(original.id.clone()),
    );
    attributes.insert(
        "fork_created_at".into(),
        serde_json::Value::String(now.to_string()),
    );
    serde_json::Value::Object(attributes)
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).to_string()
}

/// Row ids come back as uuids or integers depending on the table.
fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unexpected id: {other}"))),
    }
}

fn de_tags<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(d)?.unwrap_or_default())
}
