use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{
    fork_attributes, unique_username, AuthorRef, CommunityStore, CountRef, NewPost, NewReply,
    NewStory, Post, ProfileRequest, Reply, StoreError, StoryRecord, StoryUpdate, UserProfile,
    Vote,
};

/// Process-local store used when no relational backend is configured, and by
/// tests. Rows live for the lifetime of the process.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, UserProfile>,
    posts: Vec<Post>,
    replies: Vec<Reply>,
    votes: HashMap<(String, String, String), Vote>,
    stories: Vec<StoryRecord>,
}

impl Tables {
    fn author(&self, user_id: &str) -> Option<AuthorRef> {
        self.users.get(user_id).map(|u| AuthorRef {
            username: Some(u.username.clone()),
            avatar: u.avatar.clone(),
        })
    }

    fn hydrate_post(&self, post: &Post) -> Post {
        let mut out = post.clone();
        out.author = self.author(&post.author_id);
        let count = self.replies.iter().filter(|r| r.parent_id == post.id).count() as u64;
        out.replies = vec![CountRef { count }];
        out
    }

    fn hydrate_story(&self, story: &StoryRecord) -> StoryRecord {
        let mut out = story.clone();
        out.author = self.author(&story.author_id);
        out
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn vote_count(&self) -> usize {
        self.inner.lock().await.votes.len()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl CommunityStore for MemoryStore {
    async fn ensure_user_profile(
        &self,
        request: &ProfileRequest,
    ) -> Result<UserProfile, StoreError> {
        let mut tables = self.inner.lock().await;
        let id = match &request.id {
            Some(id) => id.clone(),
            None => tables
                .users
                .values()
                .find(|u| !request.email.is_empty() && u.email.eq_ignore_ascii_case(&request.email))
                .map(|u| u.id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        };
        if let Some(existing) = tables.users.get(&id) {
            return Ok(existing.clone());
        }
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let user = UserProfile {
            id: id.clone(),
            username: unique_username(request, now),
            email: request.email.clone(),
            avatar: None,
            emoji: None,
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn user_emoji(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables.users.get(user_id).and_then(|u| u.emoji.clone()))
    }

    async fn set_user_emoji(&self, user_id: &str, emoji: &str) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        let user = tables
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        user.emoji = Some(emoji.to_string());
        Ok(())
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError> {
        let mut tables = self.inner.lock().await;
        let row = Post {
            id: Uuid::new_v4().to_string(),
            author_id: post.author_id,
            title: None,
            text: post.text,
            category: Some(post.category),
            tags: Vec::new(),
            upvotes: 0,
            attributes: post.attributes,
            deleted_at: None,
            created_at: Some(Utc::now().to_rfc3339()),
            author: None,
            replies: Vec::new(),
        };
        tables.posts.push(row.clone());
        Ok(row)
    }

    async fn list_posts(&self, limit: usize) -> Result<Vec<Post>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .posts
            .iter()
            .rev()
            .filter(|p| p.deleted_at.is_none())
            .take(limit)
            .map(|p| tables.hydrate_post(p))
            .collect())
    }

    async fn get_post(&self, id: &str) -> Result<Post, StoreError> {
        let tables = self.inner.lock().await;
        tables
            .posts
            .iter()
            .find(|p| p.id == id && p.deleted_at.is_none())
            .map(|p| tables.hydrate_post(p))
            .ok_or_else(|| StoreError::NotFound(format!("post {id}")))
    }

    async fn create_reply(&self, reply: NewReply) -> Result<Reply, StoreError> {
        let mut tables = self.inner.lock().await;
        if !tables.posts.iter().any(|p| p.id == reply.parent_id) {
            return Err(StoreError::NotFound(format!("post {}", reply.parent_id)));
        }
        let row = Reply {
            id: Uuid::new_v4().to_string(),
            author_id: reply.author_id,
            parent_id: reply.parent_id,
            text: reply.text,
            attributes: reply.attributes,
        };
        tables.replies.push(row.clone());
        Ok(row)
    }

    async fn vote(&self, vote: Vote) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        let key = (
            vote.user_id.clone(),
            vote.target_type.clone(),
            vote.target_id.clone(),
        );
        let previous = tables.votes.insert(key, vote.clone());
        let delta = |v: &Vote| -> i64 { i64::from(v.vote_type == "upvote") };
        let change = delta(&vote) - previous.as_ref().map(delta).unwrap_or(0);
        if let Some(post) = tables.posts.iter_mut().find(|p| p.id == vote.target_id) {
            post.upvotes += change;
        }
        Ok(())
    }

    async fn search_posts(&self, query: &str, limit: usize) -> Result<Vec<Post>, StoreError> {
        let tables = self.inner.lock().await;
        let mut hits: Vec<Post> = tables
            .posts
            .iter()
            .filter(|p| p.deleted_at.is_none())
            .filter(|p| {
                contains_ci(&p.text, query)
                    || p.title.as_deref().is_some_and(|t| contains_ci(t, query))
            })
            .map(|p| tables.hydrate_post(p))
            .collect();
        hits.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_post(&self, id: &str, author_id: &str) -> Result<Post, StoreError> {
        let mut tables = self.inner.lock().await;
        let post = tables
            .posts
            .iter_mut()
            .find(|p| p.id == id && p.author_id == author_id && p.deleted_at.is_none())
            .ok_or_else(|| StoreError::NotFound(format!("post {id} owned by {author_id}")))?;
        post.deleted_at = Some(Utc::now().to_rfc3339());
        Ok(post.clone())
    }

    async fn create_story(&self, story: NewStory) -> Result<StoryRecord, StoreError> {
        let mut tables = self.inner.lock().await;
        if tables.stories.iter().any(|s| s.slug == story.slug) {
            return Err(StoreError::Rejected(format!(
                "duplicate key value violates unique constraint on slug '{}'",
                story.slug
            )));
        }
        let row = StoryRecord {
            id: Uuid::new_v4().to_string(),
            author_id: story.author_id,
            title: story.title,
            slug: story.slug,
            description: Some(story.description),
            tags: story.tags,
            is_public: story.is_public,
            attributes: serde_json::json!({}),
            play_count: 0,
            like_count: 0,
            fork_count: 0,
            created_at: Some(Utc::now().to_rfc3339()),
            author: None,
        };
        tables.stories.push(row.clone());
        Ok(row)
    }

    async fn list_stories(
        &self,
        limit: usize,
        public_only: bool,
    ) -> Result<Vec<StoryRecord>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .stories
            .iter()
            .rev()
            .filter(|s| !public_only || s.is_public)
            .take(limit)
            .map(|s| tables.hydrate_story(s))
            .collect())
    }

    async fn story_by_slug(&self, slug: &str) -> Result<StoryRecord, StoreError> {
        let tables = self.inner.lock().await;
        tables
            .stories
            .iter()
            .find(|s| s.slug == slug)
            .map(|s| tables.hydrate_story(s))
            .ok_or_else(|| StoreError::NotFound(format!("story {slug}")))
    }

    async fn update_story(
        &self,
        id: &str,
        update: StoryUpdate,
    ) -> Result<StoryRecord, StoreError> {
        let mut tables = self.inner.lock().await;
        let story = tables
            .stories
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("story {id}")))?;
        story.title = update.title;
        story.description = Some(update.description);
        Ok(story.clone())
    }

    async fn search_stories(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StoryRecord>, StoreError> {
        let tables = self.inner.lock().await;
        let mut hits: Vec<StoryRecord> = tables
            .stories
            .iter()
            .filter(|s| s.is_public)
            .filter(|s| {
                contains_ci(&s.title, query)
                    || s.description.as_deref().is_some_and(|d| contains_ci(d, query))
            })
            .map(|s| tables.hydrate_story(s))
            .collect();
        hits.sort_by(|a, b| b.play_count.cmp(&a.play_count));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn fork_story(
        &self,
        original_id: &str,
        fork: NewStory,
    ) -> Result<StoryRecord, StoreError> {
        let original = {
            let tables = self.inner.lock().await;
            tables
                .stories
                .iter()
                .find(|s| s.id == original_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("story {original_id}")))?
        };
        let mut created = self
            .create_story(NewStory {
                tags: original.tags.clone(),
                ..fork
            })
            .await?;
        let attributes = fork_attributes(&original, &Utc::now().to_rfc3339());

        let mut tables = self.inner.lock().await;
        if let Some(row) = tables.stories.iter_mut().find(|s| s.id == created.id) {
            row.attributes = attributes.clone();
        }
        if let Some(row) = tables.stories.iter_mut().find(|s| s.id == original_id) {
            row.fork_count += 1;
        }
        created.attributes = attributes;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str) -> ProfileRequest {
        ProfileRequest {
            id: Some(id.into()),
            email: "ai@storydesigner.ai".into(),
            username: "Badger".into(),
        }
    }

    fn new_story(author: &str, title: &str, slug: &str) -> NewStory {
        NewStory {
            author_id: author.into(),
            title: title.into(),
            slug: slug.into(),
            description: "desc".into(),
            is_public: true,
            tags: vec!["ai-generated".into()],
        }
    }

    #[tokio::test]
    async fn ensure_user_profile_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.ensure_user_profile(&profile("u-1")).await.expect("create");
        let second = store.ensure_user_profile(&profile("u-1")).await.expect("fetch");
        assert_eq!(first, second);
        assert!(first.username.starts_with("badger_"));
    }

    #[tokio::test]
    async fn soft_delete_only_for_author() {
        let store = MemoryStore::new();
        let post = store
            .create_post(NewPost {
                author_id: "u-1".into(),
                text: "hello".into(),
                category: "general".into(),
                attributes: serde_json::json!({}),
            })
            .await
            .expect("post");

        assert!(matches!(
            store.delete_post(&post.id, "u-2").await,
            Err(StoreError::NotFound(_))
        ));
        store.delete_post(&post.id, "u-1").await.expect("delete");
        assert!(store.list_posts(10).await.expect("list").is_empty());
        assert!(store.get_post(&post.id).await.is_err());
    }

    #[tokio::test]
    async fn votes_are_upserted_per_user_and_target() {
        let store = MemoryStore::new();
        let post = store
            .create_post(NewPost {
                author_id: "u-1".into(),
                text: "vote me".into(),
                category: "general".into(),
                attributes: serde_json::json!({}),
            })
            .await
            .expect("post");
        for vote_type in ["upvote", "upvote", "downvote", "upvote"] {
            store
                .vote(Vote {
                    user_id: "u-2".into(),
                    target_type: "post".into(),
                    target_id: post.id.clone(),
                    vote_type: vote_type.into(),
                    reason: None,
                })
                .await
                .expect("vote");
        }
        assert_eq!(store.vote_count().await, 1);
        assert_eq!(store.get_post(&post.id).await.expect("post").upvotes, 1);
    }

    #[tokio::test]
    async fn fork_copies_tags_and_counts() {
        let store = MemoryStore::new();
        let original = store
            .create_story(new_story("u-1", "Tale", "tale"))
            .await
            .expect("story");
        let fork = store
            .fork_story(
                &original.id,
                NewStory {
                    tags: Vec::new(),
                    ..new_story("u-2", "Tale II", "tale-ii")
                },
            )
            .await
            .expect("fork");
        assert_eq!(fork.tags, vec!["ai-generated".to_string()]);
        assert_eq!(fork.attributes["forked_from"], serde_json::json!(original.id));
        assert_eq!(store.story_by_slug("tale").await.expect("orig").fork_count, 1);
    }

    #[tokio::test]
    async fn story_search_is_case_insensitive_and_public_only() {
        let store = MemoryStore::new();
        store
            .create_story(new_story("u-1", "The Badger", "the-badger"))
            .await
            .expect("story");
        let mut private = new_story("u-1", "Badger Secrets", "badger-secrets");
        private.is_public = false;
        store.create_story(private).await.expect("story");

        let hits = store.search_stories("badger", 5).await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "the-badger");
    }
}
