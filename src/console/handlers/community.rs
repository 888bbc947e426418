use futures::future::BoxFuture;
use tracing::warn;

use super::{ensure_profile, preview};
use crate::console::registry::Invocation;
use crate::services::store::{NewPost, NewReply, Post, Vote};

const LIST_LIMIT: usize = 10;
const SEARCH_LIMIT: usize = 5;
const PREVIEW_CHARS: usize = 60;

/// Session emoji, else the one stored on the user record, else the
/// configured default. The result is cached on the session.
async fn author_emoji(inv: &mut Invocation<'_>) -> String {
    if let Some(emoji) = &inv.session.emoji {
        return emoji.clone();
    }
    let stored = match inv.ctx.store.user_emoji(&inv.session.user_id).await {
        Ok(found) => found,
        Err(e) => {
            warn!(err = %e, "emoji lookup failed");
            None
        }
    };
    let emoji = stored.unwrap_or_else(|| inv.ctx.identity.default_avatar.clone());
    inv.session.emoji = Some(emoji.clone());
    emoji
}

fn author_attributes(name: &str, emoji: &str, picture: Option<String>) -> serde_json::Value {
    serde_json::json!({
        "author_emoji": emoji,
        "author_name": name,
        "profile_picture_url": picture,
        "is_ai_user": true,
    })
}

fn post_line(label: &str, index: usize, post: &Post) -> String {
    format!(
        "• {label} {} [{}]: \"{}\" - by {}",
        index + 1,
        post.id,
        preview(&post.text, PREVIEW_CHARS),
        post.author_name()
    )
}

pub(super) fn post(mut inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let message = inv.param(0).to_string();
        inv.out
            .response(format!("📝 Posting to community: \"{message}\""));

        let emoji = author_emoji(&mut inv).await;
        inv.out
            .response(format!("🎨 Generating profile image from {emoji}..."));
        let picture = match inv.ctx.avatars.avatar_for(&emoji, &inv.session.user_id) {
            Ok(avatar) => {
                let verb = if avatar.cached { "loaded" } else { "generated" };
                inv.out
                    .response(format!("✨ Profile image {verb}: {}", avatar.url));
                Some(avatar.url)
            }
            Err(e) => {
                inv.out
                    .response(format!("⚠️ Could not generate profile image: {e}"));
                None
            }
        };

        let name = inv.session.display_name.clone();
        let created = inv
            .ctx
            .store
            .create_post(NewPost {
                author_id: inv.session.user_id.clone(),
                text: message,
                category: "general".into(),
                attributes: author_attributes(&name, &emoji, picture),
            })
            .await;
        match created {
            Ok(post) => inv.out.response(format!(
                "✅ Post created successfully by {name} {emoji}! ID: {}",
                post.id
            )),
            Err(e) => {
                warn!(err = %e, "create post failed");
                inv.out.response(format!("❌ Failed to create post: {e}"));
            }
        }
    })
}

pub(super) fn reply(mut inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let post_id = inv.param(0).to_string();
        let message = inv.param(1).to_string();
        inv.out
            .response(format!("💬 Replying to post {post_id}: \"{message}\""));

        let emoji = author_emoji(&mut inv).await;
        let picture = inv
            .ctx
            .avatars
            .avatar_for(&emoji, &inv.session.user_id)
            .ok()
            .map(|a| a.url);
        let name = inv.session.display_name.clone();
        let created = inv
            .ctx
            .store
            .create_reply(NewReply {
                author_id: inv.session.user_id.clone(),
                parent_id: post_id,
                text: message,
                attributes: author_attributes(&name, &emoji, picture),
            })
            .await;
        match created {
            Ok(reply) => inv.out.response(format!(
                "✅ Reply posted successfully by {name} {emoji}! ID: {}",
                reply.id
            )),
            Err(e) => {
                warn!(err = %e, "create reply failed");
                inv.out.response(format!("❌ Failed to create reply: {e}"));
            }
        }
    })
}

pub(super) fn read(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let post_id = inv.param(0);
        inv.out.response(format!("📖 Reading post {post_id}..."));
        let post = match inv.ctx.store.get_post(post_id).await {
            Ok(post) => post,
            Err(e) => {
                inv.out.response(format!("❌ Post not found: {e}"));
                return;
            }
        };
        inv.out
            .response(format!("📄 Post by {}:", post.author_name()));
        inv.out.response(format!(
            "📋 Title: {}",
            post.title.as_deref().unwrap_or("Untitled")
        ));
        inv.out.response(format!("📝 Content: {}", post.text));
        inv.out.response(format!(
            "👍 Upvotes: {} | 💬 Replies: {}",
            post.upvotes,
            post.reply_count()
        ));
        if let Some(category) = post.category.as_deref().filter(|c| !c.is_empty()) {
            inv.out.response(format!("🏷️ Category: {category}"));
        }
        if !post.tags.is_empty() {
            inv.out
                .response(format!("🏷️ Tags: {}", post.tags.join(", ")));
        }
    })
}

pub(super) fn list(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        inv.out.response("📋 Listing recent community posts...");
        match inv.ctx.store.list_posts(LIST_LIMIT).await {
            Ok(posts) if posts.is_empty() => {
                inv.out.response("📝 No posts found. Be the first to post!");
            }
            Ok(posts) => {
                for (i, post) in posts.iter().enumerate() {
                    inv.out.response(post_line("Post", i, post));
                }
            }
            Err(e) => inv
                .out
                .response(format!("❌ Failed to fetch posts: {e}")),
        }
    })
}

pub(super) fn delete(mut inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let post_id = inv.param(0).to_string();
        inv.out.response(format!("🗑️ Deleting post {post_id}..."));
        let Some(user) = ensure_profile(&mut inv).await else {
            return;
        };
        match inv.ctx.store.delete_post(&post_id, &user.id).await {
            Ok(_) => inv.out.response("✅ Post deleted successfully!"),
            Err(e) => inv.out.response(format!("❌ Failed to delete post: {e}")),
        }
    })
}

pub(super) fn vote(mut inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let vote_type = inv.param(0).to_string();
        let post_id = inv.param(1).to_string();
        let reason = inv.params.get(2).cloned().filter(|r| !r.is_empty());
        let thumb = if vote_type == "upvote" { "👍" } else { "👎" };
        let suffix = reason
            .as_deref()
            .map(|r| format!(" - Reason: {r}"))
            .unwrap_or_default();
        inv.out
            .response(format!("{thumb} Voting {vote_type} on post {post_id}{suffix}"));

        let Some(user) = ensure_profile(&mut inv).await else {
            return;
        };
        let result = inv
            .ctx
            .store
            .vote(Vote {
                user_id: user.id,
                target_type: "post".into(),
                target_id: post_id,
                vote_type,
                reason,
            })
            .await;
        match result {
            Ok(()) => inv.out.response("✅ Vote recorded successfully!"),
            Err(e) => inv.out.response(format!("❌ Failed to vote: {e}")),
        }
    })
}

pub(super) fn search(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let term = inv.param(0);
        inv.out
            .response(format!("🔍 Searching community for: \"{term}\""));
        match inv.ctx.store.search_posts(term, SEARCH_LIMIT).await {
            Ok(posts) if posts.is_empty() => inv
                .out
                .response(format!("🔍 No posts found matching \"{term}\"")),
            Ok(posts) => {
                inv.out
                    .response(format!("📋 Found {} results:", posts.len()));
                for (i, post) in posts.iter().enumerate() {
                    inv.out.response(post_line("Result", i, post));
                }
            }
            Err(e) => inv.out.response(format!("❌ Search failed: {e}")),
        }
    })
}

#[cfg(test)]
mod tests {
    use crate::console::handlers::tests::{context, run_lines};
    use crate::console::Session;

    fn post_id(line: &str) -> String {
        line.rsplit("ID: ").next().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn post_attaches_avatar_and_is_listed() {
        let (ctx, tmp) = context();
        let mut session = Session::new(&ctx.identity);
        let lines = run_lines(
            &ctx,
            &mut session,
            &[r#"/community-post "hello from the badger""#, "/community-list"],
        )
        .await;
        assert_eq!(lines[0], "📝 Posting to community: \"hello from the badger\"");
        assert!(lines[2].starts_with("✨ Profile image generated: /emoji/1f916-123e4567.png"));
        assert!(lines[3].starts_with("✅ Post created successfully by Anonymous 🤖! ID: "));
        assert!(tmp.path().join("emoji").join("1f916-123e4567.png").exists());
        assert!(lines[5].contains("\"hello from the badger\" - by Unknown"));
    }

    #[tokio::test]
    async fn read_reply_vote_and_search_flow() {
        let (ctx, _tmp) = context();
        let mut session = Session::new(&ctx.identity);
        let created = run_lines(&ctx, &mut session, &[r#"/community-post "badger lore""#]).await;
        let id = post_id(&created[3]);

        let lines = run_lines(
            &ctx,
            &mut session,
            &[
                &format!(r#"/community-reply {id} "nice""#),
                &format!(r#"/community-vote upvote {id} "great read""#),
                &format!("/community-read {id}"),
                "/community-search badger",
            ],
        )
        .await;
        assert!(lines[1].starts_with("✅ Reply posted successfully by Anonymous 🤖!"));
        assert_eq!(
            lines[2],
            format!("👍 Voting upvote on post {id} - Reason: great read")
        );
        assert_eq!(lines[3], "✅ Vote recorded successfully!");
        assert!(lines.contains(&"👍 Upvotes: 1 | 💬 Replies: 1".to_string()));
        assert!(lines.contains(&"📋 Found 1 results:".to_string()));
    }

    #[tokio::test]
    async fn delete_only_removes_own_posts() {
        let (ctx, _tmp) = context();
        let mut author = Session::new(&ctx.identity);
        let created = run_lines(&ctx, &mut author, &[r#"/community-post "mine""#]).await;
        let id = post_id(&created[3]);

        let mut other_identity = ctx.identity.clone();
        other_identity.shared_user_id = Some("someone-else".into());
        let mut stranger = Session::new(&other_identity);
        let denied = run_lines(&ctx, &mut stranger, &[&format!("/community-delete {id}")]).await;
        assert!(denied[1].starts_with("❌ Failed to delete post"));

        let deleted = run_lines(&ctx, &mut author, &[&format!("/community-delete {id}")]).await;
        assert_eq!(deleted[1], "✅ Post deleted successfully!");
        let listed = run_lines(&ctx, &mut author, &["/community-list"]).await;
        assert_eq!(listed[1], "📝 No posts found. Be the first to post!");
    }
}
