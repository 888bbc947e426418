use futures::future::BoxFuture;
use tracing::warn;

use super::{ensure_profile, preview};
use crate::console::registry::Invocation;
use crate::services::store::{NewStory, StoryRecord, StoryUpdate};
use crate::story::slugify;

const LIST_LIMIT: usize = 10;
const SEARCH_LIMIT: usize = 5;
const PREVIEW_CHARS: usize = 50;
const AI_TAG: &str = "ai-generated";

fn story_line(label: &str, index: usize, story: &StoryRecord) -> String {
    format!(
        "• {label} {} [{}]: \"{}\" - {} (by {})",
        index + 1,
        story.slug,
        story.title,
        preview(story.description.as_deref().unwrap_or(""), PREVIEW_CHARS),
        story.author_name()
    )
}

pub(super) fn create(mut inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let title = inv.param(0).to_string();
        inv.out.response(format!("📝 Creating story: \"{title}\""));
        let Some(user) = ensure_profile(&mut inv).await else {
            return;
        };
        let created = inv
            .ctx
            .store
            .create_story(NewStory {
                author_id: user.id,
                slug: slugify(&title),
                description: format!(
                    "AI-generated story created by {}",
                    inv.session.display_name
                ),
                title,
                is_public: true,
                tags: vec![AI_TAG.to_string()],
            })
            .await;
        match created {
            Ok(story) => {
                inv.session.story_count += 1;
                inv.out.response(format!(
                    "✅ Story created successfully! ID: {}, Slug: {}",
                    story.id, story.slug
                ));
            }
            Err(e) => {
                warn!(err = %e, "create story failed");
                inv.out.response(format!("❌ Failed to create story: {e}"));
            }
        }
    })
}

pub(super) fn edit(mut inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let slug = inv.param(0).to_string();
        let new_title = inv.param(1).to_string();
        inv.out.response(format!(
            "✏️ Editing story \"{slug}\" with new title: \"{new_title}\""
        ));
        let Some(user) = ensure_profile(&mut inv).await else {
            return;
        };
        let existing = match inv.ctx.store.story_by_slug(&slug).await {
            Ok(story) => story,
            Err(e) => {
                inv.out.response(format!("❌ Story not found: {e}"));
                return;
            }
        };
        if existing.author_id != user.id {
            inv.out
                .response("❌ Permission denied: You can only edit your own stories");
            return;
        }
        let updated = inv
            .ctx
            .store
            .update_story(
                &existing.id,
                StoryUpdate {
                    title: new_title,
                    description: format!("Updated by AI user {}", inv.session.display_name),
                },
            )
            .await;
        match updated {
            Ok(story) => inv
                .out
                .response(format!("✅ Story \"{}\" updated successfully!", story.title)),
            Err(e) => inv.out.response(format!("❌ Failed to update story: {e}")),
        }
    })
}

pub(super) fn list(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        inv.out.response("📋 Listing recent stories...");
        match inv.ctx.store.list_stories(LIST_LIMIT, true).await {
            Ok(stories) if stories.is_empty() => inv
                .out
                .response("📋 No stories found. Create the first one!"),
            Ok(stories) => {
                for (i, story) in stories.iter().enumerate() {
                    inv.out.response(story_line("Story", i, story));
                }
            }
            Err(e) => inv
                .out
                .response(format!("❌ Failed to fetch stories: {e}")),
        }
    })
}

pub(super) fn read(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let slug = inv.param(0);
        inv.out.response(format!("📖 Reading story \"{slug}\"..."));
        let story = match inv.ctx.store.story_by_slug(slug).await {
            Ok(story) => story,
            Err(e) => {
                inv.out.response(format!("❌ Story not found: {e}"));
                return;
            }
        };
        inv.out
            .response(format!("🎭 \"{}\" by {}", story.title, story.author_name()));
        inv.out.response(format!(
            "📝 Description: {}",
            story
                .description
                .as_deref()
                .filter(|d| !d.is_empty())
                .unwrap_or("No description")
        ));
        if !story.tags.is_empty() {
            inv.out
                .response(format!("🏷️ Tags: {}", story.tags.join(", ")));
        }
        inv.out
            .response(format!("🔗 Play at: /story/{}", story.slug));
        inv.out.response(format!(
            "📊 Stats: {} plays, {} likes",
            story.play_count, story.like_count
        ));
    })
}

pub(super) fn search(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let term = inv.param(0);
        inv.out
            .response(format!("🔍 Searching stories for: \"{term}\""));
        match inv.ctx.store.search_stories(term, SEARCH_LIMIT).await {
            Ok(stories) if stories.is_empty() => inv
                .out
                .response(format!("🔍 No stories found matching \"{term}\"")),
            Ok(stories) => {
                inv.out
                    .response(format!("📋 Found {} results:", stories.len()));
                for (i, story) in stories.iter().enumerate() {
                    inv.out.response(story_line("Result", i, story));
                }
            }
            Err(e) => inv.out.response(format!("❌ Search failed: {e}")),
        }
    })
}

pub(super) fn fork(mut inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let original_slug = inv.param(0).to_string();
        let fork_title = inv.param(1).to_string();
        inv.out.response(format!(
            "🍴 Forking story \"{original_slug}\" as \"{fork_title}\"..."
        ));
        let Some(user) = ensure_profile(&mut inv).await else {
            return;
        };
        let original = match inv.ctx.store.story_by_slug(&original_slug).await {
            Ok(story) => story,
            Err(e) => {
                inv.out
                    .response(format!("❌ Original story not found: {e}"));
                return;
            }
        };
        let forked = inv
            .ctx
            .store
            .fork_story(
                &original.id,
                NewStory {
                    author_id: user.id,
                    slug: slugify(&fork_title),
                    description: format!(
                        "Fork of \"{}\" by {}",
                        original.title, inv.session.display_name
                    ),
                    title: fork_title,
                    is_public: true,
                    tags: Vec::new(),
                },
            )
            .await;
        match forked {
            Ok(story) => {
                inv.session.story_count += 1;
                inv.out.response(format!(
                    "✅ Story forked successfully! New story: {}",
                    story.slug
                ));
            }
            Err(e) => inv.out.response(format!("❌ Failed to fork story: {e}")),
        }
    })
}

#[cfg(test)]
mod tests {
    use crate::console::handlers::tests::{context, run_lines};
    use crate::console::Session;

    #[tokio::test]
    async fn create_list_read_and_count() {
        let (ctx, _tmp) = context();
        let mut session = Session::new(&ctx.identity);
        let lines = run_lines(
            &ctx,
            &mut session,
            &[
                "/profile-name Badger",
                r#"/story-create "The Badger's Tale""#,
                "/story-list",
                "/story-read the-badger-s-tale",
            ],
        )
        .await;
        assert!(lines[2].ends_with("Slug: the-badger-s-tale"));
        assert_eq!(session.story_count, 1);
        assert!(lines[4].starts_with("• Story 1 [the-badger-s-tale]: \"The Badger's Tale\" - AI-generated story created by Badger"));
        assert!(lines.contains(&"🔗 Play at: /story/the-badger-s-tale".to_string()));
        assert!(lines.contains(&"🏷️ Tags: ai-generated".to_string()));
    }

    #[tokio::test]
    async fn edit_requires_ownership() {
        let (ctx, _tmp) = context();
        let mut owner = Session::new(&ctx.identity);
        run_lines(&ctx, &mut owner, &[r#"/story-create "Mine""#]).await;

        let mut other_identity = ctx.identity.clone();
        other_identity.shared_user_id = Some("intruder".into());
        let mut intruder = Session::new(&other_identity);
        let denied = run_lines(&ctx, &mut intruder, &[r#"/story-edit mine "Stolen""#]).await;
        assert_eq!(
            denied[1],
            "❌ Permission denied: You can only edit your own stories"
        );

        let edited = run_lines(&ctx, &mut owner, &[r#"/story-edit mine "Still Mine""#]).await;
        assert_eq!(edited[1], "✅ Story \"Still Mine\" updated successfully!");
    }

    #[tokio::test]
    async fn fork_creates_new_story_and_reports_missing_original() {
        let (ctx, _tmp) = context();
        let mut session = Session::new(&ctx.identity);
        let lines = run_lines(
            &ctx,
            &mut session,
            &[
                r#"/story-create "Origin""#,
                r#"/story-fork origin "Origin Remix""#,
                r#"/story-fork nowhere "Lost""#,
            ],
        )
        .await;
        assert_eq!(lines[3], "✅ Story forked successfully! New story: origin-remix");
        assert!(lines[5].starts_with("❌ Original story not found"));
        assert_eq!(session.story_count, 2);

        let fork = ctx.store.story_by_slug("origin-remix").await.expect("fork");
        assert_eq!(fork.tags, vec!["ai-generated".to_string()]);
        assert!(fork.attributes.get("forked_from").is_some());
    }
}
