use chrono::Utc;
use futures::future::BoxFuture;
use std::path::Path;
use tracing::{info, warn};

use super::HELP_TOPICS;
use crate::console::registry::Invocation;
use crate::console::Responder;

const MAIN_HELP_FILE: &str = "help.md";

fn help_fallback() -> String {
    let mut text = String::from("❌ Help file not available. Basic commands:\n\n## To display help\n");
    for topic in HELP_TOPICS.iter().filter(|t| **t != "code") {
        text.push_str(&format!("- /system-help {topic}\n"));
    }
    text
}

async fn display_file(path: &Path, out: &Responder) {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => out.response(content),
        Err(e) => {
            warn!(path = %path.display(), err = %e, "help file read failed");
            out.response(help_fallback());
        }
    }
}

pub(super) fn help(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        display_file(&inv.ctx.help_dir.join(MAIN_HELP_FILE), inv.out).await;
        if let Some(topic) = inv.params.first() {
            inv.out
                .response(format!("\n📖 Detailed help for: {topic}"));
            if HELP_TOPICS.contains(&topic.as_str()) {
                display_file(&inv.ctx.help_dir.join(format!("{topic}.md")), inv.out).await;
            } else {
                inv.out.response(help_fallback());
            }
        }
    })
}

pub(super) fn status(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let session = &*inv.session;
        inv.out.response(format!(
            "\n📊 Session Status:\n• Connection: Active\n• User: {}\n• Session Time: {}\n• Stories Created: {}\n",
            session.display_name,
            Utc::now().to_rfc3339(),
            session.story_count
        ));
    })
}

pub(super) fn whoami(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let session = &*inv.session;
        inv.out.response(format!(
            "\n👤 Current User: {} ({}) \n🎭 Profile Emoji: {}\n",
            session.display_name,
            session.user_id,
            session.emoji_or(&inv.ctx.identity.default_avatar)
        ));
    })
}

pub(super) fn quit(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        inv.out.response(
            "\n👋 Ending session gracefully...\nThank you for using AI Story Interface!\n",
        );
        inv.session.quit_requested = true;
        info!(connection = %inv.session.connection_id, "console session quit");
        inv.out.close();
    })
}

#[cfg(test)]
mod tests {
    use crate::console::handlers::tests::{context, run_lines};
    use crate::console::responder::{drain_frames, ConsoleFrame};
    use crate::console::{dispatch, Outbound, Responder, Session};

    #[tokio::test]
    async fn help_reads_main_and_topic_files() {
        let (ctx, _tmp) = context();
        std::fs::create_dir_all(&ctx.help_dir).expect("mkdir");
        std::fs::write(ctx.help_dir.join("help.md"), "# Help").expect("write");
        std::fs::write(ctx.help_dir.join("story.md"), "# Story help").expect("write");
        let mut session = Session::new(&ctx.identity);

        let lines = run_lines(&ctx, &mut session, &["/system-help story"]).await;
        assert_eq!(
            lines,
            vec!["# Help", "\n📖 Detailed help for: story", "# Story help"]
        );
    }

    #[tokio::test]
    async fn missing_help_falls_back_to_topic_listing() {
        let (ctx, _tmp) = context();
        let mut session = Session::new(&ctx.identity);
        let lines = run_lines(&ctx, &mut session, &["/system-help nonsense"]).await;
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("❌ Help file not available"));
        assert!(lines[0].contains("/system-help community"));
    }

    #[tokio::test]
    async fn whoami_and_status_reflect_session() {
        let (ctx, _tmp) = context();
        let mut session = Session::new(&ctx.identity);
        let lines = run_lines(
            &ctx,
            &mut session,
            &["/profile-name Badger", "/system-whoami", "/system-status"],
        )
        .await;
        assert!(lines[1].contains("Current User: Badger (123e4567-e89b-12d3-a456-426614174000)"));
        assert!(lines[1].contains("Profile Emoji: 🤖"));
        assert!(lines[2].contains("• User: Badger"));
        assert!(lines[2].contains("• Stories Created: 0"));
    }

    #[tokio::test]
    async fn quit_closes_the_connection() {
        let (ctx, _tmp) = context();
        let mut session = Session::new(&ctx.identity);
        let (out, mut rx) = Responder::channel();
        dispatch("/system-quit", &mut session, &ctx, &out).await;
        assert!(session.quit_requested);
        assert!(matches!(
            rx.try_recv(),
            Ok(Outbound::Frame(ConsoleFrame::Response(ref s))) if s.contains("Ending session")
        ));
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Close));
        assert!(drain_frames(&mut rx).is_empty());
    }
}
