//! Console command handlers. Every handler reports its own failures as
//! response lines; nothing propagates back to the dispatcher.

mod chat;
mod community;
mod profile;
mod story;
mod system;

use tracing::warn;

use super::registry::{CommandRegistry, Invocation, RegistryError};
use crate::services::store::{ProfileRequest, UserProfile};

pub const HELP_TOPICS: &[&str] = &[
    "greeting",
    "detail",
    "system",
    "community",
    "chat",
    "code",
    "story",
    "profile",
];

/// The full console command table.
pub fn default_registry() -> Result<CommandRegistry, RegistryError> {
    let mut r = CommandRegistry::new();
    r.register("system", "help", &[0, 1], "/system-help [topic]", system::help)?;
    r.register("system", "status", &[0], "/system-status", system::status)?;
    r.register("system", "whoami", &[0], "/system-whoami", system::whoami)?;
    r.register("system", "quit", &[0], "/system-quit", system::quit)?;

    r.register("profile", "name", &[1], "/profile-name <name>", profile::name)?;
    r.register("profile", "emoji", &[1], "/profile-emoji <emoji>", profile::emoji)?;

    r.register("community", "post", &[1], "/community-post <message>", community::post)?;
    r.register(
        "community",
        "reply",
        &[2],
        "/community-reply <post id> <message>",
        community::reply,
    )?;
    r.register("community", "read", &[1], "/community-read <post id>", community::read)?;
    r.register("community", "list", &[0], "/community-list", community::list)?;
    r.register(
        "community",
        "delete",
        &[1],
        "/community-delete <post id>",
        community::delete,
    )?;
    r.register(
        "community",
        "vote",
        &[2, 3],
        "/community-vote <upvote|downvote> <post id> [reason]",
        community::vote,
    )?;
    r.register("community", "search", &[1], "/community-search <term>", community::search)?;

    r.register("chat", "broadcast", &[1], "/chat-broadcast <message>", chat::broadcast)?;

    r.register("story", "create", &[1], "/story-create <title>", story::create)?;
    r.register("story", "edit", &[2], "/story-edit <slug> <new title>", story::edit)?;
    r.register("story", "list", &[0], "/story-list", story::list)?;
    r.register("story", "read", &[1], "/story-read <slug>", story::read)?;
    r.register("story", "search", &[1], "/story-search <term>", story::search)?;
    r.register("story", "fork", &[2], "/story-fork <slug> <new title>", story::fork)?;
    Ok(r)
}

/// Finds or creates the acting user's record and adopts its id for the
/// session. Emits the failure line itself.
async fn ensure_profile(inv: &mut Invocation<'_>) -> Option<UserProfile> {
    let request = ProfileRequest {
        id: Some(inv.session.user_id.clone()),
        email: inv.session.profile_email(&inv.ctx.identity),
        username: inv.session.display_name.clone(),
    };
    match inv.ctx.store.ensure_user_profile(&request).await {
        Ok(user) => {
            inv.session.assign_identity(&user.id);
            Some(user)
        }
        Err(e) => {
            warn!(command = %inv.command, err = %e, "failed to ensure user profile");
            inv.out
                .response(format!("❌ Failed to create user profile: {e}"));
            None
        }
    }
}

/// First `max` characters of `text`, with `...` when cut.
fn preview(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::console::responder::{drain_frames, ConsoleFrame};
    use crate::console::testing::test_context;
    use crate::console::{dispatch, ConsoleContext, Responder, Session};

    /// Runs `lines` in order on one session and returns every response line.
    pub(crate) async fn run_lines(
        ctx: &ConsoleContext,
        session: &mut Session,
        lines: &[&str],
    ) -> Vec<String> {
        let (out, mut rx) = Responder::channel();
        for line in lines {
            dispatch(line, session, ctx, &out).await;
        }
        drain_frames(&mut rx)
            .into_iter()
            .filter_map(|f| match f {
                ConsoleFrame::Response(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn context() -> (ConsoleContext, tempfile::TempDir) {
        test_context(default_registry().expect("registry"))
    }

    #[test]
    fn full_command_table_is_registered() {
        let registry = default_registry().expect("registry");
        assert_eq!(registry.len(), 20);
        let vote = registry.lookup("community", "vote").expect("vote");
        assert_eq!(vote.param_counts, vec![2, 3]);
        let help = registry.lookup("system", "help").expect("help");
        assert_eq!(help.param_counts, vec![0, 1]);
    }

    #[test]
    fn preview_counts_characters() {
        assert_eq!(preview("short", 60), "short");
        assert_eq!(preview("🦡🦡🦡", 2), "🦡🦡...");
    }
}
