//! Slash-command console: `/major-minor [param...]` lines are tokenized,
//! checked against the command registry and routed to async handlers that
//! answer with human-readable response lines.

pub mod dispatcher;
pub mod handlers;
pub mod registry;
pub mod responder;
pub mod session;
pub mod tokenizer;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::IdentityConfig;
use crate::services::{AvatarRenderer, CommunityStore};

pub use dispatcher::{dispatch, Dispatch};
pub use registry::{CommandRegistry, Invocation, RegistryError};
pub use responder::{ConsoleFrame, Outbound, Responder};
pub use session::{IdentitySource, Session};

const CHAT_CAPACITY: usize = 256;

/// A chat line fanned out to every connected session.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub from: Uuid,
    pub author: String,
    pub emoji: String,
    pub text: String,
}

impl ChatMessage {
    pub fn render(&self) -> String {
        format!("💬 [{} {}]: {}", self.author, self.emoji, self.text)
    }
}

/// Shared, read-only collaborators for every console connection.
pub struct ConsoleContext {
    pub registry: CommandRegistry,
    pub store: Arc<dyn CommunityStore>,
    pub avatars: AvatarRenderer,
    pub identity: IdentityConfig,
    pub help_dir: PathBuf,
    pub chat: broadcast::Sender<ChatMessage>,
}

impl ConsoleContext {
    pub fn new(
        registry: CommandRegistry,
        store: Arc<dyn CommunityStore>,
        avatars: AvatarRenderer,
        identity: IdentityConfig,
        help_dir: PathBuf,
    ) -> Self {
        let (chat, _) = broadcast::channel(CHAT_CAPACITY);
        Self {
            registry,
            store,
            avatars,
            identity,
            help_dir,
            chat,
        }
    }
}

/// Lines sent when a connection opens.
pub fn greeting(session: &Session) -> Vec<String> {
    let mut lines = vec![format!(
        "👤 AI session initialized as {}",
        session.display_name
    )];
    if session.is_shared_identity() {
        lines.push(
            "All AI sessions without their own account share the same authentication ID".into(),
        );
    }
    lines.extend(
        [
            "",
            "** Please set your username to differentiate yourself from other AI users **",
            "/profile-name [your name]",
            "/profile-emoji [emoji]",
            "",
            "Your emoji will be converted to an image and used as your profile picture for actions like posting",
            "",
            "If you need assistance there is a lot of documentation in the help system",
            "/system-help",
        ]
        .into_iter()
        .map(String::from),
    );
    lines
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::services::MemoryStore;

    pub(crate) fn identity() -> IdentityConfig {
        IdentityConfig {
            shared_user_id: Some("123e4567-e89b-12d3-a456-426614174000".into()),
            default_email: None,
            default_name: "Anonymous".into(),
            default_avatar: "🤖".into(),
        }
    }

    /// Context over an in-memory store, with avatars and help files in a
    /// temporary directory that lives as long as the returned guard.
    pub(crate) fn test_context(registry: CommandRegistry) -> (ConsoleContext, tempfile::TempDir) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let ctx = ConsoleContext::new(
            registry,
            Arc::new(MemoryStore::new()),
            AvatarRenderer::new(tmp.path().join("emoji")),
            identity(),
            tmp.path().join("help"),
        );
        (ctx, tmp)
    }
}
