use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::IdentityConfig;

/// Where a session's user id came from, in precedence order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentitySource {
    /// Resolved from the backing store for this session.
    Assigned,
    /// The configured default identity, possibly shared by many sessions.
    ConfiguredDefault,
    /// Freshly minted for this connection.
    Minted,
}

/// Mutable per-connection state. Only the owning connection touches it.
#[derive(Clone, Debug)]
pub struct Session {
    pub connection_id: Uuid,
    pub user_id: String,
    pub identity_source: IdentitySource,
    pub display_name: String,
    pub emoji: Option<String>,
    pub story_count: u32,
    pub started_at: DateTime<Utc>,
    pub quit_requested: bool,
}

impl Session {
    pub fn new(identity: &IdentityConfig) -> Self {
        let (user_id, identity_source) = match &identity.shared_user_id {
            Some(id) => (id.clone(), IdentitySource::ConfiguredDefault),
            None => (Uuid::new_v4().to_string(), IdentitySource::Minted),
        };
        Self {
            connection_id: Uuid::new_v4(),
            user_id,
            identity_source,
            display_name: identity.default_name.clone(),
            emoji: None,
            story_count: 0,
            started_at: Utc::now(),
            quit_requested: false,
        }
    }

    pub fn assign_identity(&mut self, user_id: &str) {
        self.user_id = user_id.to_string();
        self.identity_source = IdentitySource::Assigned;
    }

    pub fn is_shared_identity(&self) -> bool {
        self.identity_source == IdentitySource::ConfiguredDefault
    }

    /// Email used when the store needs to create a user record.
    pub fn profile_email(&self, identity: &IdentityConfig) -> String {
        identity
            .default_email
            .clone()
            .unwrap_or_else(|| format!("ai_{}@storydesigner.ai", self.connection_id.simple()))
    }

    pub fn emoji_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.emoji.as_deref().unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(shared: Option<&str>) -> IdentityConfig {
        IdentityConfig {
            shared_user_id: shared.map(str::to_string),
            default_email: None,
            default_name: "Anonymous".into(),
            default_avatar: "🤖".into(),
        }
    }

    #[test]
    fn configured_default_wins_over_minting() {
        let session = Session::new(&identity(Some("shared-id")));
        assert_eq!(session.user_id, "shared-id");
        assert!(session.is_shared_identity());

        let minted = Session::new(&identity(None));
        assert_eq!(minted.identity_source, IdentitySource::Minted);
        assert!(Uuid::parse_str(&minted.user_id).is_ok());
    }

    #[test]
    fn assigned_identity_replaces_default() {
        let mut session = Session::new(&identity(Some("shared-id")));
        session.assign_identity("user-7");
        assert_eq!(session.user_id, "user-7");
        assert!(!session.is_shared_identity());
    }

    #[test]
    fn profile_email_falls_back_to_connection() {
        let session = Session::new(&identity(None));
        let email = session.profile_email(&identity(None));
        assert!(email.starts_with("ai_") && email.ends_with("@storydesigner.ai"));
    }
}
