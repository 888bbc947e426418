use futures::future::BoxFuture;
use tracing::warn;

use crate::console::registry::Invocation;
use crate::services::store::ProfileRequest;

pub(super) fn name(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let new_name = inv.param(0).to_string();
        inv.session.display_name = new_name.clone();
        inv.out
            .response(format!("✅ Profile name updated to: {new_name}"));
    })
}

/// Stores the glyph on the session and, best effort, on the user record.
pub(super) fn emoji(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let new_emoji = inv.param(0).to_string();
        inv.session.emoji = Some(new_emoji.clone());

        let request = ProfileRequest {
            id: Some(inv.session.user_id.clone()),
            email: inv.session.profile_email(&inv.ctx.identity),
            username: inv.session.display_name.clone(),
        };
        let persisted = match inv.ctx.store.ensure_user_profile(&request).await {
            Ok(user) => {
                inv.session.assign_identity(&user.id);
                inv.ctx.store.set_user_emoji(&user.id, &new_emoji).await
            }
            Err(e) => Err(e),
        };
        match persisted {
            Ok(()) => inv
                .out
                .response(format!("✅ Profile emoji updated to: {new_emoji}")),
            Err(e) => {
                warn!(err = %e, "failed to persist profile emoji");
                inv.out.response(format!(
                    "⚠️ Emoji updated in session but database update failed: {e}"
                ));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use crate::console::handlers::tests::{context, run_lines};
    use crate::console::{IdentitySource, Session};

    #[tokio::test]
    async fn emoji_is_persisted_for_later_sessions() {
        let (ctx, _tmp) = context();
        let mut session = Session::new(&ctx.identity);
        let lines = run_lines(&ctx, &mut session, &[r#"/profile-emoji "🦡""#]).await;
        assert_eq!(lines, vec!["✅ Profile emoji updated to: 🦡"]);
        assert_eq!(session.identity_source, IdentitySource::Assigned);
        assert_eq!(
            ctx.store.user_emoji(&session.user_id).await.expect("emoji"),
            Some("🦡".to_string())
        );
    }

    #[tokio::test]
    async fn unquoted_emoji_is_not_a_token() {
        let (ctx, _tmp) = context();
        let mut session = Session::new(&ctx.identity);
        let lines = run_lines(&ctx, &mut session, &["/profile-emoji 🦡"]).await;
        assert_eq!(
            lines,
            vec!["❌ Invalid number of parameters for profile-emoji. Expected one of: 1"]
        );
    }
}
