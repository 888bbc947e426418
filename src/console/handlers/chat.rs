use futures::future::BoxFuture;
use tracing::info;

use crate::console::registry::Invocation;
use crate::console::ChatMessage;

pub(super) fn broadcast(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let text = inv.param(0).to_string();
        inv.out
            .response(format!("📢 Broadcasting message: \"{text}\""));
        let message = ChatMessage {
            from: inv.session.connection_id,
            author: inv.session.display_name.clone(),
            emoji: inv
                .session
                .emoji_or(&inv.ctx.identity.default_avatar)
                .to_string(),
            text,
        };
        // No subscribers is not an error; the sender is the only session.
        let receivers = inv.ctx.chat.send(message).unwrap_or(0);
        info!(connection = %inv.session.connection_id, receivers, "chat broadcast");
        inv.out
            .response("✅ Message broadcasted to all connected users!");
    })
}

#[cfg(test)]
mod tests {
    use crate::console::handlers::tests::{context, run_lines};
    use crate::console::Session;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let (ctx, _tmp) = context();
        let mut first = ctx.chat.subscribe();
        let mut second = ctx.chat.subscribe();
        let mut session = Session::new(&ctx.identity);

        let lines = run_lines(
            &ctx,
            &mut session,
            &["/profile-name Badger", r#"/chat-broadcast "hello all""#],
        )
        .await;
        assert_eq!(lines[1], "📢 Broadcasting message: \"hello all\"");
        assert_eq!(lines[2], "✅ Message broadcasted to all connected users!");

        for rx in [&mut first, &mut second] {
            let msg = rx.try_recv().expect("chat message");
            assert_eq!(msg.render(), "💬 [Badger 🤖]: hello all");
            assert_eq!(msg.from, session.connection_id);
        }
    }
}
