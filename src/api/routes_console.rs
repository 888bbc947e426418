use super::*;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::console::{dispatch, greeting, Session};

pub(super) async fn console_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| console_session(socket, state))
}

/// One console connection. Messages are handled one at a time in arrival
/// order; chat from other connections is interleaved by a separate task.
async fn console_session(socket: WebSocket, state: AppState) {
    let (mut ws_w, mut ws_r) = socket.split();
    let (out, mut rx) = Responder::channel();
    let mut session = Session::new(&state.console.identity);
    let connection = session.connection_id;
    info!(%connection, user = %session.user_id, "console connected");

    let writer = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Outbound::Frame(frame) => {
                    let payload = match serde_json::to_string(&frame) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(err = %e, "failed to encode console frame");
                            continue;
                        }
                    };
                    if ws_w.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_w.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let mut chat = state.console.chat.subscribe();
    let chat_out = out.clone();
    let chat_forwarder = tokio::spawn(async move {
        loop {
            match chat.recv().await {
                Ok(message) if message.from != connection => chat_out.response(message.render()),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%connection, skipped, "chat receiver lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    for line in greeting(&session) {
        out.response(line);
    }

    while let Some(message) = ws_r.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text.as_str().to_string(),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        match ConsoleRequest::parse(&text) {
            ConsoleRequest::Command { line } => {
                info!(%connection, line = %line, "command received");
                dispatch(&line, &mut session, &state.console, &out).await;
            }
            ConsoleRequest::Execute { code } => execute_for_console(&state, code, &out).await,
        }
        if session.quit_requested {
            break;
        }
    }

    chat_forwarder.abort();
    let _ = chat_forwarder.await;
    drop(out);
    let _ = writer.await;
    info!(%connection, stories = session.story_count, "console disconnected");
}
