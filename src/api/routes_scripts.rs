use super::*;

/// The frame that closes a script run on a streaming transport.
pub(super) fn terminal_frame(result: &ExecutionResult) -> ConsoleFrame {
    if result.success {
        ConsoleFrame::Result(serde_json::json!({
            "success": true,
            "storiesCreated": result.stories_created,
            "stories": result.stories,
        }))
    } else {
        ConsoleFrame::Error(format!(
            "❌ Execution error: {}",
            result.error.as_deref().unwrap_or("unknown error")
        ))
    }
}

/// Runs `code` for a console connection, streaming logs and then the
/// terminal frame to `out`.
pub(super) async fn execute_for_console(state: &AppState, code: String, out: &Responder) {
    info!(bytes = code.len(), "executing console script");
    let result = state.executor.execute(code, out.clone()).await;
    out.frame(terminal_frame(&result));
}

pub(super) async fn execute_script(
    State(state): State<AppState>,
    Json(req): Json<ScriptRequest>,
) -> (StatusCode, Json<ApiResponse<ScriptReport>>) {
    if req.code.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::failure("No code provided")),
        );
    }
    let (out, mut rx) = Responder::channel();
    let result = state.executor.execute(req.code, out).await;
    let logs = crate::console::responder::drain_frames(&mut rx)
        .into_iter()
        .filter_map(|frame| match frame {
            ConsoleFrame::Log(line) | ConsoleFrame::Response(line) => Some(line),
            _ => None,
        })
        .collect();

    let error = result.error.clone();
    let report = ScriptReport { result, logs };
    match error {
        None => (StatusCode::OK, Json(ApiResponse::success(report))),
        Some(e) => (
            StatusCode::OK,
            Json(ApiResponse {
                ok: false,
                data: Some(report),
                error: Some(e),
            }),
        ),
    }
}

pub(super) async fn stream_script(
    State(state): State<AppState>,
    Json(req): Json<ScriptRequest>,
) -> impl IntoResponse {
    let (out, mut rx) = Responder::channel();
    let executor = state.executor.clone();
    // The run owns the only sender, so the stream ends when it finishes.
    tokio::spawn(async move {
        let result = executor.execute(req.code, out.clone()).await;
        out.frame(terminal_frame(&result));
    });

    let stream = async_stream::stream! {
        while let Some(item) = rx.recv().await {
            let Outbound::Frame(frame) = item else {
                break;
            };
            let payload = match &frame {
                ConsoleFrame::Result(value) => value.to_string(),
                ConsoleFrame::Log(line) | ConsoleFrame::Response(line) | ConsoleFrame::Error(line) => {
                    line.clone()
                }
            };
            yield Ok::<SseEvent, Infallible>(SseEvent::default().event(frame.event_name()).data(payload));
        }
    };
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(5))
            .text("keep-alive"),
    )
}
