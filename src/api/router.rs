use super::*;

pub(super) fn build_router(state: AppState, security: ApiSecurity) -> Router {
    Router::new()
        .route("/console", get(console_socket))
        .route("/scripts/execute", post(execute_script))
        .route("/scripts/stream", post(stream_script))
        .route("/stories", get(list_stories))
        .route("/stories/{slug}", get(get_story).delete(delete_story))
        .route("/stories/{slug}/exists", get(story_exists))
        .route("/stories/{slug}/media", get(list_story_media))
        .route("/emoji/{file}", get(get_emoji))
        .route("/docs", get(get_docs))
        .with_state(state)
        .layer(middleware::from_fn_with_state(security, api_guard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::util::ServiceExt;

    use crate::console::handlers::default_registry;
    use crate::console::testing::test_context;
    use crate::scripting::ExecutionLimits;
    use crate::story::media::tests::FakeMedia;
    use crate::story::store::ArtifactStore;

    fn app() -> (Router, tempfile::TempDir) {
        let (console, tmp) = test_context(default_registry().expect("registry"));
        let executor = ScriptExecutor::new(
            ExecutionLimits::default(),
            ArtifactStore::new(tmp.path().join("stories")),
            Arc::new(FakeMedia::new(false)),
        );
        let security = ApiSecurity::new(&SecurityConfig {
            required_token: None,
            rate_limit_per_sec: 1_000,
        });
        (build_router(AppState::new(console, executor), security), tmp)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, Vec<u8>) {
        let builder = HttpRequest::builder().method(method).uri(uri);
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        let res = app.clone().oneshot(req).await.expect("response");
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, bytes.to_vec())
    }

    async fn call_json(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let (status, bytes) = call(app, method, uri, body).await;
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn docs_list_every_console_command() {
        let (app, _tmp) = app();
        let (status, body) = call_json(&app, "GET", "/docs", None).await;
        assert_eq!(status, StatusCode::OK);
        let commands = body["data"]["commands"].as_array().expect("commands");
        assert_eq!(commands.len(), 20);
        assert!(commands
            .iter()
            .any(|c| c["name"] == "community-vote" && c["paramCounts"] == serde_json::json!([2, 3])));
    }

    #[tokio::test]
    async fn executed_script_is_browsable_and_deletable() {
        let (app, _tmp) = app();
        let script = r#"
            local story = Story.create("Router Tale", "via http")
            story:addScene("start"):setText("Hello."):addEvent("intro.jpg")
            story:publish()
        "#;
        let (status, body) = call_json(
            &app,
            "POST",
            "/scripts/execute",
            Some(serde_json::json!({ "code": script })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["data"]["result"]["storiesCreated"], 1);
        let logs = body["data"]["logs"].as_array().expect("logs");
        assert_eq!(logs[0], "📖 Story created: Router Tale");

        let (_, listed) = call_json(&app, "GET", "/stories", None).await;
        assert_eq!(listed["data"][0]["slug"], "router-tale");
        assert_eq!(listed["data"][0]["description"], "via http");

        let (status, story) = call_json(&app, "GET", "/stories/router-tale", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(story["data"]["scenes"][0]["text"], "Hello.");

        let (_, exists) = call_json(&app, "GET", "/stories/router-tale/exists", None).await;
        assert_eq!(exists["data"]["exists"], true);

        let (status, _) = call_json(&app, "DELETE", "/stories/router-tale", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, missing) = call_json(&app, "GET", "/stories/router-tale", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(missing["ok"], false);
    }

    #[tokio::test]
    async fn script_failures_are_reported_in_the_envelope() {
        let (app, _tmp) = app();
        let (status, body) = call_json(
            &app,
            "POST",
            "/scripts/execute",
            Some(serde_json::json!({ "code": "error('nope')" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], false);
        assert!(body["error"].as_str().is_some_and(|e| e.contains("nope")));
        assert_eq!(body["data"]["result"]["outcome"], "faulted");

        let (status, _) = call_json(
            &app,
            "POST",
            "/scripts/execute",
            Some(serde_json::json!({ "code": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_slugs_are_rejected() {
        let (app, _tmp) = app();
        let (status, body) = call_json(&app, "GET", "/stories/Bad.Slug", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn stream_emits_logs_then_result() {
        let (app, _tmp) = app();
        let (status, bytes) = call(
            &app,
            "POST",
            "/scripts/stream",
            Some(serde_json::json!({ "code": "print('streamed')" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(bytes).expect("utf8");
        let log_at = text.find("event: log\ndata: streamed").expect("log event");
        let result_at = text.find("event: result").expect("result event");
        assert!(log_at < result_at);
    }

    #[tokio::test]
    async fn emoji_route_serves_rendered_avatars_only() {
        let (app, tmp) = app();
        let renderer = crate::services::AvatarRenderer::new(tmp.path().join("emoji"));
        let avatar = renderer.avatar_for("🦡", "user-1").expect("render");

        let (status, bytes) = call(&app, "GET", &avatar.url, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));

        let (status, _) = call(&app, "GET", "/emoji/missing.png", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
