use super::*;

/// Table size past which stale buckets are swept on the next request.
const BUCKET_SWEEP_THRESHOLD: usize = 4096;

#[derive(Clone)]
pub(super) struct ApiSecurity {
    pub required_token: Option<String>,
    pub rate_limit_per_sec: u32,
    pub buckets: Arc<Mutex<HashMap<String, RateBucket>>>,
}

#[derive(Clone)]
pub(super) struct RateBucket {
    pub window_start: std::time::Instant,
    pub count: u32,
}

impl ApiSecurity {
    pub(super) fn new(config: &SecurityConfig) -> Self {
        Self {
            required_token: config.required_token.clone(),
            rate_limit_per_sec: config.rate_limit_per_sec.max(1),
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn authorized(&self, req: &Request) -> bool {
        let Some(expected) = self.required_token.as_deref() else {
            return true;
        };
        let auth_header = header_value(req, "authorization");
        let bearer = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .unwrap_or(auth_header);
        bearer == expected || header_value(req, "x-api-key") == expected
    }

    /// Counts one request against `key`'s one-second window.
    fn admit(&self, key: String) -> bool {
        let Ok(mut buckets) = self.buckets.lock() else {
            return true;
        };
        let now = std::time::Instant::now();
        let entry = buckets.entry(key).or_insert(RateBucket {
            window_start: now,
            count: 0,
        });
        if now.duration_since(entry.window_start).as_secs_f32() >= 1.0 {
            entry.window_start = now;
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);
        let admitted = entry.count <= self.rate_limit_per_sec;

        if buckets.len() > BUCKET_SWEEP_THRESHOLD {
            buckets.retain(|_, v| now.duration_since(v.window_start).as_secs_f32() < 10.0);
        }
        admitted
    }
}

fn header_value<'a>(req: &'a Request, name: &str) -> &'a str {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("")
}

pub(super) async fn api_guard(
    State(security): State<ApiSecurity>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    if !security.authorized(&req) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::err(
                "Unauthorized: set STORY_API_TOKEN and send Authorization: Bearer <token>",
            )),
        )
            .into_response();
    }

    let key = req
        .headers()
        .get("x-forwarded-for")
        .or_else(|| req.headers().get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("local")
        .to_string();
    if !security.admit(key) {
        warn!(path = %req.uri().path(), "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiResponse::err("Rate limit exceeded")),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::Request as HttpRequest, routing::get, Router};
    use tower::util::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    fn guarded(token: Option<&str>, rate_limit_per_sec: u32) -> Router {
        let security = ApiSecurity::new(&SecurityConfig {
            required_token: token.map(str::to_string),
            rate_limit_per_sec,
        });
        Router::new()
            .route("/", get(ok_handler))
            .layer(middleware::from_fn_with_state(security, api_guard))
    }

    #[tokio::test]
    async fn rejects_when_token_missing_or_invalid() {
        let app = guarded(Some("secret"), 100);

        let req = HttpRequest::builder()
            .uri("/")
            .body(axum::body::Body::empty())
            .expect("request");
        let res = app.clone().oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let req_bad = HttpRequest::builder()
            .uri("/")
            .header("authorization", "Bearer nope")
            .body(axum::body::Body::empty())
            .expect("request");
        let res_bad = app.clone().oneshot(req_bad).await.expect("response");
        assert_eq!(res_bad.status(), StatusCode::UNAUTHORIZED);

        let req_key = HttpRequest::builder()
            .uri("/")
            .header("x-api-key", "secret")
            .body(axum::body::Body::empty())
            .expect("request");
        let res_key = app.oneshot(req_key).await.expect("response");
        assert_eq!(res_key.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn allows_valid_token_and_applies_rate_limit() {
        let app = guarded(Some("secret"), 1);

        let request = || {
            HttpRequest::builder()
                .uri("/")
                .header("authorization", "Bearer secret")
                .header("x-real-ip", "127.0.0.1")
                .body(axum::body::Body::empty())
                .expect("request")
        };
        let res_ok = app.clone().oneshot(request()).await.expect("response");
        assert_eq!(res_ok.status(), StatusCode::OK);

        let res_limited = app.oneshot(request()).await.expect("response");
        assert_eq!(res_limited.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn open_when_no_token_configured() {
        let app = guarded(None, 10);
        let req = HttpRequest::builder()
            .uri("/")
            .body(axum::body::Body::empty())
            .expect("request");
        let res = app.oneshot(req).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);
    }
}
