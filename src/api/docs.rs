use super::*;

use crate::console::handlers::HELP_TOPICS;

pub(super) fn docs_endpoints() -> Vec<serde_json::Value> {
    vec![
        serde_json::json!({"method":"GET","path":"/console","description":"Websocket console: send command lines or {\"type\":\"execute\",\"code\":...}"}),
        serde_json::json!({"method":"POST","path":"/scripts/execute","description":"Run a story script and return its result with collected logs"}),
        serde_json::json!({"method":"POST","path":"/scripts/stream","description":"Run a story script, streaming log/result/error as SSE"}),
        serde_json::json!({"method":"GET","path":"/stories","description":"List published stories"}),
        serde_json::json!({"method":"GET","path":"/stories/{slug}","description":"Load a published story document"}),
        serde_json::json!({"method":"DELETE","path":"/stories/{slug}","description":"Delete a story and its media"}),
        serde_json::json!({"method":"GET","path":"/stories/{slug}/exists","description":"Check whether a story is published"}),
        serde_json::json!({"method":"GET","path":"/stories/{slug}/media","description":"List media files stored with a story"}),
        serde_json::json!({"method":"GET","path":"/emoji/{file}","description":"Rendered emoji avatar image"}),
        serde_json::json!({"method":"GET","path":"/docs","description":"This document"}),
    ]
}

pub(super) async fn get_docs(State(state): State<AppState>) -> Json<ApiResponse<serde_json::Value>> {
    let commands: Vec<serde_json::Value> = state
        .console
        .registry
        .commands()
        .map(|(name, spec)| {
            serde_json::json!({
                "name": name,
                "usage": spec.usage,
                "paramCounts": spec.param_counts,
            })
        })
        .collect();
    let limits = state.executor.limits();
    Json(ApiResponse::success(serde_json::json!({
        "endpoints": docs_endpoints(),
        "commands": commands,
        "helpTopics": HELP_TOPICS,
        "sandbox": {
            "language": "lua54",
            "memoryLimitBytes": limits.memory_limit_bytes,
            "timeoutMs": limits.timeout.as_millis() as u64,
            "api": [
                "Story.create(name[, description])",
                "story:addScene(key)",
                "story:setText(text)",
                "story:addEvent(media[, trigger])",
                "story:link(from, to)",
                "story:setDescription(text)",
                "story:addKeyword(word)",
                "story:setLocked(locked)",
                "story:generateMedia(prompt[, template])",
                "story:publish()",
                "print(...) / console.log(...)",
            ],
        },
        "security": {
            "token": "STORY_API_TOKEN",
            "rateLimitEnv": "STORY_API_RATE_LIMIT_PER_SEC",
        },
    })))
}
