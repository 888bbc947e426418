//! HTTP surface: the websocket console, script execution over plain HTTP
//! and SSE, read access to published stories and the avatar images.

mod docs;
mod router;
mod routes_console;
mod routes_scripts;
mod routes_stories;
mod security;
mod state;
pub mod types;

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::SecurityConfig;
use crate::console::{ConsoleContext, ConsoleFrame, Outbound, Responder};
use crate::scripting::{ExecutionResult, ScriptExecutor};
use docs::*;
use router::build_router;
use routes_console::*;
use routes_scripts::*;
use routes_stories::*;
use security::*;
pub use state::AppState;
use types::*;

/// Binds `addr` and serves until the process is stopped.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    security: &SecurityConfig,
) -> anyhow::Result<()> {
    let app = build_router(state, ApiSecurity::new(security));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "story interface listening");
    axum::serve(listener, app).await?;
    Ok(())
}
