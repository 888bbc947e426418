mod api;
mod config;
mod console;
mod scripting;
mod services;
mod story;

use std::sync::Arc;
use tracing::{info, warn};

use config::Config;
use console::handlers::default_registry;
use console::ConsoleContext;
use scripting::ScriptExecutor;
use services::{
    AvatarRenderer, CommunityStore, DisabledMedia, FalClient, MediaGenerator, MemoryStore,
    RestStore,
};
use story::store::ArtifactStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,story_interface=info".into()),
        )
        .with_target(false)
        .init();

    let config = Config::from_env();

    let store: Arc<dyn CommunityStore> = match &config.store {
        Some(store) => {
            info!(url = %store.url, "using REST community store");
            Arc::new(RestStore::new(store))
        }
        None => {
            warn!("SUPABASE_URL not set; community data lives in memory only");
            Arc::new(MemoryStore::new())
        }
    };
    let media: Arc<dyn MediaGenerator> = match &config.media {
        Some(media) => Arc::new(FalClient::new(media)),
        None => {
            warn!("FAL_KEY not set; generated media will be placeholders");
            Arc::new(DisabledMedia)
        }
    };
    if config.identity.shared_user_id.is_some() {
        warn!("AI_SHARED_USER_ID set; sessions without their own account share one identity");
    }

    let registry = default_registry()?;
    info!(commands = registry.len(), "command registry ready");
    let console = ConsoleContext::new(
        registry,
        store,
        AvatarRenderer::new(config.paths.emoji_dir.clone()),
        config.identity.clone(),
        config.paths.help_dir.clone(),
    );
    let executor = ScriptExecutor::new(
        config.sandbox.into(),
        ArtifactStore::new(config.paths.stories_dir.clone()),
        media,
    );
    info!(
        stories = %config.paths.stories_dir.display(),
        memory_mb = config.sandbox.memory_limit_bytes / (1024 * 1024),
        timeout_ms = config.sandbox.timeout.as_millis() as u64,
        "script sandbox ready"
    );

    api::serve(
        config.bind,
        api::AppState::new(console, executor),
        &config.security,
    )
    .await
}
