use super::*;

use crate::services::AvatarRenderer;
use crate::story::store::ArtifactStore;

/// Everything a route needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub(super) console: Arc<ConsoleContext>,
    pub(super) executor: ScriptExecutor,
    pub(super) avatars: AvatarRenderer,
}

impl AppState {
    pub fn new(console: ConsoleContext, executor: ScriptExecutor) -> Self {
        let avatars = console.avatars.clone();
        Self {
            console: Arc::new(console),
            executor,
            avatars,
        }
    }

    pub(super) fn artifacts(&self) -> &ArtifactStore {
        self.executor.artifacts()
    }
}
