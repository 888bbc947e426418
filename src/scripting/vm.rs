use mlua::{HookTriggers, Lua, LuaOptions, StdLib, Table, VmState};
use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::bridge::{self, BridgeState, DocumentTable, PendingMedia, SharedState};
use super::guards;
use super::{
    ExecutionLimits, ExecutionOutcome, ExecutionPhase, ExecutionResult, ExecutorStats,
    SandboxFault,
};
use crate::console::Responder;
use crate::services::MediaGenerator;
use crate::story::media::generate_media;
use crate::story::store::ArtifactStore;

const PRELUDE: &str = include_str!("prelude.lua");
const SCRIPT_NAME: &str = "story_script";

/// Globals that would let a script load code or poke the collector.
const REMOVED_GLOBALS: &[&str] = &["load", "dofile", "loadfile", "require", "collectgarbage"];

/// Runs story scripts, one fresh Lua state per call.
#[derive(Clone)]
pub struct ScriptExecutor {
    limits: ExecutionLimits,
    artifacts: ArtifactStore,
    media: Arc<dyn MediaGenerator>,
    stats: Arc<ExecutorStats>,
}

/// What the blocking half of an execution hands back once the Lua state is
/// closed.
struct SandboxRun {
    phases: Vec<ExecutionPhase>,
    fault: Option<SandboxFault>,
    state: BridgeState,
}

/// Phase log of one execution. Dropping it without `finish` (a panic or a
/// cancelled future) still records the disposal.
struct ExecutionRecord {
    phases: Vec<ExecutionPhase>,
    stats: Arc<ExecutorStats>,
    disposed: bool,
}

impl ExecutionRecord {
    fn new(stats: Arc<ExecutorStats>) -> Self {
        stats.record_start();
        Self {
            phases: vec![ExecutionPhase::Idle],
            stats,
            disposed: false,
        }
    }

    fn enter(&mut self, phase: ExecutionPhase) {
        debug!(?phase, "script phase");
        self.phases.push(phase);
    }

    fn finish(mut self) -> Vec<ExecutionPhase> {
        self.dispose();
        std::mem::take(&mut self.phases)
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.phases.push(ExecutionPhase::Disposed);
        self.stats.record_dispose();
        debug!(disposed = self.stats.disposed(), "cleaned up execution resources");
    }
}

impl Drop for ExecutionRecord {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl ScriptExecutor {
    pub fn new(
        limits: ExecutionLimits,
        artifacts: ArtifactStore,
        media: Arc<dyn MediaGenerator>,
    ) -> Self {
        Self {
            limits,
            artifacts,
            media,
            stats: Arc::new(ExecutorStats::default()),
        }
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    #[cfg(test)]
    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Runs `source` to completion. Log lines are streamed to `out` while the
    /// script runs; the terminal result or error frame is left to the caller.
    pub async fn execute(&self, source: String, out: Responder) -> ExecutionResult {
        let mut record = ExecutionRecord::new(self.stats.clone());
        info!(run = self.stats.started(), bytes = source.len(), "executing script");

        let limits = self.limits;
        let artifacts = self.artifacts.clone();
        let sandbox_out = out.clone();
        let joined = tokio::task::spawn_blocking(move || {
            run_sandboxed(&source, limits, artifacts, sandbox_out)
        })
        .await;

        let (fault, state) = match joined {
            Ok(run) => {
                record.phases.extend(run.phases);
                (run.fault, run.state)
            }
            Err(e) => {
                error!(err = %e, "script worker failed");
                record.enter(ExecutionPhase::Faulted);
                (
                    Some(SandboxFault::Runtime("script worker failed".into())),
                    BridgeState::default(),
                )
            }
        };

        match &fault {
            None => info!("script executed successfully"),
            Some(fault) => warn!(err = %fault, "script execution failed"),
        }

        record.enter(ExecutionPhase::MediaDraining);
        let BridgeState {
            mut documents,
            pending,
        } = state;
        debug!(stories = documents.len(), pending = pending.len(), "draining media queue");
        self.drain_media(&mut documents, pending, &out).await;

        let outcome = fault
            .as_ref()
            .map(SandboxFault::outcome)
            .unwrap_or(ExecutionOutcome::Completed);
        let stories = documents.into_documents();
        ExecutionResult {
            success: fault.is_none(),
            outcome,
            error: fault.map(|f| f.to_string()),
            stories_created: stories.len(),
            stories,
            phases: record.finish(),
        }
    }

    /// Performs queued media generations in order. A failed item leaves a
    /// placeholder and the drain moves on. Items for documents the script
    /// never published are dropped, so no media lands outside a story
    /// directory. Touched documents are written again so their media records
    /// are persisted.
    async fn drain_media(
        &self,
        documents: &mut DocumentTable,
        pending: Vec<PendingMedia>,
        out: &Responder,
    ) {
        if pending.is_empty() {
            return;
        }
        out.log(format!(
            "🎨 Processing {} queued media generations...",
            pending.len()
        ));
        let mut touched = BTreeSet::new();
        for item in pending {
            if !documents.is_published(item.handle) {
                out.log(format!(
                    "  ⏭️ Skipping media for unpublished story: {}",
                    item.file
                ));
                continue;
            }
            let Some(doc) = documents.get_mut(item.handle) else {
                continue;
            };
            out.log(format!(
                "  🎨 Generating real media: {} ({} style)",
                item.file, item.template
            ));
            let media = generate_media(
                doc,
                &item.prompt,
                &item.template,
                self.media.as_ref(),
                &self.artifacts,
            )
            .await;
            match (&media.original_url, &media.error) {
                (Some(url), None) => {
                    out.log(format!("  🖼️  Downloaded real image: {}", media.file));
                    out.log(format!("  🌐 Original URL: {url}"));
                }
                (_, Some(e)) => {
                    out.log(format!("  ❌ Media generation failed: {e}"));
                    out.log(format!("  📝 Creating placeholder instead: {}", media.file));
                }
                (None, None) => {}
            }
            touched.insert(item.handle);
        }
        out.log("✅ Media generation complete");

        for handle in touched {
            let Some(doc) = documents.get(handle) else {
                continue;
            };
            if let Err(e) = self.artifacts.publish(doc) {
                warn!(handle, err = %e, "republish after media drain failed");
                out.log(format!("❌ Failed to update story {}: {e}", doc.name));
            }
        }
    }
}

/// The synchronous half: builds the state, runs the script and closes the
/// state before returning.
fn run_sandboxed(
    source: &str,
    limits: ExecutionLimits,
    artifacts: ArtifactStore,
    out: Responder,
) -> SandboxRun {
    let state = SharedState::default();
    let timed_out = Rc::new(Cell::new(false));
    let mut phases = Vec::new();
    let fault = {
        let lua = match create_sandbox(limits) {
            Ok(lua) => lua,
            Err(e) => {
                phases.push(ExecutionPhase::Faulted);
                return SandboxRun {
                    phases,
                    fault: Some(SandboxFault::Setup(first_line(&e.to_string()))),
                    state: BridgeState::default(),
                };
            }
        };
        phases.push(ExecutionPhase::ContextCreated);

        match install_api(&lua, state.clone(), artifacts, out, timed_out.clone()) {
            Ok(()) => {
                phases.push(ExecutionPhase::BridgeInstalled);
                phases.push(ExecutionPhase::Running);
                run_script(&lua, source, limits, timed_out).err()
            }
            Err(e) => Some(SandboxFault::Setup(first_line(&e.to_string()))),
        }
        // `lua` is dropped here, releasing every bridge closure.
    };
    phases.push(match &fault {
        None => ExecutionPhase::Completed,
        Some(SandboxFault::Timeout(_)) => ExecutionPhase::TimedOut,
        Some(_) => ExecutionPhase::Faulted,
    });
    let state = std::mem::take(&mut *state.borrow_mut());
    SandboxRun {
        phases,
        fault,
        state,
    }
}

fn create_sandbox(limits: ExecutionLimits) -> mlua::Result<Lua> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
        LuaOptions::default(),
    )?;
    lua.set_memory_limit(limits.memory_limit_bytes)?;
    let globals = lua.globals();
    for name in REMOVED_GLOBALS {
        globals.set(*name, mlua::Nil)?;
    }
    guards::install(&lua)?;
    Ok(lua)
}

fn install_api(
    lua: &Lua,
    state: SharedState,
    artifacts: ArtifactStore,
    out: Responder,
    timed_out: Rc<Cell<bool>>,
) -> mlua::Result<()> {
    bridge::install(lua, state, artifacts, out)?;
    // The prelude makes protected calls re-raise once this reports true.
    let bridge: Table = lua.globals().get(bridge::BRIDGE_GLOBAL)?;
    bridge.set(
        "expired",
        lua.create_function(move |_lua, ()| Ok(timed_out.get()))?,
    )?;
    lua.load(PRELUDE).set_name("prelude").exec()
}

fn run_script(
    lua: &Lua,
    source: &str,
    limits: ExecutionLimits,
    timed_out: Rc<Cell<bool>>,
) -> Result<(), SandboxFault> {
    let wrapped = format!("return (function(...)\n{source}\nend)(...)");
    let function = lua
        .load(wrapped.as_str())
        .set_name(SCRIPT_NAME)
        .into_function()
        .map_err(|e| SandboxFault::Compile(first_line(&e.to_string())))?;

    let result = call_lua_with_budget(
        lua,
        limits.timeout,
        limits.hook_instruction_interval,
        timed_out.clone(),
        || function.call::<mlua::MultiValue>(()),
    );
    match result {
        Ok(_) => Ok(()),
        Err(_) if timed_out.get() => Err(SandboxFault::Timeout(limits.timeout.as_millis())),
        Err(e) if is_memory_error(&e) => Err(SandboxFault::Memory),
        Err(e) => Err(SandboxFault::Runtime(first_line(&e.to_string()))),
    }
}

fn call_lua_with_budget<T, F>(
    lua: &Lua,
    max_duration: Duration,
    instruction_interval: u32,
    timed_out: Rc<Cell<bool>>,
    f: F,
) -> mlua::Result<T>
where
    F: FnOnce() -> mlua::Result<T>,
{
    let started = Instant::now();
    let budget_ms = max_duration.as_secs_f64() * 1000.0;
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(instruction_interval.max(1)),
        move |_lua, _debug| {
            if started.elapsed() >= max_duration {
                timed_out.set(true);
                return Err(mlua::Error::RuntimeError(format!(
                    "Script execution budget exceeded ({budget_ms:.1}ms)"
                )));
            }
            Ok(VmState::Continue)
        },
    );
    let out = f();
    lua.remove_hook();
    out
}

fn is_memory_error(err: &mlua::Error) -> bool {
    match err {
        mlua::Error::MemoryError(_) => true,
        mlua::Error::CallbackError { cause, .. } => is_memory_error(cause),
        _ => false,
    }
}

/// Lua messages carry a traceback after the first line; callers only see
/// the message itself.
fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().trim().to_string()
}
