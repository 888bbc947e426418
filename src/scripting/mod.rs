//! Sandboxed execution of story-building scripts.
//!
//! Each run gets a fresh Lua 5.4 state with a memory ceiling, a wall-clock
//! budget and no host capabilities beyond the story bridge. Documents are
//! reached through integer handles; media generation requested by a script
//! is queued and performed after the script returns.

pub mod bridge;
mod guards;
pub mod vm;

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

use crate::config::SandboxConfig;
use crate::story::StoryDocument;

pub use vm::ScriptExecutor;

#[derive(Clone, Copy, Debug)]
pub struct ExecutionLimits {
    pub memory_limit_bytes: usize,
    pub timeout: Duration,
    pub hook_instruction_interval: u32,
}

impl From<SandboxConfig> for ExecutionLimits {
    fn from(config: SandboxConfig) -> Self {
        Self {
            memory_limit_bytes: config.memory_limit_bytes,
            timeout: config.timeout,
            hook_instruction_interval: config.hook_instruction_interval,
        }
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        SandboxConfig::default().into()
    }
}

/// Lifecycle of one execution. `Disposed` is always last.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Idle,
    ContextCreated,
    BridgeInstalled,
    Running,
    Completed,
    TimedOut,
    Faulted,
    MediaDraining,
    Disposed,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed,
    TimedOut,
    Faulted,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SandboxFault {
    #[error("Sandbox setup failed: {0}")]
    Setup(String),

    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Script execution timed out after {0}ms")]
    Timeout(u128),

    #[error("Script exceeded its memory limit")]
    Memory,

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl SandboxFault {
    pub fn outcome(&self) -> ExecutionOutcome {
        match self {
            SandboxFault::Timeout(_) => ExecutionOutcome::TimedOut,
            _ => ExecutionOutcome::Faulted,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub outcome: ExecutionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stories_created: usize,
    pub stories: Vec<StoryDocument>,
    pub phases: Vec<ExecutionPhase>,
}

/// Process-wide counters, shared by every execution of one executor.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    started: AtomicU64,
    disposed: AtomicU64,
}

impl ExecutorStats {
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    pub fn disposed(&self) -> u64 {
        self.disposed.load(Ordering::Relaxed)
    }

    fn record_start(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dispose(&self) {
        self.disposed.fetch_add(1, Ordering::Relaxed);
    }
}
