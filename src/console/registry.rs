use futures::future::BoxFuture;
use std::collections::BTreeMap;
use thiserror::Error;

use super::responder::Responder;
use super::session::Session;
use super::ConsoleContext;

/// Everything a handler receives for one command.
pub struct Invocation<'a> {
    pub command: &'a str,
    pub params: Vec<String>,
    pub session: &'a mut Session,
    pub ctx: &'a ConsoleContext,
    pub out: &'a Responder,
}

impl Invocation<'_> {
    /// Positional parameter, empty when absent. Arity is checked before a
    /// handler runs, so indices within the accepted count are present.
    pub fn param(&self, idx: usize) -> &str {
        self.params.get(idx).map(String::as_str).unwrap_or("")
    }
}

pub type Handler = for<'a> fn(Invocation<'a>) -> BoxFuture<'a, ()>;

#[derive(Clone)]
pub struct CommandSpec {
    pub param_counts: Vec<usize>,
    pub usage: &'static str,
    pub handler: Handler,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("command {0} must accept at least one parameter count")]
    EmptyArity(String),

    #[error("command {0} is already registered")]
    Duplicate(String),

    #[error("command name parts must be non-empty and contain no '-': {0}")]
    InvalidName(String),
}

/// Commands keyed by `major` then `minor`.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, BTreeMap<String, CommandSpec>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        major: &str,
        minor: &str,
        param_counts: &[usize],
        usage: &'static str,
        handler: Handler,
    ) -> Result<(), RegistryError> {
        let name = format!("{major}-{minor}");
        let valid_part = |p: &str| !p.is_empty() && !p.contains('-');
        if !valid_part(major) || !valid_part(minor) {
            return Err(RegistryError::InvalidName(name));
        }
        if param_counts.is_empty() {
            return Err(RegistryError::EmptyArity(name));
        }
        let group = self.commands.entry(major.to_string()).or_default();
        if group.contains_key(minor) {
            return Err(RegistryError::Duplicate(name));
        }
        group.insert(
            minor.to_string(),
            CommandSpec {
                param_counts: param_counts.to_vec(),
                usage,
                handler,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, major: &str, minor: &str) -> Option<&CommandSpec> {
        self.commands.get(major)?.get(minor)
    }

    /// `(major-minor, spec)` pairs in name order.
    pub fn commands(&self) -> impl Iterator<Item = (String, &CommandSpec)> + '_ {
        self.commands.iter().flat_map(|(major, group)| {
            group
                .iter()
                .map(move |(minor, spec)| (format!("{major}-{minor}"), spec))
        })
    }

    pub fn len(&self) -> usize {
        self.commands.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
