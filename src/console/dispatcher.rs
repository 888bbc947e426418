use tracing::debug;

use super::registry::Invocation;
use super::responder::Responder;
use super::session::Session;
use super::tokenizer::tokenize;
use super::ConsoleContext;

const COMMAND_SEPARATOR: char = '-';

/// What the dispatcher did with one line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    NoCommand,
    InvalidFormat,
    Unknown(String),
    InvalidArity { command: String, expected: Vec<usize> },
    Handled(String),
}

/// Tokenizes `line`, validates it against the registry and runs the
/// handler. Format problems produce exactly one response line. Handlers
/// report their own failures.
pub async fn dispatch(
    line: &str,
    session: &mut Session,
    ctx: &ConsoleContext,
    out: &Responder,
) -> Dispatch {
    let mut tokens = tokenize(line).into_iter();
    let Some(command) = tokens.next() else {
        out.response("❌ No command provided");
        return Dispatch::NoCommand;
    };

    let mut parts = command.split(COMMAND_SEPARATOR);
    let (Some(major), Some(minor), None) = (parts.next(), parts.next(), parts.next()) else {
        out.response("❌ Invalid command format");
        return Dispatch::InvalidFormat;
    };
    if major.is_empty() || minor.is_empty() {
        out.response("❌ Invalid command format");
        return Dispatch::InvalidFormat;
    }

    let Some(spec) = ctx.registry.lookup(major, minor) else {
        out.response(format!("❌ Unknown command: {command}"));
        return Dispatch::Unknown(command);
    };

    let params: Vec<String> = tokens.collect();
    if !spec.param_counts.contains(&params.len()) {
        let expected: Vec<String> = spec.param_counts.iter().map(ToString::to_string).collect();
        out.response(format!(
            "❌ Invalid number of parameters for {command}. Expected one of: {}",
            expected.join(", ")
        ));
        return Dispatch::InvalidArity {
            command,
            expected: spec.param_counts.clone(),
        };
    }

    debug!(connection = %session.connection_id, command = %command, params = params.len(), "dispatching console command");
    (spec.handler)(Invocation {
        command: &command,
        params,
        session,
        ctx,
        out,
    })
    .await;
    Dispatch::Handled(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::registry::CommandRegistry;
    use crate::console::responder::{drain_frames, ConsoleFrame};
    use crate::console::testing::test_context;
    use futures::future::BoxFuture;

    fn marker(inv: Invocation<'_>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            inv.out.response(format!("handled {}", inv.params.join("|")));
        })
    }

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry
            .register("community", "vote", &[2, 3], "", marker)
            .expect("register");
        registry
            .register("system", "status", &[0], "", marker)
            .expect("register");
        registry
    }

    async fn run(line: &str) -> (Dispatch, Vec<ConsoleFrame>) {
        let (ctx, _tmp) = test_context(registry());
        let mut session = crate::console::Session::new(&ctx.identity);
        let (out, mut rx) = Responder::channel();
        let outcome = dispatch(line, &mut session, &ctx, &out).await;
        (outcome, drain_frames(&mut rx))
    }

    fn lines(frames: &[ConsoleFrame]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|f| match f {
                ConsoleFrame::Response(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn empty_lines_yield_exactly_one_no_command_response() {
        for line in ["", "/", "   "] {
            let (outcome, frames) = run(line).await;
            assert_eq!(outcome, Dispatch::NoCommand);
            assert_eq!(lines(&frames), vec!["❌ No command provided"]);
        }
    }

    #[tokio::test]
    async fn command_name_needs_exactly_one_separator() {
        for line in ["/status", "/system-status-now", "/-status", "/system-"] {
            let (outcome, frames) = run(line).await;
            assert_eq!(outcome, Dispatch::InvalidFormat, "line {line}");
            assert_eq!(lines(&frames), vec!["❌ Invalid command format"]);
        }
    }

    #[tokio::test]
    async fn unknown_pairs_are_reported() {
        let (outcome, frames) = run("/system-reboot").await;
        assert_eq!(outcome, Dispatch::Unknown("system-reboot".into()));
        assert_eq!(lines(&frames), vec!["❌ Unknown command: system-reboot"]);
    }

    #[tokio::test]
    async fn wrong_arity_lists_accepted_counts_and_skips_handler() {
        for line in ["/community-vote", "/community-vote up", "/community-vote a b c d"] {
            let (outcome, frames) = run(line).await;
            assert!(matches!(outcome, Dispatch::InvalidArity { ref expected, .. } if expected == &vec![2, 3]));
            assert_eq!(
                lines(&frames),
                vec!["❌ Invalid number of parameters for community-vote. Expected one of: 2, 3"]
            );
        }
    }

    #[tokio::test]
    async fn valid_command_reaches_handler_with_params() {
        let (outcome, frames) = run(r#"/community-vote upvote 42 "great read""#).await;
        assert_eq!(outcome, Dispatch::Handled("community-vote".into()));
        assert_eq!(lines(&frames), vec!["handled upvote|42|great read"]);
    }
}
