//! Command dispatcher
//!
//! Routes `<cmd> call|eval|import ...` to the matching bridge operation and
//! renders failures. Usage errors never reach the guest. Every other failure
//! goes through one path: an optional context line, the translated guest
//! traceback, then [`BOUNDARY_MARKER`](super::BOUNDARY_MARKER).

use std::cell::Cell;

use tracing::{debug, trace};

use super::error::BridgeError;
use super::marshal::CrossValue;
use super::resolver::CallablePath;
use super::{evaluator, exception, importer, resolver, BOUNDARY_MARKER};
use crate::runtime::GuestRuntime;

/// Result of one bridge command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Converted result value
    Ok(CrossValue),
    /// Host-side usage error; the guest was not touched
    Usage(String),
    /// Guest-originating failure, fully rendered
    Guest(String),
}

impl CommandOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CommandOutcome::Ok(_))
    }
}

/// Dispatcher activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    /// `depth` counts nested dispatches made through host callbacks
    Dispatching { depth: usize },
}

/// Bridge subcommands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subcommand {
    Call,
    Eval,
    Import,
}

impl Subcommand {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "call" => Some(Subcommand::Call),
            "eval" => Some(Subcommand::Eval),
            "import" => Some(Subcommand::Import),
            _ => None,
        }
    }
}

/// Routes bridge commands to one guest runtime
pub struct Dispatcher<G: GuestRuntime> {
    guest: G,
    max_depth: usize,
    state: Cell<DispatchState>,
}

impl<G: GuestRuntime> Dispatcher<G> {
    pub fn new(
        guest: G,
        max_depth: usize,
    ) -> Self {
        Self {
            guest,
            max_depth,
            state: Cell::new(DispatchState::Idle),
        }
    }

    pub fn guest(&self) -> &G {
        &self.guest
    }

    pub fn state(&self) -> DispatchState {
        self.state.get()
    }

    /// Run `command_name args...`, where `args[0]` is the subcommand
    pub fn dispatch(
        &self,
        command_name: &str,
        args: &[String],
    ) -> CommandOutcome {
        let Some(sub_name) = args.first() else {
            return CommandOutcome::Usage(wrong_args(command_name, "subcommand ?arg ...?"));
        };
        let Some(subcommand) = Subcommand::parse(sub_name) else {
            return CommandOutcome::Usage(format!(
                "bad command \"{}\": must be call, eval, or import",
                sub_name
            ));
        };
        let arity_ok = match subcommand {
            Subcommand::Call => args.len() >= 2,
            Subcommand::Eval | Subcommand::Import => args.len() == 2,
        };
        if !arity_ok {
            let synopsis = match subcommand {
                Subcommand::Call => "call func ?arg ...?",
                Subcommand::Eval => "eval evalString",
                Subcommand::Import => "import module",
            };
            return CommandOutcome::Usage(wrong_args(command_name, synopsis));
        }

        let _guard = DispatchGuard::enter(&self.state);
        debug!(?subcommand, state = ?self.state.get(), "dispatch");
        let result = match subcommand {
            Subcommand::Call => CallablePath::parse(&args[1])
                .and_then(|path| resolver::call(&self.guest, &path, &args[2..], self.max_depth)),
            Subcommand::Eval => {
                evaluator::evaluate(&self.guest, &args[1]).map(|()| CrossValue::Null)
            }
            Subcommand::Import => importer::import(&self.guest, &args[1]).map(|()| CrossValue::Null),
        };

        let outcome = match result {
            Ok(value) => CommandOutcome::Ok(value),
            Err(BridgeError::Usage(message)) => CommandOutcome::Usage(message),
            Err(err) => CommandOutcome::Guest(self.render_failure(&err)),
        };
        self.guest.clear_exception();
        trace!(ok = outcome.is_ok(), "dispatch finished");
        outcome
    }

    /// Context line, translated traceback and boundary marker
    fn render_failure(
        &self,
        err: &BridgeError,
    ) -> String {
        let mut text = String::new();
        if let Some(context) = err.context() {
            text.push_str(&context);
            text.push('\n');
        }
        if let Some(traceback) = exception::capture_and_format(&self.guest) {
            text.push_str(traceback.trim_end_matches('\n'));
            text.push('\n');
        }
        text.push_str(BOUNDARY_MARKER);
        text
    }
}

fn wrong_args(
    command_name: &str,
    synopsis: &str,
) -> String {
    format!("wrong # args: should be \"{} {}\"", command_name, synopsis)
}

struct DispatchGuard<'a> {
    state: &'a Cell<DispatchState>,
}

impl<'a> DispatchGuard<'a> {
    fn enter(state: &'a Cell<DispatchState>) -> Self {
        let depth = match state.get() {
            DispatchState::Idle => 1,
            DispatchState::Dispatching { depth } => depth + 1,
        };
        state.set(DispatchState::Dispatching { depth });
        Self { state }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        let next = match self.state.get() {
            DispatchState::Dispatching { depth } if depth > 1 => {
                DispatchState::Dispatching { depth: depth - 1 }
            }
            _ => DispatchState::Idle,
        };
        self.state.set(next);
    }
}
