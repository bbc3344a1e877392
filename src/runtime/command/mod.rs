//! Command-oriented runtime (Host-A)
//!
//! Scripts are sequences of commands; every command receives its words as
//! [`CmdValue`]s and returns one value or a [`CmdError`]. The command table,
//! variables, packages and per-extension associated data live in a
//! [`CommandInterp`].

mod builtins;
mod expr;
mod interp;
pub mod parser;
pub mod value;

pub use interp::{CmdResult, CommandFn, CommandInterp, PackageLoader, WeakInterp};
pub use value::{format_list, parse_list, quote_element, CmdValue};

use thiserror::Error;

/// Failure of a command, or a non-local `return`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CmdError {
    /// Ordinary error carrying the result message
    #[error("{0}")]
    Failed(String),

    /// Wrong number of arguments, carrying the usage synopsis
    #[error("wrong # args: should be \"{0}\"")]
    WrongArgs(String),

    #[error("invalid command name \"{0}\"")]
    UnknownCommand(String),

    #[error("can't read \"{0}\": no such variable")]
    NoSuchVariable(String),

    /// Malformed script text
    #[error("{0}")]
    Syntax(String),

    /// `return` unwinding to the enclosing procedure
    #[error("invoked \"return\" outside of a proc")]
    Return(CmdValue),
}

impl CmdError {
    pub fn failed(message: impl Into<String>) -> Self {
        CmdError::Failed(message.into())
    }

    /// Usage error for `words` as in `wrong # args: should be "cmd sub args"`
    pub fn wrong_args(
        words: &[CmdValue],
        prefix: usize,
        synopsis: &str,
    ) -> Self {
        let mut usage: Vec<String> = words.iter().take(prefix).map(|w| w.as_string()).collect();
        if !synopsis.is_empty() {
            usage.push(synopsis.to_string());
        }
        CmdError::WrongArgs(usage.join(" "))
    }
}

#[cfg(test)]
mod tests;
