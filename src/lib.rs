//! TwinBridge
//!
//! Two dynamic runtimes in one process: a command runtime (every value is a
//! string with an optional internal form) and an object runtime (modules,
//! functions, exception classes). Either one can host the other; the host
//! calls in through a single bridge command, the guest calls back through a
//! single callback module.
//!
//! # Example
//!
//! ```no_run
//! use twinbridge::{Session, Result};
//! use twinbridge::util::config::BridgeConfig;
//!
//! fn main() -> Result<()> {
//!     let session = Session::start(BridgeConfig::default())?;
//!     session.eval("guest eval {def twice(x):\n    return int(x) * 2}")?;
//!     assert_eq!(session.eval("guest call twice 21")?, "42");
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod repl;
pub mod runtime;
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

use ::std::fs;
use ::std::path::Path;

use tracing::debug;

use crate::bridge::Bootstrap;
use crate::runtime::command::{CmdError, CmdValue, CommandInterp};
use crate::util::config::BridgeConfig;

/// Crate version, also the provided package version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Display name
pub const NAME: &str = "TwinBridge";

/// A command interpreter with the bridge loaded
pub struct Session {
    bootstrap: Bootstrap,
    interp: CommandInterp,
}

impl Session {
    /// Create an interpreter and load the bridge into it
    pub fn start(config: BridgeConfig) -> Result<Self> {
        let bootstrap = Bootstrap::new(config);
        let interp = CommandInterp::new();
        bootstrap.register_package_loader(&interp);
        bootstrap
            .load_into_command_host(&interp)
            .context("Failed to load the bridge")?;
        debug!("session started");
        Ok(Self { bootstrap, interp })
    }

    pub fn interp(&self) -> &CommandInterp {
        &self.interp
    }

    pub fn bootstrap(&self) -> &Bootstrap {
        &self.bootstrap
    }

    /// Evaluate a command script and return its result text
    pub fn eval(
        &self,
        script: &str,
    ) -> Result<String> {
        let value = self.interp.eval(script).map_err(|e| self.script_error(e))?;
        Ok(value.as_string())
    }

    /// Run the bridge command with already split arguments
    pub fn guest(
        &self,
        args: &[String],
    ) -> Result<String> {
        let mut words = vec![CmdValue::text(self.bootstrap.config().command_name.clone())];
        words.extend(args.iter().map(|a| CmdValue::text(a.clone())));
        let value = self.interp.invoke(&words)?;
        Ok(value.as_string())
    }

    /// Output printed by either runtime since the last call
    pub fn take_output(&self) -> String {
        let mut out = self.interp.take_output();
        if let Some(vm) = self.bootstrap.guest() {
            out.push_str(&vm.take_output());
        }
        out
    }

    fn script_error(
        &self,
        err: CmdError,
    ) -> anyhow::Error {
        let trace = self.interp.error_info();
        if trace.is_empty() {
            anyhow::Error::new(err)
        } else {
            anyhow::anyhow!(trace)
        }
    }
}

/// Run a command script with the bridge loaded
pub fn run(
    source: &str,
    config: BridgeConfig,
) -> Result<String> {
    let session = Session::start(config)?;
    let result = session.eval(source);
    print!("{}", session.take_output());
    result
}

/// Run a command script file with the bridge loaded
pub fn run_file(
    path: &Path,
    config: BridgeConfig,
) -> Result<String> {
    debug!(path = %path.display(), "running file");
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    run(&source, config)
}
