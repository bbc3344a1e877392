//! The bridge between the command runtime and the object runtime
//!
//! ```text
//!  command runtime                                    object runtime
//! ┌──────────────┐  guest call|eval|import  ┌──────────┐  GuestRuntime  ┌──────────┐
//! │ CommandInterp│ ───────────────────────▶ │ dispatch │ ─────────────▶ │ ObjectVm │
//! │              │ ◀─────── CmdValue ────── │ marshal  │ ◀── values ─── │          │
//! │              │ ◀─ traceback + marker ── │exception │ ◀─ exception ─ │          │
//! │              │ ◀──────────── host.evaluate(code) ─────────────────  │          │
//! └──────────────┘                          └──────────┘                └──────────┘
//! ```
//!
//! [`bootstrap`] wires both directions; [`embedding`] records which runtime
//! hosts the process.

pub mod bootstrap;
pub mod dispatch;
pub mod embedding;
pub mod error;
pub mod evaluator;
pub mod exception;
pub mod importer;
pub mod marshal;
pub mod resolver;

pub use bootstrap::Bootstrap;
pub use dispatch::{CommandOutcome, DispatchState, Dispatcher, Subcommand};
pub use embedding::{Embedding, EmbeddingError, EmbeddingState, GuestPhase, InitAction, EMBEDDING};
pub use error::{BridgeError, MarshalError};
pub use exception::ExceptionRecord;
pub use marshal::{CrossValue, Marshaller, Shape, SHAPE_PRECEDENCE};
pub use resolver::CallablePath;

/// Last line of every guest failure reported to the command runtime
pub const BOUNDARY_MARKER: &str = "----- host -> guest interface -----";

/// Package name provided to the command runtime
pub const PACKAGE_NAME: &str = "twinbridge";

#[cfg(test)]
mod tests;
