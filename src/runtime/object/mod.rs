//! Object-oriented reference runtime (Host-B)
//!
//! A compact dynamic runtime with modules, functions, exception classes and
//! tracebacks. It implements [`GuestRuntime`](crate::runtime::GuestRuntime) so
//! the bridge can drive it, and can host the command runtime in turn.

pub mod builtins;
pub mod syntax;
pub mod value;
pub mod vm;

pub use value::{FrameInfo, InstanceBuilder, Obj, ObjKind};
pub use vm::{ModuleSource, ObjectVm, DEFAULT_RECURSION_LIMIT};

#[cfg(test)]
mod tests;
