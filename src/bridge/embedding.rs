//! Process-wide embedding direction
//!
//! Either runtime may host the other, and loading one side can load the
//! other side again (the object runtime's callback module while the command
//! host boots it, or the bridge command inside a command runtime created by
//! an object host). The state below makes both directions share one
//! initialization path:
//!
//! ```text
//!            request(side)                      guest_started()
//! Unset ────────────────────▶ HostedBy{side, Booting} ─────────▶ HostedBy{side, Running}
//!   ▲                              │
//!   └────────── abort() ───────────┘
//! ```
//!
//! | state                          | request(same) | request(other)   |
//! |--------------------------------|---------------|------------------|
//! | `Unset`                        | `Bootstrap`   | `Bootstrap`      |
//! | `HostedBy { guest: Booting }`  | `Reuse`       | `RegisterHandle` |
//! | `HostedBy { guest: Running }`  | `Reuse`       | error            |

use libloading::Library;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::runtime::Side;

/// Start-up phase of the runtime being embedded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestPhase {
    /// The host is still bringing the guest up
    Booting,
    /// Bootstrap finished
    Running,
}

/// Which runtime hosts the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingState {
    Unset,
    HostedBy { host: Side, guest: GuestPhase },
}

/// What an initialization request must do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitAction {
    /// First initialization: boot the other runtime
    Bootstrap,
    /// Same direction again: reuse what is running
    Reuse,
    /// Nested load of the other side during bootstrap: bind handles only
    RegisterHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmbeddingError {
    /// The other runtime already finished hosting this process
    #[error("cannot initialize the bridge from the {requested}: the process is hosted by the {host}")]
    Conflict { host: Side, requested: Side },

    /// `guest_started` outside a bootstrap
    #[error("no bootstrap in progress (state {state:?})")]
    NotBooting { state: EmbeddingState },
}

/// The process-wide embedding state object
pub struct Embedding {
    state: Mutex<EmbeddingState>,
    preloaded: OnceCell<GuestLibrary>,
}

/// The guest's shared library, loaded for the life of the process
struct GuestLibrary {
    path: PathBuf,
    _library: Library,
}

/// The embedding of this process
pub static EMBEDDING: Lazy<Embedding> = Lazy::new(Embedding::new);

impl Default for Embedding {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedding {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EmbeddingState::Unset),
            preloaded: OnceCell::new(),
        }
    }

    pub fn state(&self) -> EmbeddingState {
        *self.state.lock()
    }

    /// Decide how an initialization from `side` proceeds, updating the state
    pub fn request(
        &self,
        side: Side,
    ) -> Result<InitAction, EmbeddingError> {
        let mut state = self.state.lock();
        let action = match *state {
            EmbeddingState::Unset => {
                *state = EmbeddingState::HostedBy {
                    host: side,
                    guest: GuestPhase::Booting,
                };
                InitAction::Bootstrap
            }
            EmbeddingState::HostedBy { host, .. } if host == side => InitAction::Reuse,
            EmbeddingState::HostedBy {
                guest: GuestPhase::Booting,
                ..
            } => InitAction::RegisterHandle,
            EmbeddingState::HostedBy {
                host,
                guest: GuestPhase::Running,
            } => {
                warn!(%host, requested = %side, "rejected initialization");
                return Err(EmbeddingError::Conflict {
                    host,
                    requested: side,
                });
            }
        };
        debug!(%side, ?action, "initialization requested");
        Ok(action)
    }

    /// Mark the bootstrap finished: `Booting -> Running`
    pub fn guest_started(&self) -> Result<(), EmbeddingError> {
        let mut state = self.state.lock();
        match *state {
            EmbeddingState::HostedBy {
                host,
                guest: GuestPhase::Booting,
            } => {
                *state = EmbeddingState::HostedBy {
                    host,
                    guest: GuestPhase::Running,
                };
                Ok(())
            }
            other => Err(EmbeddingError::NotBooting { state: other }),
        }
    }

    /// Roll a failed bootstrap back to `Unset`
    pub fn abort(&self) {
        let mut state = self.state.lock();
        if let EmbeddingState::HostedBy {
            guest: GuestPhase::Booting,
            ..
        } = *state
        {
            *state = EmbeddingState::Unset;
        }
    }

    /// Load the guest library with global symbol resolution, once per
    /// process.
    ///
    /// Only a successful load is remembered, so a failed one can be retried.
    /// Later calls keep the first library whatever path they name.
    pub fn preload(
        &self,
        path: &Path,
    ) -> Result<(), String> {
        let loaded = self.preloaded.get_or_try_init(|| {
            let library = open_global(path).map_err(|e| e.to_string())?;
            debug!(path = %path.display(), "guest library loaded");
            Ok::<_, String>(GuestLibrary {
                path: path.to_path_buf(),
                _library: library,
            })
        })?;
        if loaded.path != path {
            debug!(loaded = %loaded.path.display(), "guest library already loaded");
        }
        Ok(())
    }

    pub fn preloaded(&self) -> Option<&Path> {
        self.preloaded.get().map(|loaded| loaded.path.as_path())
    }
}

#[cfg(unix)]
fn open_global(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};
    // SAFETY: running the library's initializers is the point of preloading
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }.map(Library::from)
}

#[cfg(not(unix))]
fn open_global(path: &Path) -> Result<Library, libloading::Error> {
    // SAFETY: as above; symbols of loaded modules are process-wide here
    unsafe { Library::new(path) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_bootstraps() {
        let embedding = Embedding::new();
        assert_eq!(embedding.request(Side::Command), Ok(InitAction::Bootstrap));
        assert_eq!(
            embedding.state(),
            EmbeddingState::HostedBy {
                host: Side::Command,
                guest: GuestPhase::Booting
            }
        );
    }

    #[test]
    fn test_same_direction_is_reused() {
        let embedding = Embedding::new();
        embedding.request(Side::Object).unwrap();
        embedding.guest_started().unwrap();
        assert_eq!(embedding.request(Side::Object), Ok(InitAction::Reuse));
        assert_eq!(embedding.request(Side::Object), Ok(InitAction::Reuse));
    }

    #[test]
    fn test_other_direction_during_bootstrap_registers_handle() {
        let embedding = Embedding::new();
        embedding.request(Side::Command).unwrap();
        assert_eq!(embedding.request(Side::Object), Ok(InitAction::RegisterHandle));
        // still hosted by the first side
        assert!(matches!(
            embedding.state(),
            EmbeddingState::HostedBy { host: Side::Command, .. }
        ));
    }

    #[test]
    fn test_other_direction_after_bootstrap_is_rejected() {
        let embedding = Embedding::new();
        embedding.request(Side::Command).unwrap();
        embedding.guest_started().unwrap();
        assert_eq!(
            embedding.request(Side::Object),
            Err(EmbeddingError::Conflict {
                host: Side::Command,
                requested: Side::Object
            })
        );
    }

    #[test]
    fn test_guest_started_is_compare_and_set() {
        let embedding = Embedding::new();
        assert!(embedding.guest_started().is_err());
        embedding.request(Side::Command).unwrap();
        assert!(embedding.guest_started().is_ok());
        assert!(embedding.guest_started().is_err());
    }

    #[test]
    fn test_abort_rolls_back_only_booting() {
        let embedding = Embedding::new();
        embedding.request(Side::Object).unwrap();
        embedding.abort();
        assert_eq!(embedding.state(), EmbeddingState::Unset);

        embedding.request(Side::Object).unwrap();
        embedding.guest_started().unwrap();
        embedding.abort();
        assert_ne!(embedding.state(), EmbeddingState::Unset);
    }

    #[test]
    fn test_preload_rejects_missing_and_invalid_files() {
        let embedding = Embedding::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libguest.so");
        assert!(embedding.preload(&path).is_err());
        assert!(embedding.preloaded().is_none());

        std::fs::write(&path, b"not a library").unwrap();
        assert!(embedding.preload(&path).is_err());
        assert!(embedding.preloaded().is_none());
    }

    #[test]
    fn test_preload_keeps_first_library() {
        let Some(library) = crate::bridge::tests::system_library() else {
            return;
        };
        let embedding = Embedding::new();
        let dir = tempfile::tempdir().unwrap();
        assert!(embedding.preload(&library).is_ok());
        assert_eq!(embedding.preloaded(), Some(library.as_path()));

        assert!(embedding.preload(&dir.path().join("other.so")).is_ok());
        assert_eq!(embedding.preloaded(), Some(library.as_path()));
    }
}
