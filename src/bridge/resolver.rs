//! Dotted-path callable resolution and invocation

use std::fmt;

use smallvec::SmallVec;
use tracing::trace;

use super::error::BridgeError;
use super::marshal::{CrossValue, Marshaller};
use crate::runtime::GuestRuntime;

/// A validated `a.b.c` name path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallablePath {
    text: String,
    segments: SmallVec<[String; 4]>,
}

impl CallablePath {
    /// Split `text` on dots; empty paths and empty segments are usage errors
    pub fn parse(text: &str) -> Result<Self, BridgeError> {
        if text.is_empty() {
            return Err(BridgeError::Usage("empty function name".into()));
        }
        let segments: SmallVec<[String; 4]> = text.split('.').map(str::to_string).collect();
        if let Some(position) = segments.iter().position(String::is_empty) {
            return Err(BridgeError::Usage(format!(
                "bad function name \"{}\": segment {} is empty",
                text,
                position + 1
            )));
        }
        Ok(Self {
            text: text.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for CallablePath {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Walk `path` from the guest's top-level namespace.
///
/// On an unknown segment the guest's attribute error stays pending.
pub fn resolve<G: GuestRuntime>(
    guest: &G,
    path: &CallablePath,
) -> Result<G::Value, BridgeError> {
    let mut current = guest.main_namespace();
    for (index, segment) in path.segments().iter().enumerate() {
        current = guest
            .get_attr(&current, segment)
            .map_err(|_| BridgeError::UnresolvedSegment {
                path: path.to_string(),
                segment: segment.clone(),
                position: index + 1,
            })?;
    }
    Ok(current)
}

/// Resolve `path`, call it with text arguments and marshal the result
pub fn call<G: GuestRuntime>(
    guest: &G,
    path: &CallablePath,
    args: &[String],
    max_depth: usize,
) -> Result<CrossValue, BridgeError> {
    let target = resolve(guest, path)?;
    if !guest.is_callable(&target) {
        return Err(BridgeError::NotCallable {
            path: path.to_string(),
            type_name: guest.type_name(&target),
        });
    }
    let args = args.iter().map(|arg| guest.new_text(arg)).collect();
    trace!(path = %path, "invoking guest callable");
    let result = guest.call(&target, args).map_err(|_| BridgeError::Guest)?;
    drop(target);
    Ok(Marshaller::new(guest, max_depth).marshal(&result)?)
}
