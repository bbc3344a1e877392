//! Code evaluation in the guest's top-level scope

use tracing::trace;

use super::error::BridgeError;
use crate::runtime::GuestRuntime;

/// Run `code` as a script in the guest's main namespace
pub fn evaluate<G: GuestRuntime>(
    guest: &G,
    code: &str,
) -> Result<(), BridgeError> {
    trace!(bytes = code.len(), "evaluating guest code");
    guest.run_script(code).map_err(|_| BridgeError::Guest)
}
