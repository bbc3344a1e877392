//! Module import into the guest's top-level namespace

use tracing::debug;

use super::error::BridgeError;
use crate::runtime::GuestRuntime;

/// Import `module_name` and bind its top-level package in the main namespace.
///
/// For `a.b.c` every prefix is imported, and only `a` becomes visible, the
/// same as the guest's own `import` statement.
pub fn import<G: GuestRuntime>(
    guest: &G,
    module_name: &str,
) -> Result<(), BridgeError> {
    let top = guest
        .import_module(module_name)
        .map_err(|_| BridgeError::Guest)?;
    let top_name = guest.module_name(&top).map_err(|_| BridgeError::Guest)?;
    let main = guest.main_namespace();
    guest
        .set_attr(&main, &top_name, top)
        .map_err(|_| BridgeError::Guest)?;
    debug!(module = module_name, bound = %top_name, "imported guest module");
    Ok(())
}
