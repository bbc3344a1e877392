//! Initialization in both directions
//!
//! Command host: `load_into_command_host` boots an [`ObjectVm`], gives it the
//! callback module and registers the bridge command.
//!
//! Object host: `load_into_object_host` creates a [`CommandInterp`], gives the
//! VM the callback module, then loads the command side into that interpreter.
//! The nested load finds the embedding booting from the object side and only
//! binds the command, so the running VM is never started twice.
//!
//! The callback module exposes `evaluate(code) -> str`, which runs `code` in
//! the command runtime, and `_interp`, a capsule holding a weak handle to the
//! interpreter `evaluate` runs in.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{debug, info};

use super::dispatch::{CommandOutcome, Dispatcher};
use super::embedding::{Embedding, InitAction, EMBEDDING};
use super::error::BridgeError;
use super::{evaluator, exception, PACKAGE_NAME};
use crate::runtime::command::{CmdError, CmdResult, CmdValue, CommandInterp, WeakInterp};
use crate::runtime::object::{Obj, ObjKind, ObjectVm};
use crate::runtime::{GuestResult, GuestRuntime, Side};
use crate::util::config::BridgeConfig;
use crate::VERSION;

/// Capsule name of the `_interp` handle
pub const INTERP_CAPSULE: &str = "twinbridge.interp";

/// Message raised by `evaluate` once the interpreter is dropped
pub const HOST_GONE: &str = "host interpreter is gone";

/// Entry point for loading the bridge, bound to one process embedding.
///
/// Runtimes started through any `Bootstrap` are shared by every other
/// `Bootstrap` of the same thread and embedding, so a second load from the
/// same side reuses them.
#[derive(Clone)]
pub struct Bootstrap(Rc<BootstrapInner>);

struct BootstrapInner {
    embedding: &'static Embedding,
    config: BridgeConfig,
    live: Rc<LiveRuntimes>,
}

/// Runtimes running on this thread for one embedding
#[derive(Default)]
struct LiveRuntimes {
    dispatcher: RefCell<Option<Rc<Dispatcher<ObjectVm>>>>,
    /// Interpreter the callback module evaluates in
    host: RefCell<Option<WeakInterp>>,
    /// Interpreter created for an object host
    owned_host: RefCell<Option<CommandInterp>>,
}

thread_local! {
    static LIVE: RefCell<IndexMap<usize, Rc<LiveRuntimes>>> = RefCell::new(IndexMap::new());
}

fn live_runtimes(embedding: &'static Embedding) -> Rc<LiveRuntimes> {
    let key = embedding as *const Embedding as usize;
    LIVE.with(|live| live.borrow_mut().entry(key).or_default().clone())
}

impl Bootstrap {
    /// Bootstrap registering with the process-wide [`EMBEDDING`]
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_embedding(&EMBEDDING, config)
    }

    pub fn with_embedding(
        embedding: &'static Embedding,
        config: BridgeConfig,
    ) -> Self {
        Bootstrap(Rc::new(BootstrapInner {
            embedding,
            config,
            live: live_runtimes(embedding),
        }))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.0.config
    }

    pub fn embedding(&self) -> &'static Embedding {
        self.0.embedding
    }

    /// The running object runtime, if any
    pub fn guest(&self) -> Option<ObjectVm> {
        self.dispatcher().map(|d| d.guest().clone())
    }

    fn dispatcher(&self) -> Option<Rc<Dispatcher<ObjectVm>>> {
        self.0.live.dispatcher.borrow().clone()
    }

    // ========================================================================
    // Command runtime hosts the object runtime
    // ========================================================================

    /// Load the bridge into `interp`: the command runtime is the host.
    ///
    /// Loading again from the same side, through this or any other
    /// `Bootstrap` of the thread, reuses the running VM and rebinds the
    /// callback module to `interp`.
    pub fn load_into_command_host(
        &self,
        interp: &CommandInterp,
    ) -> Result<(), BridgeError> {
        match self.0.embedding.request(Side::Command)? {
            InitAction::Bootstrap => match self.boot_object_guest(interp) {
                Ok(dispatcher) => {
                    self.bind_command(interp, dispatcher);
                    self.0.embedding.guest_started()?;
                    info!(command = %self.0.config.command_name, "object runtime started");
                    Ok(())
                }
                Err(err) => {
                    self.0.embedding.abort();
                    self.0.live.dispatcher.borrow_mut().take();
                    self.0.live.host.borrow_mut().take();
                    Err(err)
                }
            },
            InitAction::Reuse => {
                let dispatcher = self.dispatcher().ok_or(BridgeError::NoLiveGuest)?;
                *self.0.live.host.borrow_mut() = Some(interp.downgrade());
                install_callback_module(dispatcher.guest(), &self.0.config.callback_module, interp)?;
                self.bind_command(interp, dispatcher);
                debug!("bridge reused");
                Ok(())
            }
            InitAction::RegisterHandle => {
                let dispatcher = self.dispatcher().ok_or(BridgeError::NoLiveGuest)?;
                self.bind_command(interp, dispatcher);
                debug!("bridge command bound to the hosting runtime");
                Ok(())
            }
        }
    }

    fn boot_object_guest(
        &self,
        interp: &CommandInterp,
    ) -> Result<Rc<Dispatcher<ObjectVm>>, BridgeError> {
        let config = &self.0.config;
        if let Some(path) = &config.guest_library {
            self.0
                .embedding
                .preload(path)
                .map_err(|reason| BridgeError::GuestLibrary {
                    path: path.clone(),
                    reason,
                })?;
        }

        let vm = ObjectVm::new();
        let dispatcher = Rc::new(Dispatcher::new(vm.clone(), config.max_depth));
        *self.0.live.dispatcher.borrow_mut() = Some(dispatcher.clone());
        *self.0.live.host.borrow_mut() = Some(interp.downgrade());

        // the guest loads its side of the bridge while still booting
        self.load_into_object_host(&vm)?;

        if let Some(code) = &config.guest_startup {
            debug!("running guest start-up code");
            if evaluator::evaluate(&vm, code).is_err() {
                return Err(BridgeError::Startup(drain_exception(&vm)));
            }
        }
        Ok(dispatcher)
    }

    /// Register the bridge command unless present and provide the package
    fn bind_command(
        &self,
        interp: &CommandInterp,
        dispatcher: Rc<Dispatcher<ObjectVm>>,
    ) {
        let name = &self.0.config.command_name;
        if !interp.has_command(name) {
            interp.register_command(name, move |_interp, words| {
                let Some((command, args)) = words.split_first() else {
                    return Ok(CmdValue::Empty);
                };
                let args: Vec<String> = args.iter().map(CmdValue::as_string).collect();
                match dispatcher.dispatch(&command.as_string(), &args) {
                    CommandOutcome::Ok(value) => Ok(value.into()),
                    CommandOutcome::Usage(message) | CommandOutcome::Guest(message) => {
                        Err(CmdError::Failed(message))
                    }
                }
            });
        }
        interp.package_provide(PACKAGE_NAME, VERSION);
    }

    /// Make `package require twinbridge` load the bridge into `interp`
    pub fn register_package_loader(
        &self,
        interp: &CommandInterp,
    ) {
        let bootstrap: Weak<BootstrapInner> = Rc::downgrade(&self.0);
        interp.set_package_loader(
            PACKAGE_NAME,
            Rc::new(move |interp: &CommandInterp| -> CmdResult<()> {
                let inner = bootstrap
                    .upgrade()
                    .ok_or_else(|| CmdError::failed("twinbridge is no longer available"))?;
                Bootstrap(inner)
                    .load_into_command_host(interp)
                    .map_err(|err| CmdError::failed(err.to_string()))
            }),
        );
    }

    // ========================================================================
    // Object runtime hosts the command runtime
    // ========================================================================

    /// Load the bridge into `vm`: the object runtime is the host.
    ///
    /// Returns the command interpreter the callback module evaluates in.
    pub fn load_into_object_host(
        &self,
        vm: &ObjectVm,
    ) -> Result<CommandInterp, BridgeError> {
        match self.0.embedding.request(Side::Object)? {
            InitAction::Bootstrap => match self.boot_command_guest(vm) {
                Ok(interp) => {
                    self.0.embedding.guest_started()?;
                    info!(module = %self.0.config.callback_module, "command runtime started");
                    Ok(interp)
                }
                Err(err) => {
                    self.0.embedding.abort();
                    self.0.live.dispatcher.borrow_mut().take();
                    self.0.live.host.borrow_mut().take();
                    self.0.live.owned_host.borrow_mut().take();
                    Err(err)
                }
            },
            InitAction::Reuse => self
                .0
                .live
                .owned_host
                .borrow()
                .clone()
                .ok_or(BridgeError::NoLiveHost),
            InitAction::RegisterHandle => {
                let interp = self
                    .0
                    .live
                    .host
                    .borrow()
                    .as_ref()
                    .and_then(WeakInterp::upgrade)
                    .ok_or(BridgeError::NoLiveHost)?;
                install_callback_module(vm, &self.0.config.callback_module, &interp)?;
                debug!("callback module bound to the hosting interpreter");
                Ok(interp)
            }
        }
    }

    fn boot_command_guest(
        &self,
        vm: &ObjectVm,
    ) -> Result<CommandInterp, BridgeError> {
        let dispatcher = Rc::new(Dispatcher::new(vm.clone(), self.0.config.max_depth));
        *self.0.live.dispatcher.borrow_mut() = Some(dispatcher);

        let interp = CommandInterp::new();
        *self.0.live.host.borrow_mut() = Some(interp.downgrade());
        *self.0.live.owned_host.borrow_mut() = Some(interp.clone());
        install_callback_module(vm, &self.0.config.callback_module, &interp)?;
        self.register_package_loader(&interp);

        // the command side loads its half of the bridge without a second boot
        self.load_into_command_host(&interp)?;
        Ok(interp)
    }
}

// ============================================================================
// Callback module
// ============================================================================

/// Install (or replace) the callback module `name` bound to `interp`
pub fn install_callback_module(
    vm: &ObjectVm,
    name: &str,
    interp: &CommandInterp,
) -> Result<(), BridgeError> {
    let module = Obj::module(name);
    let handle: Rc<dyn Any> = Rc::new(interp.downgrade());
    let module_name = name.to_string();
    let populated = vm
        .set_attribute(&module, "_interp", Obj::capsule(INTERP_CAPSULE, handle))
        .and_then(|()| {
            vm.set_attribute(
                &module,
                "evaluate",
                Obj::native("evaluate", move |vm, args| host_evaluate(vm, &module_name, args)),
            )
        });
    if populated.is_err() {
        return Err(BridgeError::Startup(drain_exception(vm)));
    }
    vm.install_module(name, module);
    debug!(module = name, "callback module installed");
    Ok(())
}

/// `evaluate(code)`: run `code` in the bound command interpreter
fn host_evaluate(
    vm: &ObjectVm,
    module_name: &str,
    args: &[Obj],
) -> GuestResult<Obj> {
    let [code] = args else {
        return Err(vm.raise(
            "TypeError",
            format!("evaluate() takes exactly 1 argument ({} given)", args.len()),
        ));
    };
    let Some(code) = code.as_str() else {
        return Err(vm.raise(
            "TypeError",
            format!("evaluate() argument must be str, not '{}'", code.type_name()),
        ));
    };
    let interp = bound_interp(vm, module_name).ok_or_else(|| vm.raise("RuntimeError", HOST_GONE))?;
    match interp.eval(code) {
        Ok(value) | Err(CmdError::Return(value)) => Ok(Obj::str(value.as_string())),
        Err(err) => Err(vm.raise("RuntimeError", err.to_string())),
    }
}

fn bound_interp(
    vm: &ObjectVm,
    module_name: &str,
) -> Option<CommandInterp> {
    let module = vm.loaded_module(module_name)?;
    let capsule = vm.get_attribute(&module, "_interp").ok();
    if capsule.is_none() {
        vm.clear_exception();
    }
    let capsule = capsule?;
    match capsule.kind() {
        ObjKind::Capsule(c) if c.name == INTERP_CAPSULE => {
            let payload: &dyn Any = &*c.payload;
            payload.downcast_ref::<WeakInterp>()?.upgrade()
        }
        _ => None,
    }
}

/// Formatted text of the pending guest exception, clearing it
fn drain_exception(vm: &ObjectVm) -> String {
    let text = exception::capture_and_format(vm).unwrap_or_default();
    vm.clear_exception();
    text.trim_end_matches('\n').to_string()
}
