//! Command interpreter state and evaluation

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::builtins;
use super::parser::{self, Command, Part, Word};
use super::{CmdError, CmdValue};

pub type CmdResult<T = CmdValue> = Result<T, CmdError>;

/// Implementation of a command; `words[0]` is the command name
pub type CommandFn = Rc<dyn Fn(&CommandInterp, &[CmdValue]) -> CmdResult>;

/// Hook run by `package require` for a package not yet provided
pub type PackageLoader = Rc<dyn Fn(&CommandInterp) -> CmdResult<()>>;

/// Nesting limit for scripts, substitutions and procedures
const MAX_NESTING: usize = 200;

struct InterpInner {
    commands: RefCell<IndexMap<String, CommandFn>>,
    frames: RefCell<Vec<IndexMap<String, CmdValue>>>,
    packages: RefCell<IndexMap<String, String>>,
    loaders: RefCell<IndexMap<String, PackageLoader>>,
    assoc: RefCell<IndexMap<String, Rc<dyn Any>>>,
    output: RefCell<String>,
    error_info: RefCell<String>,
    /// An error is unwinding and `error_info` is being extended
    unwinding: Cell<bool>,
    depth: Cell<usize>,
}

/// Command runtime instance
#[derive(Clone)]
pub struct CommandInterp(Rc<InterpInner>);

/// Non-owning interpreter handle
#[derive(Clone)]
pub struct WeakInterp(Weak<InterpInner>);

impl WeakInterp {
    pub fn upgrade(&self) -> Option<CommandInterp> {
        self.0.upgrade().map(CommandInterp)
    }
}

impl fmt::Debug for CommandInterp {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CommandInterp")
            .field("commands", &self.0.commands.borrow().len())
            .field("packages", &*self.0.packages.borrow())
            .field("depth", &self.0.depth.get())
            .finish()
    }
}

impl Default for CommandInterp {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandInterp {
    pub fn new() -> Self {
        let interp = CommandInterp(Rc::new(InterpInner {
            commands: RefCell::new(IndexMap::new()),
            frames: RefCell::new(vec![IndexMap::new()]),
            packages: RefCell::new(IndexMap::new()),
            loaders: RefCell::new(IndexMap::new()),
            assoc: RefCell::new(IndexMap::new()),
            output: RefCell::new(String::new()),
            error_info: RefCell::new(String::new()),
            unwinding: Cell::new(false),
            depth: Cell::new(0),
        }));
        builtins::install(&interp);
        debug!("command runtime started");
        interp
    }

    pub fn downgrade(&self) -> WeakInterp {
        WeakInterp(Rc::downgrade(&self.0))
    }

    /// Whether two handles name the same interpreter
    pub fn same(
        &self,
        other: &CommandInterp,
    ) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // ========================================================================
    // Command table
    // ========================================================================

    pub fn register_command(
        &self,
        name: &str,
        command: impl Fn(&CommandInterp, &[CmdValue]) -> CmdResult + 'static,
    ) {
        self.register_command_fn(name, Rc::new(command));
    }

    pub fn register_command_fn(
        &self,
        name: &str,
        command: CommandFn,
    ) {
        trace!(name, "register command");
        self.0.commands.borrow_mut().insert(name.to_string(), command);
    }

    pub fn has_command(
        &self,
        name: &str,
    ) -> bool {
        self.0.commands.borrow().contains_key(name)
    }

    pub fn remove_command(
        &self,
        name: &str,
    ) -> bool {
        self.0.commands.borrow_mut().shift_remove(name).is_some()
    }

    pub fn command_names(&self) -> Vec<String> {
        self.0.commands.borrow().keys().cloned().collect()
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Evaluate a script and return the result of its last command.
    ///
    /// At the outermost level a failure leaves its trace in the `errorInfo`
    /// global variable.
    pub fn eval(
        &self,
        script: &str,
    ) -> CmdResult {
        let outermost = self.0.depth.get() == 0;
        if outermost {
            self.0.unwinding.set(false);
            self.0.error_info.borrow_mut().clear();
        }
        let result = parser::parse(script).and_then(|commands| self.eval_commands(&commands));
        if !outermost {
            return result;
        }
        match self.settle(result) {
            Err(CmdError::Return(value)) => Ok(value),
            other => other,
        }
    }

    /// Invoke a command from already substituted words
    pub fn invoke(
        &self,
        words: &[CmdValue],
    ) -> CmdResult {
        let name = match words.first() {
            Some(name) => name.as_string(),
            None => return Ok(CmdValue::Empty),
        };
        let command = self.0.commands.borrow().get(&name).cloned();
        match command {
            Some(command) => command(self, words),
            None => Err(CmdError::UnknownCommand(name)),
        }
    }

    pub(crate) fn eval_commands(
        &self,
        commands: &[Command],
    ) -> CmdResult {
        let _guard = self.enter()?;
        let mut result = CmdValue::Empty;
        for command in commands {
            let mut words = Vec::with_capacity(command.words.len());
            for word in &command.words {
                match self.substitute(word) {
                    Ok(value) => words.push(value),
                    Err(err) => return Err(self.record(err, &command.text)),
                }
            }
            result = match self.invoke(&words) {
                Ok(value) => value,
                Err(err) => return Err(self.record(err, &command.text)),
            };
        }
        Ok(result)
    }

    fn substitute(
        &self,
        word: &Word,
    ) -> CmdResult {
        if let [part] = word.parts.as_slice() {
            return self.part_value(part);
        }
        let mut text = String::new();
        for part in &word.parts {
            text.push_str(&self.part_value(part)?.as_string());
        }
        Ok(CmdValue::text(text))
    }

    fn part_value(
        &self,
        part: &Part,
    ) -> CmdResult {
        match part {
            Part::Literal(s) => Ok(CmdValue::text(s.clone())),
            Part::Var(name) => self.get_var(name),
            Part::Script(commands) => self.eval_commands(commands),
        }
    }

    fn enter(&self) -> CmdResult<DepthGuard<'_>> {
        let depth = self.0.depth.get();
        if depth >= MAX_NESTING {
            return Err(CmdError::failed(
                "too many nested evaluations (infinite loop?)",
            ));
        }
        self.0.depth.set(depth + 1);
        Ok(DepthGuard { interp: self })
    }

    /// Extend the error trace with the command that failed
    fn record(
        &self,
        err: CmdError,
        text: &str,
    ) -> CmdError {
        if matches!(err, CmdError::Return(_)) {
            return err;
        }
        let mut info = self.0.error_info.borrow_mut();
        if self.0.unwinding.replace(true) {
            info.push_str(&format!("\n    invoked from within\n\"{}\"", text));
        } else {
            *info = format!("{}\n    while executing\n\"{}\"", err, text);
        }
        err
    }

    /// Stop unwinding and publish the trace of `result` if it failed
    pub(crate) fn settle(
        &self,
        result: CmdResult,
    ) -> CmdResult {
        self.0.unwinding.set(false);
        if let Err(err) = &result {
            if !matches!(err, CmdError::Return(_)) {
                let info = {
                    let mut info = self.0.error_info.borrow_mut();
                    if info.is_empty() {
                        *info = err.to_string();
                    }
                    info.clone()
                };
                self.set_global("errorInfo", CmdValue::text(info));
            }
        }
        result
    }

    /// Trace of the most recent error
    pub fn error_info(&self) -> String {
        self.0.error_info.borrow().clone()
    }

    // ========================================================================
    // Variables
    // ========================================================================

    pub fn get_var(
        &self,
        name: &str,
    ) -> CmdResult {
        let frames = self.0.frames.borrow();
        frames
            .last()
            .and_then(|frame| frame.get(name))
            .cloned()
            .ok_or_else(|| CmdError::NoSuchVariable(name.to_string()))
    }

    pub fn set_var(
        &self,
        name: &str,
        value: CmdValue,
    ) {
        if let Some(frame) = self.0.frames.borrow_mut().last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    pub fn unset_var(
        &self,
        name: &str,
    ) -> bool {
        self.0
            .frames
            .borrow_mut()
            .last_mut()
            .map(|frame| frame.shift_remove(name).is_some())
            .unwrap_or(false)
    }

    pub fn var_exists(
        &self,
        name: &str,
    ) -> bool {
        self.get_var(name).is_ok()
    }

    pub fn set_global(
        &self,
        name: &str,
        value: CmdValue,
    ) {
        if let Some(frame) = self.0.frames.borrow_mut().first_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    pub fn get_global(
        &self,
        name: &str,
    ) -> Option<CmdValue> {
        self.0.frames.borrow().first().and_then(|f| f.get(name)).cloned()
    }

    /// Run `body` in a fresh local variable frame
    pub(crate) fn with_frame<T>(
        &self,
        locals: IndexMap<String, CmdValue>,
        body: impl FnOnce() -> T,
    ) -> T {
        self.0.frames.borrow_mut().push(locals);
        let _pop = FramePop { interp: self };
        body()
    }

    // ========================================================================
    // Packages
    // ========================================================================

    pub fn package_provide(
        &self,
        name: &str,
        version: &str,
    ) {
        debug!(package = name, version, "package provided");
        self.0
            .packages
            .borrow_mut()
            .insert(name.to_string(), version.to_string());
    }

    pub fn package_present(
        &self,
        name: &str,
    ) -> Option<String> {
        self.0.packages.borrow().get(name).cloned()
    }

    pub fn set_package_loader(
        &self,
        name: &str,
        loader: PackageLoader,
    ) {
        self.0.loaders.borrow_mut().insert(name.to_string(), loader);
    }

    /// Load `name` through its loader unless already provided
    pub fn package_require(
        &self,
        name: &str,
    ) -> CmdResult<String> {
        if let Some(version) = self.package_present(name) {
            return Ok(version);
        }
        let loader = self.0.loaders.borrow().get(name).cloned();
        let loader = loader.ok_or_else(|| CmdError::failed(format!("can't find package {}", name)))?;
        loader(self)?;
        self.package_present(name).ok_or_else(|| {
            CmdError::failed(format!(
                "attempt to provide package {} failed: no version of package {} provided",
                name, name
            ))
        })
    }

    // ========================================================================
    // Associated data and output
    // ========================================================================

    pub fn set_assoc_data<T: Any>(
        &self,
        key: &str,
        data: Rc<T>,
    ) {
        self.0.assoc.borrow_mut().insert(key.to_string(), data);
    }

    pub fn assoc_data<T: Any>(
        &self,
        key: &str,
    ) -> Option<Rc<T>> {
        let data = self.0.assoc.borrow().get(key).cloned()?;
        data.downcast::<T>().ok()
    }

    pub fn write_output(
        &self,
        text: &str,
    ) {
        self.0.output.borrow_mut().push_str(text);
    }

    /// Take everything written by `puts` so far
    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.0.output.borrow_mut())
    }
}

struct DepthGuard<'a> {
    interp: &'a CommandInterp,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        let depth = self.interp.0.depth.get();
        self.interp.0.depth.set(depth.saturating_sub(1));
    }
}

struct FramePop<'a> {
    interp: &'a CommandInterp,
}

impl Drop for FramePop<'_> {
    fn drop(&mut self) {
        self.interp.0.frames.borrow_mut().pop();
    }
}
