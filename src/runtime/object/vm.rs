//! Object runtime interpreter
//!
//! `ObjectVm` is a cheap-to-clone handle. All interior state is borrowed only
//! for the duration of a single lookup or update, never across a call into
//! script or native code, so native functions may call back into the VM (and
//! through the bridge into the command runtime) at any depth.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};
use tracing::{debug, trace};

use super::builtins;
use super::syntax::{self, BinOp, Expr, Stmt, StmtKind, Target};
use super::value::{format_complex, format_float, FrameInfo, FunctionBody, Obj, ObjKind};
use crate::runtime::{GuestResult, GuestRuntime, Raised, RawException};

/// Default nesting limit for script function calls
pub const DEFAULT_RECURSION_LIMIT: usize = 100;

/// Largest result of repeating a string or list, in bytes or items
pub const MAX_REPEAT_LEN: usize = 1 << 28;

/// Hook that populates a native module
pub type NativeModuleInit = Rc<dyn Fn(&ObjectVm, &Obj) -> GuestResult<()>>;

/// Where an importable module comes from
#[derive(Clone)]
pub enum ModuleSource {
    /// Script executed in the fresh module namespace
    Script(String),
    /// Rust initializer
    Native(NativeModuleInit),
}

struct VmInner {
    main: Obj,
    builtins: RefCell<IndexMap<String, Obj>>,
    modules: RefCell<IndexMap<String, Obj>>,
    sources: RefCell<IndexMap<String, ModuleSource>>,
    pending: RefCell<Option<RawException<Obj>>>,
    frames: RefCell<Vec<FrameInfo>>,
    output: RefCell<String>,
    recursion_limit: usize,
}

/// Object runtime instance
#[derive(Clone)]
pub struct ObjectVm(Rc<VmInner>);

enum Flow {
    Normal,
    Return(Obj),
}

/// Name resolution scope of the running code
struct Scope {
    locals: Option<RefCell<IndexMap<String, Obj>>>,
    globals: Obj,
    file: String,
}

impl Default for ObjectVm {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectVm {
    /// Create a VM with the builtin namespace and the `traceback` module source
    pub fn new() -> Self {
        Self::with_recursion_limit(DEFAULT_RECURSION_LIMIT)
    }

    pub fn with_recursion_limit(limit: usize) -> Self {
        let main = Obj::module("__main__");
        let vm = ObjectVm(Rc::new(VmInner {
            main: main.clone(),
            builtins: RefCell::new(IndexMap::new()),
            modules: RefCell::new(IndexMap::new()),
            sources: RefCell::new(IndexMap::new()),
            pending: RefCell::new(None),
            frames: RefCell::new(Vec::new()),
            output: RefCell::new(String::new()),
            recursion_limit: limit,
        }));
        vm.0.modules.borrow_mut().insert("__main__".into(), main);
        builtins::install(&vm);
        debug!("object runtime started");
        vm
    }

    // ========================================================================
    // Host API
    // ========================================================================

    /// The `__main__` module
    pub fn main_module(&self) -> Obj {
        self.0.main.clone()
    }

    /// Register a builtin name
    pub fn define_builtin(
        &self,
        name: &str,
        value: Obj,
    ) {
        self.0.builtins.borrow_mut().insert(name.to_string(), value);
    }

    pub fn builtin(
        &self,
        name: &str,
    ) -> Option<Obj> {
        self.0.builtins.borrow().get(name).cloned()
    }

    /// Make `name` importable
    pub fn register_module_source(
        &self,
        name: &str,
        source: ModuleSource,
    ) {
        self.0.sources.borrow_mut().insert(name.to_string(), source);
    }

    /// Insert an already built module into the module table
    pub fn install_module(
        &self,
        name: &str,
        module: Obj,
    ) {
        self.0.modules.borrow_mut().insert(name.to_string(), module);
    }

    /// Loaded module by full name
    pub fn loaded_module(
        &self,
        name: &str,
    ) -> Option<Obj> {
        self.0.modules.borrow().get(name).cloned()
    }

    /// Forget a module and its source
    pub fn forget_module(
        &self,
        name: &str,
    ) {
        self.0.modules.borrow_mut().shift_remove(name);
        self.0.sources.borrow_mut().shift_remove(name);
    }

    /// Take everything printed so far
    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.0.output.borrow_mut())
    }

    pub(crate) fn write_output(
        &self,
        text: &str,
    ) {
        self.0.output.borrow_mut().push_str(text);
    }

    /// Replace the pending exception
    pub fn set_pending(
        &self,
        exc: RawException<Obj>,
    ) {
        *self.0.pending.borrow_mut() = Some(exc);
    }

    // ========================================================================
    // Raising
    // ========================================================================

    fn traceback_snapshot(&self) -> Option<Obj> {
        let frames = self.0.frames.borrow();
        if frames.is_empty() {
            None
        } else {
            Some(Obj::new(ObjKind::Traceback(frames.clone())))
        }
    }

    /// Raise builtin exception `kind` with a message
    pub fn raise(
        &self,
        kind: &str,
        message: impl Into<String>,
    ) -> Raised {
        let class = self
            .builtin(kind)
            .unwrap_or_else(|| builtins::exception_class(kind, Some("Exception")));
        let exc = RawException {
            kind: class,
            value: Obj::str(message),
            traceback: self.traceback_snapshot(),
        };
        trace!(kind, "raise");
        self.set_pending(exc);
        Raised
    }

    /// Raise an exception class or instance object
    pub fn raise_object(
        &self,
        obj: Obj,
    ) -> Raised {
        match obj.kind() {
            ObjKind::Class(_) => {
                let instance = builtins::instantiate_exception(&obj, Vec::new());
                self.raise_object(instance)
            }
            ObjKind::Exception(e) => {
                let class = self
                    .builtin(&e.class)
                    .unwrap_or_else(|| builtins::exception_class(&e.class, Some("Exception")));
                self.set_pending(RawException {
                    kind: class,
                    value: obj.clone(),
                    traceback: self.traceback_snapshot(),
                });
                Raised
            }
            _ => self.raise("TypeError", "exceptions must derive from BaseException"),
        }
    }

    // ========================================================================
    // Execution
    // ========================================================================

    fn push_frame(
        &self,
        file: &str,
        func: &str,
        line: usize,
    ) -> GuestResult<FrameGuard<'_>> {
        let depth = self.0.frames.borrow().len();
        if depth >= self.0.recursion_limit {
            return Err(self.raise("RecursionError", "maximum recursion depth exceeded"));
        }
        self.0.frames.borrow_mut().push(FrameInfo {
            file: file.to_string(),
            line,
            func: func.to_string(),
        });
        Ok(FrameGuard { vm: self })
    }

    fn set_line(
        &self,
        line: usize,
    ) {
        if let Some(frame) = self.0.frames.borrow_mut().last_mut() {
            frame.line = line;
        }
    }

    /// Parse and run `code` in `module` as file `file`
    pub fn exec_in(
        &self,
        code: &str,
        module: &Obj,
        file: &str,
    ) -> GuestResult<()> {
        let stmts = match syntax::parse(code) {
            Ok(stmts) => stmts,
            Err(err) => return Err(self.raise("SyntaxError", err.to_string())),
        };
        let _frame = self.push_frame(file, "<module>", 1)?;
        let scope = Scope {
            locals: None,
            globals: module.clone(),
            file: file.to_string(),
        };
        self.exec_block(&stmts, &scope).map(|_| ())
    }

    fn exec_block(
        &self,
        stmts: &[Stmt],
        scope: &Scope,
    ) -> GuestResult<Flow> {
        for stmt in stmts {
            self.set_line(stmt.line);
            if let Flow::Return(value) = self.exec_stmt(stmt, scope)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(
        &self,
        stmt: &Stmt,
        scope: &Scope,
    ) -> GuestResult<Flow> {
        match &stmt.kind {
            StmtKind::Pass => {}
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::Assign(target, expr) => {
                let value = self.eval(expr, scope)?;
                self.assign(target, value, scope)?;
            }
            StmtKind::Import(path) => {
                let top = self.import(path)?;
                let top_name = path.split('.').next().unwrap_or(path);
                self.bind(scope, top_name, top);
            }
            StmtKind::Def { name, params, body } => {
                let function = Obj::new(ObjKind::Function(super::value::Function {
                    name: name.clone(),
                    body: FunctionBody::Script {
                        params: params.clone(),
                        body: body.clone(),
                        globals: scope.globals.clone(),
                        file: scope.file.clone(),
                    },
                }));
                self.bind(scope, name, function);
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Obj::none(),
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Raise(Some(expr)) => {
                let exc = self.eval(expr, scope)?;
                return Err(self.raise_object(exc));
            }
            StmtKind::Raise(None) => {
                // scripts have no handler blocks, so nothing is ever active
                return Err(self.raise("RuntimeError", "No active exception to reraise"));
            }
        }
        Ok(Flow::Normal)
    }

    fn bind(
        &self,
        scope: &Scope,
        name: &str,
        value: Obj,
    ) {
        match &scope.locals {
            Some(locals) => {
                locals.borrow_mut().insert(name.to_string(), value);
            }
            None => module_attrs_insert(&scope.globals, name, value),
        }
    }

    fn assign(
        &self,
        target: &Target,
        value: Obj,
        scope: &Scope,
    ) -> GuestResult<()> {
        match target {
            Target::Name(name) => {
                self.bind(scope, name, value);
                Ok(())
            }
            Target::Attr(obj, attr) => {
                let obj = self.eval(obj, scope)?;
                self.set_attribute(&obj, attr, value)
            }
            Target::Index(obj, key) => {
                let obj = self.eval(obj, scope)?;
                let key = self.eval(key, scope)?;
                self.set_item(&obj, key, value)
            }
        }
    }

    fn lookup(
        &self,
        name: &str,
        scope: &Scope,
    ) -> GuestResult<Obj> {
        if let Some(locals) = &scope.locals {
            if let Some(v) = locals.borrow().get(name) {
                return Ok(v.clone());
            }
        }
        if let ObjKind::Module(m) = scope.globals.kind() {
            if let Some(v) = m.attrs.borrow().get(name) {
                return Ok(v.clone());
            }
        }
        if let Some(v) = self.builtin(name) {
            return Ok(v);
        }
        Err(self.raise("NameError", format!("name '{}' is not defined", name)))
    }

    fn eval(
        &self,
        expr: &Expr,
        scope: &Scope,
    ) -> GuestResult<Obj> {
        Ok(match expr {
            Expr::None => Obj::none(),
            Expr::Bool(b) => Obj::bool(*b),
            Expr::Int(i) => Obj::int(i.clone()),
            Expr::Float(f) => Obj::float(*f),
            Expr::Imag(f) => Obj::complex(0.0, *f),
            Expr::Str(s) => Obj::str(s.clone()),
            Expr::Bytes(b) => Obj::bytes(b.clone()),
            Expr::Name(name) => self.lookup(name, scope)?,
            Expr::List(items) => Obj::list(self.eval_all(items, scope)?),
            Expr::Tuple(items) => Obj::tuple(self.eval_all(items, scope)?),
            Expr::Dict(pairs) => {
                let mut evaluated = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    evaluated.push((self.eval(k, scope)?, self.eval(v, scope)?));
                }
                self.new_dict(evaluated)?
            }
            Expr::Attr(obj, attr) => {
                let obj = self.eval(obj, scope)?;
                self.get_attribute(&obj, attr)?
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee, scope)?;
                let args = self.eval_all(args, scope)?;
                self.call_object(&callee, &args)?
            }
            Expr::Index(obj, key) => {
                let obj = self.eval(obj, scope)?;
                let key = self.eval(key, scope)?;
                self.get_item(&obj, &key)?
            }
            Expr::Neg(inner) => {
                let v = self.eval(inner, scope)?;
                self.negate(&v)?
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, scope)?;
                let rhs = self.eval(rhs, scope)?;
                self.binary(*op, &lhs, &rhs)?
            }
        })
    }

    fn eval_all(
        &self,
        exprs: &[Expr],
        scope: &Scope,
    ) -> GuestResult<Vec<Obj>> {
        exprs.iter().map(|e| self.eval(e, scope)).collect()
    }

    /// Build a dict, raising `TypeError` on unhashable keys
    pub fn new_dict(
        &self,
        pairs: Vec<(Obj, Obj)>,
    ) -> GuestResult<Obj> {
        Obj::dict(pairs).map_err(|key| {
            self.raise(
                "TypeError",
                format!("unhashable type: '{}'", key.type_name()),
            )
        })
    }

    /// Invoke a callable object
    pub fn call_object(
        &self,
        callee: &Obj,
        args: &[Obj],
    ) -> GuestResult<Obj> {
        match callee.kind() {
            ObjKind::Function(f) => match &f.body {
                FunctionBody::Native(native) => {
                    let native = native.clone();
                    native(self, args)
                }
                FunctionBody::Script {
                    params,
                    body,
                    globals,
                    file,
                } => {
                    if params.len() != args.len() {
                        return Err(self.raise(
                            "TypeError",
                            format!(
                                "{}() takes {} positional argument{} but {} {} given",
                                f.name,
                                params.len(),
                                if params.len() == 1 { "" } else { "s" },
                                args.len(),
                                if args.len() == 1 { "was" } else { "were" }
                            ),
                        ));
                    }
                    let line = body.first().map(|s| s.line).unwrap_or(1);
                    let _frame = self.push_frame(file, &f.name, line)?;
                    let locals: IndexMap<String, Obj> =
                        params.iter().cloned().zip(args.iter().cloned()).collect();
                    let scope = Scope {
                        locals: Some(RefCell::new(locals)),
                        globals: globals.clone(),
                        file: file.clone(),
                    };
                    match self.exec_block(body, &scope)? {
                        Flow::Return(value) => Ok(value),
                        Flow::Normal => Ok(Obj::none()),
                    }
                }
            },
            ObjKind::Class(_) => Ok(builtins::instantiate_exception(callee, args.to_vec())),
            _ => Err(self.raise(
                "TypeError",
                format!("'{}' object is not callable", callee.type_name()),
            )),
        }
    }

    // ========================================================================
    // Attributes and items
    // ========================================================================

    /// Attribute lookup
    pub fn get_attribute(
        &self,
        obj: &Obj,
        name: &str,
    ) -> GuestResult<Obj> {
        let found = match obj.kind() {
            ObjKind::Module(m) => {
                if name == "__name__" {
                    Some(Obj::str(m.name.clone()))
                } else {
                    m.attrs.borrow().get(name).cloned()
                }
            }
            ObjKind::Instance(i) => i.attrs.borrow().get(name).cloned(),
            ObjKind::Exception(e) if name == "args" => Some(Obj::tuple(e.args.clone())),
            ObjKind::Class(c) if name == "__name__" => Some(Obj::str(c.name.clone())),
            ObjKind::Function(f) if name == "__name__" => Some(Obj::str(f.name.clone())),
            ObjKind::Complex(re, _) if name == "real" => Some(Obj::float(*re)),
            ObjKind::Complex(_, im) if name == "imag" => Some(Obj::float(*im)),
            _ => None,
        };
        found.ok_or_else(|| {
            let message = match obj.kind() {
                ObjKind::Module(m) => {
                    format!("module '{}' has no attribute '{}'", m.name, name)
                }
                _ => format!("'{}' object has no attribute '{}'", obj.type_name(), name),
            };
            self.raise("AttributeError", message)
        })
    }

    /// Attribute assignment
    pub fn set_attribute(
        &self,
        obj: &Obj,
        name: &str,
        value: Obj,
    ) -> GuestResult<()> {
        match obj.kind() {
            ObjKind::Module(m) => {
                m.attrs.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            ObjKind::Instance(i) => {
                i.attrs.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(self.raise(
                "AttributeError",
                format!(
                    "'{}' object attribute '{}' is read-only",
                    obj.type_name(),
                    name
                ),
            )),
        }
    }

    fn index_of(
        &self,
        key: &Obj,
        len: usize,
        what: &str,
    ) -> GuestResult<usize> {
        let index = match key.kind() {
            ObjKind::Int(i) => i.to_i64(),
            ObjKind::Bool(b) => Some(i64::from(*b)),
            _ => {
                return Err(self.raise(
                    "TypeError",
                    format!(
                        "{} indices must be integers, not {}",
                        what,
                        key.type_name()
                    ),
                ))
            }
        };
        let len = len as i64;
        match index {
            Some(i) if i < 0 && i + len >= 0 => Ok((i + len) as usize),
            Some(i) if i >= 0 && i < len => Ok(i as usize),
            _ => Err(self.raise("IndexError", format!("{} index out of range", what))),
        }
    }

    fn key_error(
        &self,
        key: &Obj,
    ) -> Raised {
        let instance = builtins::instantiate_exception(
            &self
                .builtin("KeyError")
                .unwrap_or_else(|| builtins::exception_class("KeyError", Some("LookupError"))),
            vec![Obj::str(key.repr())],
        );
        self.raise_object(instance)
    }

    /// Subscript read
    pub fn get_item(
        &self,
        obj: &Obj,
        key: &Obj,
    ) -> GuestResult<Obj> {
        match obj.kind() {
            ObjKind::List(items) => {
                let len = items.borrow().len();
                let i = self.index_of(key, len, "list")?;
                Ok(items.borrow()[i].clone())
            }
            ObjKind::Tuple(items) => {
                let i = self.index_of(key, items.len(), "tuple")?;
                Ok(items[i].clone())
            }
            ObjKind::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = self.index_of(key, chars.len(), "string")?;
                Ok(Obj::str(chars[i].to_string()))
            }
            ObjKind::Bytes(b) => {
                let i = self.index_of(key, b.len(), "index")?;
                Ok(Obj::int(b[i]))
            }
            ObjKind::Dict(map) => {
                let hashed = key.hash_key().ok_or_else(|| {
                    self.raise(
                        "TypeError",
                        format!("unhashable type: '{}'", key.type_name()),
                    )
                })?;
                let found = map.borrow().get(&hashed).map(|(_, v)| v.clone());
                found.ok_or_else(|| self.key_error(key))
            }
            ObjKind::Instance(inst) => {
                if let Some(pairs) = &inst.mapping {
                    if let Some((_, v)) = pairs.iter().find(|(k, _)| k.equals(key)) {
                        return Ok(v.clone());
                    }
                }
                match (&inst.sequence, key.kind()) {
                    (Some(items), ObjKind::Int(_)) => {
                        let i = self.index_of(key, items.len(), inst.class.as_str())?;
                        Ok(items[i].clone())
                    }
                    _ if inst.mapping.is_some() => Err(self.key_error(key)),
                    _ => Err(self.not_subscriptable(obj)),
                }
            }
            _ => Err(self.not_subscriptable(obj)),
        }
    }

    fn not_subscriptable(
        &self,
        obj: &Obj,
    ) -> Raised {
        self.raise(
            "TypeError",
            format!("'{}' object is not subscriptable", obj.type_name()),
        )
    }

    /// Subscript write
    pub fn set_item(
        &self,
        obj: &Obj,
        key: Obj,
        value: Obj,
    ) -> GuestResult<()> {
        match obj.kind() {
            ObjKind::List(items) => {
                let len = items.borrow().len();
                let i = self.index_of(&key, len, "list assignment")?;
                items.borrow_mut()[i] = value;
                Ok(())
            }
            ObjKind::Dict(map) => {
                let hashed = key.hash_key().ok_or_else(|| {
                    self.raise(
                        "TypeError",
                        format!("unhashable type: '{}'", key.type_name()),
                    )
                })?;
                let mut map = map.borrow_mut();
                match map.get_mut(&hashed) {
                    Some(slot) => slot.1 = value,
                    None => {
                        map.insert(hashed, (key, value));
                    }
                }
                Ok(())
            }
            _ => Err(self.raise(
                "TypeError",
                format!(
                    "'{}' object does not support item assignment",
                    obj.type_name()
                ),
            )),
        }
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    fn negate(
        &self,
        v: &Obj,
    ) -> GuestResult<Obj> {
        match v.kind() {
            ObjKind::Int(i) => Ok(Obj::int(-i.clone())),
            ObjKind::Bool(b) => Ok(Obj::int(-i64::from(*b))),
            ObjKind::Float(f) => Ok(Obj::float(-f)),
            ObjKind::Complex(re, im) => Ok(Obj::complex(-re, -im)),
            _ => Err(self.raise(
                "TypeError",
                format!("bad operand type for unary -: '{}'", v.type_name()),
            )),
        }
    }

    /// Repetition count for `seq * n`, with the result length bounded
    fn repeat_count(
        &self,
        n: &BigInt,
        len: usize,
    ) -> GuestResult<usize> {
        if n.sign() != Sign::Plus || len == 0 {
            return Ok(0);
        }
        let total = n.to_usize().and_then(|count| count.checked_mul(len).map(|total| (count, total)));
        match total {
            None => Err(self.raise("OverflowError", "repeated sequence is too long")),
            Some((_, total)) if total > MAX_REPEAT_LEN => Err(self.raise(
                "MemoryError",
                format!("repeated sequence of {} items is too large", total),
            )),
            Some((count, _)) => Ok(count),
        }
    }

    fn binary(
        &self,
        op: BinOp,
        lhs: &Obj,
        rhs: &Obj,
    ) -> GuestResult<Obj> {
        if let (Some(a), Some(b)) = (as_int(lhs), as_int(rhs)) {
            return self.int_binary(op, a, b);
        }
        if let (Some(a), Some(b)) = (as_real(lhs), as_real(rhs)) {
            return self.float_binary(op, a, b);
        }
        if let (Some(a), Some(b)) = (as_complex(lhs), as_complex(rhs)) {
            match op {
                BinOp::Add => return Ok(Obj::complex(a.0 + b.0, a.1 + b.1)),
                BinOp::Sub => return Ok(Obj::complex(a.0 - b.0, a.1 - b.1)),
                BinOp::Mul => {
                    return Ok(Obj::complex(
                        a.0 * b.0 - a.1 * b.1,
                        a.0 * b.1 + a.1 * b.0,
                    ))
                }
                _ => {}
            }
        }
        match (op, lhs.kind(), rhs.kind()) {
            (BinOp::Add, ObjKind::Str(a), ObjKind::Str(b)) => return Ok(Obj::str(format!("{}{}", a, b))),
            (BinOp::Add, ObjKind::Bytes(a), ObjKind::Bytes(b)) => {
                return Ok(Obj::bytes([a.as_slice(), b.as_slice()].concat()))
            }
            (BinOp::Add, ObjKind::List(a), ObjKind::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                return Ok(Obj::list(items));
            }
            (BinOp::Add, ObjKind::Tuple(a), ObjKind::Tuple(b)) => {
                return Ok(Obj::tuple([a.as_slice(), b.as_slice()].concat()))
            }
            (BinOp::Mul, ObjKind::Str(s), ObjKind::Int(n)) => {
                let count = self.repeat_count(n, s.len())?;
                return Ok(Obj::str(s.repeat(count)));
            }
            (BinOp::Mul, ObjKind::List(items), ObjKind::Int(n)) => {
                let items = items.borrow();
                let count = self.repeat_count(n, items.len())?;
                let mut out = Vec::with_capacity(items.len() * count);
                for _ in 0..count {
                    out.extend(items.iter().cloned());
                }
                return Ok(Obj::list(out));
            }
            _ => {}
        }
        Err(self.raise(
            "TypeError",
            format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                lhs.type_name(),
                rhs.type_name()
            ),
        ))
    }

    fn int_binary(
        &self,
        op: BinOp,
        a: BigInt,
        b: BigInt,
    ) -> GuestResult<Obj> {
        Ok(match op {
            BinOp::Add => Obj::int(a + b),
            BinOp::Sub => Obj::int(a - b),
            BinOp::Mul => Obj::int(a * b),
            BinOp::Div => {
                if b.is_zero() {
                    return Err(self.raise("ZeroDivisionError", "division by zero"));
                }
                Obj::float(a.to_f64().unwrap_or(f64::NAN) / b.to_f64().unwrap_or(f64::NAN))
            }
            BinOp::Mod => {
                if b.is_zero() {
                    return Err(self.raise("ZeroDivisionError", "integer modulo by zero"));
                }
                let mut r = &a % &b;
                if !r.is_zero() && ((r < BigInt::zero()) != (b < BigInt::zero())) {
                    r += &b;
                }
                Obj::int(r)
            }
        })
    }

    fn float_binary(
        &self,
        op: BinOp,
        a: f64,
        b: f64,
    ) -> GuestResult<Obj> {
        Ok(Obj::float(match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => {
                if b == 0.0 {
                    return Err(self.raise("ZeroDivisionError", "float division by zero"));
                }
                a / b
            }
            BinOp::Mod => {
                if b == 0.0 {
                    return Err(self.raise("ZeroDivisionError", "float modulo"));
                }
                let r = a % b;
                if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                    r + b
                } else {
                    r
                }
            }
        }))
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// `str()` conversion, which may raise for objects with a failing hook
    pub fn str_of(
        &self,
        obj: &Obj,
    ) -> GuestResult<String> {
        match obj.plain_str() {
            Some(s) => Ok(s),
            None => {
                let message = match obj.kind() {
                    ObjKind::Instance(i) => match &i.text {
                        Some(Err(m)) => m.clone(),
                        _ => String::new(),
                    },
                    _ => String::new(),
                };
                Err(self.raise("RuntimeError", message))
            }
        }
    }

    /// Elements of anything iterable
    pub fn iterate(
        &self,
        obj: &Obj,
    ) -> GuestResult<Vec<Obj>> {
        match obj.kind() {
            ObjKind::List(items) => Ok(items.borrow().clone()),
            ObjKind::Tuple(items) => Ok(items.clone()),
            ObjKind::Str(s) => Ok(s.chars().map(|c| Obj::str(c.to_string())).collect()),
            ObjKind::Bytes(b) => Ok(b.iter().map(|&byte| Obj::int(byte)).collect()),
            ObjKind::Dict(map) => Ok(map.borrow().values().map(|(k, _)| k.clone()).collect()),
            ObjKind::Instance(i) => {
                if let Some(items) = &i.sequence {
                    Ok(items.clone())
                } else if let Some(pairs) = &i.mapping {
                    Ok(pairs.iter().map(|(k, _)| k.clone()).collect())
                } else {
                    Err(self.not_iterable(obj))
                }
            }
            _ => Err(self.not_iterable(obj)),
        }
    }

    fn not_iterable(
        &self,
        obj: &Obj,
    ) -> Raised {
        self.raise(
            "TypeError",
            format!("'{}' object is not iterable", obj.type_name()),
        )
    }

    // ========================================================================
    // Import
    // ========================================================================

    /// Import a dotted module path and return the top-level package.
    ///
    /// Every prefix is loaded in order and bound as an attribute of its parent.
    pub fn import(
        &self,
        path: &str,
    ) -> GuestResult<Obj> {
        let mut top = None;
        let mut parent: Option<Obj> = None;
        let mut full = String::new();
        for segment in path.split('.') {
            if segment.is_empty() {
                return Err(self.raise("ValueError", format!("Empty module name in '{}'", path)));
            }
            if !full.is_empty() {
                full.push('.');
            }
            full.push_str(segment);
            let module = self.load_module(&full)?;
            if let Some(parent) = &parent {
                self.set_attribute(parent, segment, module.clone())?;
            }
            if top.is_none() {
                top = Some(module.clone());
            }
            parent = Some(module);
        }
        top.ok_or_else(|| self.raise("ValueError", "Empty module name"))
    }

    fn load_module(
        &self,
        name: &str,
    ) -> GuestResult<Obj> {
        if let Some(module) = self.loaded_module(name) {
            return Ok(module);
        }
        let source = self.0.sources.borrow().get(name).cloned();
        let source = match source {
            Some(source) => source,
            None => {
                let prefix = format!("{}.", name);
                let is_namespace = self
                    .0
                    .sources
                    .borrow()
                    .keys()
                    .any(|k| k.starts_with(&prefix));
                if !is_namespace {
                    return Err(self.raise(
                        "ModuleNotFoundError",
                        format!("No module named '{}'", name),
                    ));
                }
                ModuleSource::Script(String::new())
            }
        };
        debug!(module = name, "loading module");
        let module = Obj::module(name);
        self.install_module(name, module.clone());
        let loaded = match source {
            ModuleSource::Script(code) => self.exec_in(&code, &module, &format!("<{}>", name)),
            ModuleSource::Native(init) => init(self, &module),
        };
        if let Err(raised) = loaded {
            self.0.modules.borrow_mut().shift_remove(name);
            return Err(raised);
        }
        Ok(module)
    }

    // ========================================================================
    // Exception state
    // ========================================================================

    pub fn pending(&self) -> Option<RawException<Obj>> {
        self.0.pending.borrow().clone()
    }

    /// Fetch and clear the pending exception
    pub fn fetch(&self) -> Option<RawException<Obj>> {
        self.0.pending.borrow_mut().take()
    }
}

struct FrameGuard<'a> {
    vm: &'a ObjectVm,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.vm.0.frames.borrow_mut().pop();
    }
}

fn module_attrs_insert(
    module: &Obj,
    name: &str,
    value: Obj,
) {
    if let ObjKind::Module(m) = module.kind() {
        m.attrs.borrow_mut().insert(name.to_string(), value);
    }
}

fn as_int(obj: &Obj) -> Option<BigInt> {
    match obj.kind() {
        ObjKind::Int(i) => Some(i.clone()),
        ObjKind::Bool(b) => Some(BigInt::from(u8::from(*b))),
        _ => None,
    }
}

fn as_real(obj: &Obj) -> Option<f64> {
    match obj.kind() {
        ObjKind::Float(f) => Some(*f),
        _ => as_int(obj).and_then(|i| i.to_f64()),
    }
}

fn as_complex(obj: &Obj) -> Option<(f64, f64)> {
    match obj.kind() {
        ObjKind::Complex(re, im) => Some((*re, *im)),
        _ => as_real(obj).map(|re| (re, 0.0)),
    }
}

// ============================================================================
// Bridge services
// ============================================================================

impl GuestRuntime for ObjectVm {
    type Value = Obj;

    fn main_namespace(&self) -> Obj {
        self.main_module()
    }

    fn get_attr(
        &self,
        obj: &Obj,
        name: &str,
    ) -> GuestResult<Obj> {
        self.get_attribute(obj, name)
    }

    fn set_attr(
        &self,
        obj: &Obj,
        name: &str,
        value: Obj,
    ) -> GuestResult<()> {
        self.set_attribute(obj, name, value)
    }

    fn is_callable(
        &self,
        obj: &Obj,
    ) -> bool {
        matches!(obj.kind(), ObjKind::Function(_) | ObjKind::Class(_))
    }

    fn call(
        &self,
        callable: &Obj,
        args: Vec<Obj>,
    ) -> GuestResult<Obj> {
        self.call_object(callable, &args)
    }

    fn new_text(
        &self,
        text: &str,
    ) -> Obj {
        Obj::str(text)
    }

    fn type_name(
        &self,
        obj: &Obj,
    ) -> String {
        obj.type_name()
    }

    fn run_script(
        &self,
        code: &str,
    ) -> GuestResult<()> {
        let main = self.main_module();
        self.exec_in(code, &main, "<string>")
    }

    fn import_module(
        &self,
        name: &str,
    ) -> GuestResult<Obj> {
        self.import(name)
    }

    fn module_name(
        &self,
        module: &Obj,
    ) -> GuestResult<String> {
        match module.kind() {
            ObjKind::Module(m) => Ok(m.name.clone()),
            _ => Err(self.raise(
                "TypeError",
                format!("expected a module, got '{}'", module.type_name()),
            )),
        }
    }

    fn is_null(
        &self,
        obj: &Obj,
    ) -> bool {
        matches!(obj.kind(), ObjKind::None)
    }

    fn as_bool(
        &self,
        obj: &Obj,
    ) -> Option<bool> {
        match obj.kind() {
            ObjKind::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn as_bytes(
        &self,
        obj: &Obj,
    ) -> Option<Vec<u8>> {
        match obj.kind() {
            ObjKind::Bytes(b) => Some(b.clone()),
            _ => None,
        }
    }

    fn as_text(
        &self,
        obj: &Obj,
    ) -> Option<String> {
        obj.as_str().map(str::to_string)
    }

    fn number_text(
        &self,
        obj: &Obj,
    ) -> GuestResult<Option<String>> {
        Ok(match obj.kind() {
            ObjKind::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
            ObjKind::Int(i) => Some(i.to_string()),
            ObjKind::Float(f) => Some(format_float(*f)),
            ObjKind::Complex(re, im) => Some(format_complex(*re, *im)),
            _ => None,
        })
    }

    fn mapping_items(
        &self,
        obj: &Obj,
    ) -> GuestResult<Option<Vec<(Obj, Obj)>>> {
        Ok(match obj.kind() {
            ObjKind::Dict(map) => Some(map.borrow().values().cloned().collect()),
            ObjKind::Instance(i) => i.mapping.clone(),
            _ => None,
        })
    }

    fn sequence_items(
        &self,
        obj: &Obj,
    ) -> GuestResult<Option<Vec<Obj>>> {
        match obj.kind() {
            ObjKind::List(_) | ObjKind::Tuple(_) | ObjKind::Str(_) | ObjKind::Bytes(_) => {
                self.iterate(obj).map(Some)
            }
            ObjKind::Instance(i) => Ok(i.sequence.clone()),
            _ => Ok(None),
        }
    }

    fn display(
        &self,
        obj: &Obj,
    ) -> GuestResult<String> {
        self.str_of(obj)
    }

    fn take_exception(&self) -> Option<RawException<Obj>> {
        self.fetch()
    }

    fn has_exception(&self) -> bool {
        self.0.pending.borrow().is_some()
    }

    fn clear_exception(&self) {
        self.0.pending.borrow_mut().take();
    }

    fn normalize_exception(
        &self,
        exc: &mut RawException<Obj>,
    ) -> GuestResult<()> {
        let class_name = match exc.kind.kind() {
            ObjKind::Class(c) => c.name.clone(),
            _ => {
                return Err(self.raise(
                    "SystemError",
                    format!(
                        "exception type must be a class, not '{}'",
                        exc.kind.type_name()
                    ),
                ))
            }
        };
        let normalized = matches!(exc.value.kind(), ObjKind::Exception(e) if e.class == class_name);
        if !normalized {
            let args = match exc.value.kind() {
                ObjKind::None => Vec::new(),
                ObjKind::Tuple(items) => items.clone(),
                _ => vec![exc.value.clone()],
            };
            exc.value = builtins::instantiate_exception(&exc.kind, args);
        }
        Ok(())
    }

    fn traceback_formatter(&self) -> GuestResult<Obj> {
        self.import("traceback")
    }
}
