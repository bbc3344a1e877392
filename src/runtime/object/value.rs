//! Object runtime values
//!
//! `Obj` is a reference-counted handle. Containers that scripts can mutate
//! (lists, dicts, module and instance attributes) sit behind `RefCell`, so a
//! list can end up containing itself exactly like in any dynamic runtime.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;

use super::syntax::Stmt;
use super::vm::ObjectVm;
use crate::runtime::GuestResult;

/// Signature of a function implemented in Rust.
pub type NativeFn = Rc<dyn Fn(&ObjectVm, &[Obj]) -> GuestResult<Obj>>;

/// Owned handle to an object runtime value
#[derive(Clone)]
pub struct Obj(Rc<ObjKind>);

/// Object payloads
pub enum ObjKind {
    /// The singleton "no value"
    None,
    /// Boolean
    Bool(bool),
    /// Arbitrary precision integer
    Int(BigInt),
    /// Double precision float
    Float(f64),
    /// Complex number (real, imaginary)
    Complex(f64, f64),
    /// Immutable byte string
    Bytes(Vec<u8>),
    /// Unicode text
    Str(String),
    /// Mutable list
    List(RefCell<Vec<Obj>>),
    /// Immutable tuple
    Tuple(Vec<Obj>),
    /// Insertion-ordered dict, keyed by the key's repr
    Dict(RefCell<IndexMap<String, (Obj, Obj)>>),
    /// Module namespace
    Module(Module),
    /// Callable function
    Function(Function),
    /// Exception class
    Class(ExceptionClass),
    /// Exception instance
    Exception(ExceptionObj),
    /// Captured traceback, oldest frame first
    Traceback(Vec<FrameInfo>),
    /// Opaque native pointer
    Capsule(Capsule),
    /// Generic object with attributes and optional protocols
    Instance(Instance),
}

/// Module namespace object
pub struct Module {
    /// Fully qualified module name
    pub name: String,
    /// Module globals
    pub attrs: RefCell<IndexMap<String, Obj>>,
}

/// Function object
pub struct Function {
    /// Function name as shown in tracebacks
    pub name: String,
    /// Body
    pub body: FunctionBody,
}

/// Function implementation
pub enum FunctionBody {
    /// Implemented in Rust
    Native(NativeFn),
    /// Defined by a script
    Script {
        /// Parameter names
        params: Vec<String>,
        /// Statements of the body
        body: Rc<Vec<Stmt>>,
        /// Namespace the function was defined in
        globals: Obj,
        /// Source file name shown in tracebacks
        file: String,
    },
}

/// Exception class
pub struct ExceptionClass {
    /// Class name
    pub name: String,
    /// Base class name, `None` for the root
    pub base: Option<String>,
}

/// Exception instance
pub struct ExceptionObj {
    /// Class name
    pub class: String,
    /// Constructor arguments
    pub args: Vec<Obj>,
}

/// One frame of a traceback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Source file name
    pub file: String,
    /// 1-based line number
    pub line: usize,
    /// Function name, `<module>` for top-level code
    pub func: String,
}

/// Opaque native pointer carried by a guest object
pub struct Capsule {
    /// Capsule name checked on extraction
    pub name: String,
    /// Payload
    pub payload: Rc<dyn Any>,
}

/// Generic object with optional protocols
pub struct Instance {
    /// Class name
    pub class: String,
    /// Attributes
    pub attrs: RefCell<IndexMap<String, Obj>>,
    /// Mapping protocol: key/value pairs
    pub mapping: Option<Vec<(Obj, Obj)>>,
    /// Sequence protocol: elements
    pub sequence: Option<Vec<Obj>>,
    /// `str()` hook; `Err` carries the message of a raised `RuntimeError`
    pub text: Option<Result<String, String>>,
}

// ============================================================================
// Construction
// ============================================================================

impl Obj {
    /// Wrap a payload
    pub fn new(kind: ObjKind) -> Self {
        Obj(Rc::new(kind))
    }

    pub fn none() -> Self {
        Obj::new(ObjKind::None)
    }

    pub fn bool(b: bool) -> Self {
        Obj::new(ObjKind::Bool(b))
    }

    pub fn int(i: impl Into<BigInt>) -> Self {
        Obj::new(ObjKind::Int(i.into()))
    }

    pub fn float(f: f64) -> Self {
        Obj::new(ObjKind::Float(f))
    }

    pub fn complex(
        re: f64,
        im: f64,
    ) -> Self {
        Obj::new(ObjKind::Complex(re, im))
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Obj::new(ObjKind::Bytes(b.into()))
    }

    pub fn str(s: impl Into<String>) -> Self {
        Obj::new(ObjKind::Str(s.into()))
    }

    pub fn list(items: Vec<Obj>) -> Self {
        Obj::new(ObjKind::List(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Obj>) -> Self {
        Obj::new(ObjKind::Tuple(items))
    }

    /// Build a dict, rejecting unhashable keys
    pub fn dict(pairs: Vec<(Obj, Obj)>) -> Result<Self, Obj> {
        let mut map: IndexMap<String, (Obj, Obj)> = IndexMap::new();
        for (k, v) in pairs {
            let key = k.hash_key().ok_or_else(|| k.clone())?;
            match map.get_mut(&key) {
                // an equal key keeps its original object
                Some(slot) => slot.1 = v,
                None => {
                    map.insert(key, (k, v));
                }
            }
        }
        Ok(Obj::new(ObjKind::Dict(RefCell::new(map))))
    }

    pub fn module(name: impl Into<String>) -> Self {
        Obj::new(ObjKind::Module(Module {
            name: name.into(),
            attrs: RefCell::new(IndexMap::new()),
        }))
    }

    /// Native function object
    pub fn native(
        name: impl Into<String>,
        f: impl Fn(&ObjectVm, &[Obj]) -> GuestResult<Obj> + 'static,
    ) -> Self {
        Obj::new(ObjKind::Function(Function {
            name: name.into(),
            body: FunctionBody::Native(Rc::new(f)),
        }))
    }

    pub fn capsule(
        name: impl Into<String>,
        payload: Rc<dyn Any>,
    ) -> Self {
        Obj::new(ObjKind::Capsule(Capsule {
            name: name.into(),
            payload,
        }))
    }

    /// Start building an [`Instance`]
    pub fn instance(class: impl Into<String>) -> InstanceBuilder {
        InstanceBuilder {
            class: class.into(),
            mapping: None,
            sequence: None,
            text: None,
        }
    }
}

/// Builder for [`Instance`] objects
pub struct InstanceBuilder {
    class: String,
    mapping: Option<Vec<(Obj, Obj)>>,
    sequence: Option<Vec<Obj>>,
    text: Option<Result<String, String>>,
}

impl InstanceBuilder {
    /// Give the instance the mapping protocol
    pub fn mapping(
        mut self,
        items: Vec<(Obj, Obj)>,
    ) -> Self {
        self.mapping = Some(items);
        self
    }

    /// Give the instance the sequence protocol
    pub fn sequence(
        mut self,
        items: Vec<Obj>,
    ) -> Self {
        self.sequence = Some(items);
        self
    }

    /// Override `str()`
    pub fn text(
        mut self,
        text: impl Into<String>,
    ) -> Self {
        self.text = Some(Ok(text.into()));
        self
    }

    /// Make `str()` raise `RuntimeError(message)`
    pub fn failing_text(
        mut self,
        message: impl Into<String>,
    ) -> Self {
        self.text = Some(Err(message.into()));
        self
    }

    pub fn build(self) -> Obj {
        Obj::new(ObjKind::Instance(Instance {
            class: self.class,
            attrs: RefCell::new(IndexMap::new()),
            mapping: self.mapping,
            sequence: self.sequence,
            text: self.text,
        }))
    }
}

// ============================================================================
// Queries
// ============================================================================

impl Obj {
    /// Payload
    pub fn kind(&self) -> &ObjKind {
        &self.0
    }

    /// Identity comparison
    pub fn is(
        &self,
        other: &Obj,
    ) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Type name as the runtime reports it
    pub fn type_name(&self) -> String {
        match self.kind() {
            ObjKind::None => "NoneType".into(),
            ObjKind::Bool(_) => "bool".into(),
            ObjKind::Int(_) => "int".into(),
            ObjKind::Float(_) => "float".into(),
            ObjKind::Complex(..) => "complex".into(),
            ObjKind::Bytes(_) => "bytes".into(),
            ObjKind::Str(_) => "str".into(),
            ObjKind::List(_) => "list".into(),
            ObjKind::Tuple(_) => "tuple".into(),
            ObjKind::Dict(_) => "dict".into(),
            ObjKind::Module(_) => "module".into(),
            ObjKind::Function(f) => match f.body {
                FunctionBody::Native(_) => "builtin_function_or_method".into(),
                FunctionBody::Script { .. } => "function".into(),
            },
            ObjKind::Class(_) => "type".into(),
            ObjKind::Exception(e) => e.class.clone(),
            ObjKind::Traceback(_) => "traceback".into(),
            ObjKind::Capsule(_) => "capsule".into(),
            ObjKind::Instance(i) => i.class.clone(),
        }
    }

    /// Text payload of a `str`
    pub fn as_str(&self) -> Option<&str> {
        match self.kind() {
            ObjKind::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness
    pub fn truthy(&self) -> bool {
        match self.kind() {
            ObjKind::None => false,
            ObjKind::Bool(b) => *b,
            ObjKind::Int(i) => i != &BigInt::from(0),
            ObjKind::Float(f) => *f != 0.0,
            ObjKind::Complex(re, im) => *re != 0.0 || *im != 0.0,
            ObjKind::Bytes(b) => !b.is_empty(),
            ObjKind::Str(s) => !s.is_empty(),
            ObjKind::List(l) => !l.borrow().is_empty(),
            ObjKind::Tuple(t) => !t.is_empty(),
            ObjKind::Dict(d) => !d.borrow().is_empty(),
            _ => true,
        }
    }

    /// Key used for dict storage; `None` for unhashable values
    pub fn hash_key(&self) -> Option<String> {
        match self.kind() {
            ObjKind::List(_) | ObjKind::Dict(_) => None,
            ObjKind::Tuple(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(item.hash_key()?);
                }
                Some(format!("({})", parts.join(", ")))
            }
            // 1 == 1.0 == True in dict keys
            ObjKind::Bool(b) => Some(if *b { "1" } else { "0" }.into()),
            ObjKind::Float(f) if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e18 => {
                Some(format!("{}", *f as i64))
            }
            _ => Some(self.repr()),
        }
    }

    /// Value equality as used by `==`
    pub fn equals(
        &self,
        other: &Obj,
    ) -> bool {
        if self.is(other) {
            return true;
        }
        match (self.kind(), other.kind()) {
            (ObjKind::List(a), ObjKind::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (ObjKind::Tuple(a), ObjKind::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (ObjKind::Dict(a), ObjKind::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, (_, v))| b.get(k).is_some_and(|(_, w)| v.equals(w)))
            }
            _ => match (self.hash_key(), other.hash_key()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

// ============================================================================
// Text forms
// ============================================================================

/// Format a float the way the runtime's `str()` does.
///
/// Shortest round-trip digits; decimal exponents below -4 or from 16 up
/// switch to `1e+16` / `1e-07` form.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.into();
    }
    let scientific = format!("{:e}", f);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-4..16).contains(&exponent) {
        if f.fract() == 0.0 {
            format!("{:.1}", f)
        } else {
            format!("{}", f)
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.unsigned_abs())
    }
}

fn format_complex_part(f: f64) -> String {
    let s = format_float(f);
    s.strip_suffix(".0").map(str::to_string).unwrap_or(s)
}

/// Format a complex number, e.g. `(1+2j)` or `2j`
pub fn format_complex(
    re: f64,
    im: f64,
) -> String {
    if re == 0.0 && re.is_sign_positive() {
        format!("{}j", format_complex_part(im))
    } else {
        let sign = if im < 0.0 || (im == 0.0 && im.is_sign_negative()) {
            "-"
        } else {
            "+"
        };
        format!(
            "({}{}{}j)",
            format_complex_part(re),
            sign,
            format_complex_part(im.abs())
        )
    }
}

fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn quote_bytes(b: &[u8]) -> String {
    let mut out = String::from("b'");
    for &byte in b {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    out.push('\'');
    out
}

impl Obj {
    /// `repr()` form
    pub fn repr(&self) -> String {
        self.repr_guarded(&mut Vec::new())
    }

    fn repr_guarded(
        &self,
        seen: &mut Vec<*const ObjKind>,
    ) -> String {
        let ptr = Rc::as_ptr(&self.0);
        let is_container = matches!(self.kind(), ObjKind::List(_) | ObjKind::Dict(_));
        if is_container && seen.contains(&ptr) {
            return match self.kind() {
                ObjKind::Dict(_) => "{...}".into(),
                _ => "[...]".into(),
            };
        }
        if is_container {
            seen.push(ptr);
        }
        let out = match self.kind() {
            ObjKind::None => "None".into(),
            ObjKind::Bool(b) => if *b { "True" } else { "False" }.into(),
            ObjKind::Int(i) => i.to_string(),
            ObjKind::Float(f) => format_float(*f),
            ObjKind::Complex(re, im) => format_complex(*re, *im),
            ObjKind::Bytes(b) => quote_bytes(b),
            ObjKind::Str(s) => quote_str(s),
            ObjKind::List(items) => {
                let items = items.borrow();
                let parts: Vec<String> = items.iter().map(|o| o.repr_guarded(seen)).collect();
                format!("[{}]", parts.join(", "))
            }
            ObjKind::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|o| o.repr_guarded(seen)).collect();
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            ObjKind::Dict(map) => {
                let map = map.borrow();
                let parts: Vec<String> = map
                    .values()
                    .map(|(k, v)| format!("{}: {}", k.repr_guarded(seen), v.repr_guarded(seen)))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            ObjKind::Module(m) => format!("<module '{}'>", m.name),
            ObjKind::Function(f) => match f.body {
                FunctionBody::Native(_) => format!("<built-in function {}>", f.name),
                FunctionBody::Script { .. } => format!("<function {}>", f.name),
            },
            ObjKind::Class(c) => format!("<class '{}'>", c.name),
            ObjKind::Exception(e) => {
                let parts: Vec<String> = e.args.iter().map(|o| o.repr_guarded(seen)).collect();
                format!("{}({})", e.class, parts.join(", "))
            }
            ObjKind::Traceback(_) => "<traceback object>".into(),
            ObjKind::Capsule(c) => format!("<capsule object \"{}\">", c.name),
            ObjKind::Instance(i) => format!("<{} object>", i.class),
        };
        if is_container {
            seen.pop();
        }
        out
    }

    /// `str()` form for values whose conversion cannot fail
    pub fn plain_str(&self) -> Option<String> {
        match self.kind() {
            ObjKind::Str(s) => Some(s.clone()),
            ObjKind::Exception(e) => Some(match e.args.as_slice() {
                [] => String::new(),
                [single] => single.plain_str().unwrap_or_else(|| single.repr()),
                many => Obj::tuple(many.to_vec()).repr(),
            }),
            ObjKind::Instance(i) => match &i.text {
                Some(Ok(text)) => Some(text.clone()),
                Some(Err(_)) => None,
                None => Some(self.repr()),
            },
            _ => Some(self.repr()),
        }
    }
}

impl fmt::Debug for Obj {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Obj({})", self.repr())
    }
}
