//! Runtimes joined by the bridge
//!
//! The bridge core never talks to a concrete interpreter. It sees the guest
//! through [`GuestRuntime`], a small set of opaque services modelled on what
//! an embeddable object runtime exposes to native code:
//!
//! ```text
//! ┌──────────────────────┐    GuestRuntime     ┌──────────────────────┐
//! │  bridge::dispatch    │ ──────────────────▶ │  object::ObjectVm    │
//! │  bridge::marshal     │  run_script         │  (Host-B reference)  │
//! │  bridge::exception   │  get_attr / call    │                      │
//! │  bridge::resolver    │  take_exception     │                      │
//! └──────────────────────┘  capability probes  └──────────────────────┘
//! ```
//!
//! Errors follow the embedding convention of the guest: a failing service
//! returns [`Raised`] and leaves the exception pending inside the guest, where
//! [`GuestRuntime::take_exception`] picks it up.

pub mod command;
pub mod object;

/// Marker returned by a guest service that left an exception pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Raised;

/// Result of a guest service call.
pub type GuestResult<T> = Result<T, Raised>;

/// Which runtime a piece of code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The command-oriented runtime (Host-A).
    Command,
    /// The object-oriented runtime (Host-B).
    Object,
}

impl Side {
    /// The opposite runtime.
    pub fn other(self) -> Side {
        match self {
            Side::Command => Side::Object,
            Side::Object => Side::Command,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Side::Command => write!(f, "command runtime"),
            Side::Object => write!(f, "object runtime"),
        }
    }
}

/// A pending guest exception as fetched from the runtime.
///
/// `value` may be unnormalized (a bare message) until
/// [`GuestRuntime::normalize_exception`] turns it into an instance of `kind`.
#[derive(Debug, Clone)]
pub struct RawException<V> {
    /// Exception type
    pub kind: V,
    /// Exception payload
    pub value: V,
    /// Traceback object, absent when the error never unwound through a frame
    pub traceback: Option<V>,
}

/// Services the bridge needs from an embedded object runtime.
///
/// Every `Value` handed out is an owned handle; dropping it releases the guest
/// reference, so scoped release on early-return paths comes for free.
pub trait GuestRuntime {
    /// Owned handle to a guest value
    type Value: Clone;

    // ------------------------------------------------------------------
    // Namespace and invocation
    // ------------------------------------------------------------------

    /// The top-level namespace object scripts run in.
    fn main_namespace(&self) -> Self::Value;

    /// Look up `name` on `obj`.
    fn get_attr(
        &self,
        obj: &Self::Value,
        name: &str,
    ) -> GuestResult<Self::Value>;

    /// Bind `name` on `obj`.
    fn set_attr(
        &self,
        obj: &Self::Value,
        name: &str,
        value: Self::Value,
    ) -> GuestResult<()>;

    /// Whether `obj` can be invoked.
    fn is_callable(
        &self,
        obj: &Self::Value,
    ) -> bool;

    /// Invoke `callable` with positional arguments.
    fn call(
        &self,
        callable: &Self::Value,
        args: Vec<Self::Value>,
    ) -> GuestResult<Self::Value>;

    /// Allocate a text value.
    fn new_text(
        &self,
        text: &str,
    ) -> Self::Value;

    /// Guest-facing type name, used in diagnostics.
    fn type_name(
        &self,
        obj: &Self::Value,
    ) -> String;

    /// Run a script in the top-level namespace.
    fn run_script(
        &self,
        code: &str,
    ) -> GuestResult<()>;

    /// Import a possibly dotted module and return the top-level package.
    fn import_module(
        &self,
        name: &str,
    ) -> GuestResult<Self::Value>;

    /// The name a module object was registered under.
    fn module_name(
        &self,
        module: &Self::Value,
    ) -> GuestResult<String>;

    // ------------------------------------------------------------------
    // Capability probes, consulted in precedence order by the marshaller
    // ------------------------------------------------------------------

    /// The singleton "no value".
    fn is_null(
        &self,
        obj: &Self::Value,
    ) -> bool;

    /// Boolean payload, if `obj` is a boolean.
    fn as_bool(
        &self,
        obj: &Self::Value,
    ) -> Option<bool>;

    /// Raw bytes, if `obj` is an immutable byte string.
    fn as_bytes(
        &self,
        obj: &Self::Value,
    ) -> Option<Vec<u8>>;

    /// Decoded text, if `obj` is a text string.
    fn as_text(
        &self,
        obj: &Self::Value,
    ) -> Option<String>;

    /// Exact base-10 text, if `obj` supports the number protocol.
    fn number_text(
        &self,
        obj: &Self::Value,
    ) -> GuestResult<Option<String>>;

    /// Key/value pairs in iteration order, if `obj` supports the mapping protocol.
    fn mapping_items(
        &self,
        obj: &Self::Value,
    ) -> GuestResult<Option<Vec<(Self::Value, Self::Value)>>>;

    /// Elements in order, if `obj` supports the sequence protocol.
    fn sequence_items(
        &self,
        obj: &Self::Value,
    ) -> GuestResult<Option<Vec<Self::Value>>>;

    /// The guest's generic string conversion.
    fn display(
        &self,
        obj: &Self::Value,
    ) -> GuestResult<String>;

    // ------------------------------------------------------------------
    // Error state
    // ------------------------------------------------------------------

    /// Fetch and clear the pending exception.
    fn take_exception(&self) -> Option<RawException<Self::Value>>;

    /// Whether an exception is pending.
    fn has_exception(&self) -> bool;

    /// Drop any pending exception.
    fn clear_exception(&self);

    /// Make `exc.value` an instance of `exc.kind`.
    fn normalize_exception(
        &self,
        exc: &mut RawException<Self::Value>,
    ) -> GuestResult<()>;

    /// The guest's standard traceback formatting module.
    fn traceback_formatter(&self) -> GuestResult<Self::Value>;
}
