//! Value marshaller
//!
//! Classifies a guest value by capability, in a fixed order, and converts it
//! recursively into a [`CrossValue`] that owns all of its data. The guest
//! handles obtained during traversal are dropped as soon as each element is
//! converted, on success and error paths alike.
//!
//! ```text
//! Null → Bool → ByteString → TextString → Number → Mapping → Sequence → Fallback
//! ```
//!
//! Order matters: a boolean also passes the number probe, a text string also
//! passes the sequence probe, and a row-like object passes both the mapping
//! and sequence probes.

use indexmap::IndexMap;
use tracing::trace;

use super::error::MarshalError;
use crate::runtime::command::CmdValue;
use crate::runtime::GuestRuntime;

/// Default bound on container nesting
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Neutral value representation produced by the marshaller
#[derive(Debug, Clone, PartialEq)]
pub enum CrossValue {
    /// The guest's "no value"
    Null,
    Bool(bool),
    /// Raw bytes, never decoded
    ByteString(Vec<u8>),
    /// Decoded text
    TextString(String),
    /// Exact base-10 text of any guest number
    Number(String),
    /// Key/value pairs in guest iteration order
    Mapping(Vec<(CrossValue, CrossValue)>),
    Sequence(Vec<CrossValue>),
    /// The guest's generic string conversion
    Fallback(String),
}

/// Capability classes, one per [`CrossValue`] case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Null,
    Bool,
    ByteString,
    TextString,
    Number,
    Mapping,
    Sequence,
    Fallback,
}

/// The order capability probes are tried in
pub const SHAPE_PRECEDENCE: [Shape; 8] = [
    Shape::Null,
    Shape::Bool,
    Shape::ByteString,
    Shape::TextString,
    Shape::Number,
    Shape::Mapping,
    Shape::Sequence,
    Shape::Fallback,
];

impl CrossValue {
    pub fn shape(&self) -> Shape {
        match self {
            CrossValue::Null => Shape::Null,
            CrossValue::Bool(_) => Shape::Bool,
            CrossValue::ByteString(_) => Shape::ByteString,
            CrossValue::TextString(_) => Shape::TextString,
            CrossValue::Number(_) => Shape::Number,
            CrossValue::Mapping(_) => Shape::Mapping,
            CrossValue::Sequence(_) => Shape::Sequence,
            CrossValue::Fallback(_) => Shape::Fallback,
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            Shape::Null => "null",
            Shape::Bool => "bool",
            Shape::ByteString => "byte string",
            Shape::TextString => "text string",
            Shape::Number => "number",
            Shape::Mapping => "mapping",
            Shape::Sequence => "sequence",
            Shape::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Recursive converter bound to one guest runtime
pub struct Marshaller<'g, G: GuestRuntime> {
    guest: &'g G,
    max_depth: usize,
}

impl<'g, G: GuestRuntime> Marshaller<'g, G> {
    pub fn new(
        guest: &'g G,
        max_depth: usize,
    ) -> Self {
        Self { guest, max_depth }
    }

    /// Convert `value` and everything reachable from it.
    ///
    /// Fails as a whole if any element fails; a guest exception raised by a
    /// probe is left pending for the exception translator.
    pub fn marshal(
        &self,
        value: &G::Value,
    ) -> Result<CrossValue, MarshalError> {
        self.convert(value, 0)
    }

    fn convert(
        &self,
        value: &G::Value,
        depth: usize,
    ) -> Result<CrossValue, MarshalError> {
        if depth > self.max_depth {
            return Err(MarshalError::DepthExceeded {
                limit: self.max_depth,
            });
        }
        for shape in SHAPE_PRECEDENCE {
            if let Some(converted) = self.probe(shape, value, depth)? {
                trace!(%shape, depth, "classified");
                return Ok(converted);
            }
        }
        // Fallback always matches
        Err(MarshalError::Guest)
    }

    fn probe(
        &self,
        shape: Shape,
        value: &G::Value,
        depth: usize,
    ) -> Result<Option<CrossValue>, MarshalError> {
        let guest = self.guest;
        Ok(match shape {
            Shape::Null => guest.is_null(value).then_some(CrossValue::Null),
            Shape::Bool => guest.as_bool(value).map(CrossValue::Bool),
            Shape::ByteString => guest.as_bytes(value).map(CrossValue::ByteString),
            Shape::TextString => guest.as_text(value).map(CrossValue::TextString),
            Shape::Number => guest
                .number_text(value)
                .map_err(|_| MarshalError::Guest)?
                .map(CrossValue::Number),
            Shape::Mapping => match guest.mapping_items(value).map_err(|_| MarshalError::Guest)? {
                Some(items) => {
                    let mut pairs = Vec::with_capacity(items.len());
                    for (k, v) in items {
                        pairs.push((self.convert(&k, depth + 1)?, self.convert(&v, depth + 1)?));
                    }
                    Some(CrossValue::Mapping(pairs))
                }
                None => None,
            },
            Shape::Sequence => match guest.sequence_items(value).map_err(|_| MarshalError::Guest)? {
                Some(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.convert(&item, depth + 1)?);
                    }
                    Some(CrossValue::Sequence(out))
                }
                None => None,
            },
            Shape::Fallback => Some(CrossValue::Fallback(
                guest.display(value).map_err(|_| MarshalError::Guest)?,
            )),
        })
    }
}

// ============================================================================
// Lowering into the command runtime
// ============================================================================

impl From<CrossValue> for CmdValue {
    fn from(value: CrossValue) -> Self {
        match value {
            CrossValue::Null => CmdValue::Empty,
            CrossValue::Bool(b) => CmdValue::Boolean(b),
            CrossValue::ByteString(bytes) => CmdValue::ByteArray(bytes),
            CrossValue::TextString(text) | CrossValue::Fallback(text) => CmdValue::text(text),
            CrossValue::Number(digits) => CmdValue::Number(digits),
            CrossValue::Mapping(pairs) => {
                let mut map = IndexMap::with_capacity(pairs.len());
                for (k, v) in pairs {
                    map.insert(CmdValue::from(k).as_string(), CmdValue::from(v));
                }
                CmdValue::Dict(map)
            }
            CrossValue::Sequence(items) => {
                CmdValue::List(items.into_iter().map(CmdValue::from).collect())
            }
        }
    }
}
