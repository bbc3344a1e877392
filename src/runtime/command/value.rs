//! Command runtime values
//!
//! Every value has a string form. The variants only record an internal
//! representation that is cheaper to work with, so two values are the same
//! to a script whenever their strings are equal.

use std::fmt;

use indexmap::IndexMap;

use super::CmdError;

/// A command runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum CmdValue {
    /// The empty string
    Empty,
    /// Boolean, rendered as `1` / `0`
    Boolean(bool),
    /// Raw bytes, each byte rendered as the code point of the same value
    ByteArray(Vec<u8>),
    /// Plain text
    Text(String),
    /// Numeric value kept in its exact decimal text
    Number(String),
    /// Ordered key/value dictionary
    Dict(IndexMap<String, CmdValue>),
    /// Ordered list
    List(Vec<CmdValue>),
}

impl CmdValue {
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            CmdValue::Empty
        } else {
            CmdValue::Text(s)
        }
    }

    pub fn int(n: i64) -> Self {
        CmdValue::Number(n.to_string())
    }

    /// Short name of the internal representation
    pub fn rep_name(&self) -> &'static str {
        match self {
            CmdValue::Empty => "empty",
            CmdValue::Boolean(_) => "boolean",
            CmdValue::ByteArray(_) => "bytearray",
            CmdValue::Text(_) => "text",
            CmdValue::Number(_) => "number",
            CmdValue::Dict(_) => "dict",
            CmdValue::List(_) => "list",
        }
    }

    /// The string form of the value
    pub fn as_string(&self) -> String {
        match self {
            CmdValue::Empty => String::new(),
            CmdValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            CmdValue::ByteArray(bytes) => bytes.iter().map(|&b| char::from(b)).collect(),
            CmdValue::Text(s) | CmdValue::Number(s) => s.clone(),
            CmdValue::Dict(map) => {
                let mut out = Vec::with_capacity(map.len() * 2);
                for (k, v) in map {
                    out.push(quote_element(k));
                    out.push(quote_element(&v.as_string()));
                }
                out.join(" ")
            }
            CmdValue::List(items) => items
                .iter()
                .map(|v| quote_element(&v.as_string()))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub fn is_empty_string(&self) -> bool {
        match self {
            CmdValue::Empty => true,
            CmdValue::Text(s) | CmdValue::Number(s) => s.is_empty(),
            CmdValue::ByteArray(b) => b.is_empty(),
            CmdValue::List(items) => items.is_empty(),
            CmdValue::Dict(map) => map.is_empty(),
            CmdValue::Boolean(_) => false,
        }
    }

    /// Elements of the value read as a list
    pub fn as_list(&self) -> Result<Vec<CmdValue>, CmdError> {
        match self {
            CmdValue::List(items) => Ok(items.clone()),
            CmdValue::Dict(map) => Ok(map
                .iter()
                .flat_map(|(k, v)| [CmdValue::text(k.clone()), v.clone()])
                .collect()),
            CmdValue::Empty => Ok(Vec::new()),
            other => Ok(parse_list(&other.as_string())?
                .into_iter()
                .map(CmdValue::text)
                .collect()),
        }
    }

    /// The value read as a dictionary
    pub fn as_dict(&self) -> Result<IndexMap<String, CmdValue>, CmdError> {
        if let CmdValue::Dict(map) = self {
            return Ok(map.clone());
        }
        let items = self.as_list()?;
        if items.len() % 2 != 0 {
            return Err(CmdError::failed("missing value to go with key"));
        }
        let mut map = IndexMap::new();
        for pair in items.chunks(2) {
            map.insert(pair[0].as_string(), pair[1].clone());
        }
        Ok(map)
    }

    pub fn as_bool(&self) -> Result<bool, CmdError> {
        if let CmdValue::Boolean(b) = self {
            return Ok(*b);
        }
        let s = self.as_string();
        match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => match other.parse::<i64>() {
                Ok(n) => Ok(n != 0),
                Err(_) => Err(CmdError::failed(format!(
                    "expected boolean value but got \"{}\"",
                    s
                ))),
            },
        }
    }

    pub fn as_int(&self) -> Result<i64, CmdError> {
        if let CmdValue::Boolean(b) = self {
            return Ok(i64::from(*b));
        }
        let s = self.as_string();
        s.trim()
            .parse::<i64>()
            .map_err(|_| CmdError::failed(format!("expected integer but got \"{}\"", s)))
    }
}

impl fmt::Display for CmdValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<&str> for CmdValue {
    fn from(s: &str) -> Self {
        CmdValue::text(s)
    }
}

impl From<String> for CmdValue {
    fn from(s: String) -> Self {
        CmdValue::text(s)
    }
}

// ============================================================================
// List syntax
// ============================================================================

fn is_special(c: char) -> bool {
    c.is_whitespace() || matches!(c, '{' | '}' | '[' | ']' | '$' | '"' | '\\' | ';')
}

/// Quote one list element so that `parse_list` reads it back unchanged
pub fn quote_element(s: &str) -> String {
    if s.is_empty() {
        return "{}".to_string();
    }
    if !s.chars().any(is_special) && !s.starts_with('#') {
        return s.to_string();
    }
    let mut depth = 0i32;
    let mut balanced = true;
    for c in s.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    balanced = false;
                    break;
                }
            }
            _ => {}
        }
    }
    if balanced && depth == 0 && !s.ends_with('\\') && !s.contains('\\') {
        return format!("{{{}}}", s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for (i, c) in s.chars().enumerate() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '#' if i == 0 => out.push_str("\\#"),
            c if is_special(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Join elements into a well-formed list string
pub fn format_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|s| quote_element(s.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        other => other,
    }
}

/// Split a list string into its elements
pub fn parse_list(s: &str) -> Result<Vec<String>, CmdError> {
    let chars: Vec<char> = s.chars().collect();
    let mut items = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }
        let mut item = String::new();
        match chars[i] {
            '{' => {
                let mut depth = 1;
                i += 1;
                while i < chars.len() {
                    match chars[i] {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    item.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(CmdError::failed("unmatched open brace in list"));
                }
                i += 1;
                if let Some(&next) = chars.get(i) {
                    if !next.is_whitespace() {
                        return Err(CmdError::failed(format!(
                            "list element in braces followed by \"{}\" instead of space",
                            next
                        )));
                    }
                }
            }
            '"' => {
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(CmdError::failed("unmatched open quote in list")),
                        Some('"') => break,
                        Some('\\') if i + 1 < chars.len() => {
                            item.push(unescape(chars[i + 1]));
                            i += 2;
                        }
                        Some(&c) => {
                            item.push(c);
                            i += 1;
                        }
                    }
                }
                i += 1;
                if let Some(&next) = chars.get(i) {
                    if !next.is_whitespace() {
                        return Err(CmdError::failed(format!(
                            "list element in quotes followed by \"{}\" instead of space",
                            next
                        )));
                    }
                }
            }
            _ => {
                while i < chars.len() && !chars[i].is_whitespace() {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        item.push(unescape(chars[i + 1]));
                        i += 2;
                    } else {
                        item.push(chars[i]);
                        i += 1;
                    }
                }
            }
        }
        items.push(item);
    }
    Ok(items)
}
