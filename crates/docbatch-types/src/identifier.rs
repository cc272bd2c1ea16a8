//! Identifier normalization.
//!
//! Identifiers are either canonical [`ObjectId`]s or arbitrary strings. They
//! compare by their normalized string form, so an id and its hex string are
//! the same identifier. [`MatchKey`] extends the same rule to every value so
//! matching and de-duplication agree on what "equal" means.

use std::fmt;
use std::fmt::Write as _;

use crate::codec;
use crate::object_id::{ObjectId, OBJECT_ID_HEX_LEN};
use crate::value::Value;

/// A document identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Identifier {
    ObjectId(ObjectId),
    String(String),
}

impl Identifier {
    /// Normalized string form: hex for ids, the string itself otherwise.
    pub fn normalized(&self) -> String {
        match self {
            Self::ObjectId(id) => id.to_hex(),
            Self::String(s) => s.clone(),
        }
    }

    /// Convert to a document value without reinterpreting strings.
    pub fn to_value(&self) -> Value {
        match self {
            Self::ObjectId(id) => Value::ObjectId(*id),
            Self::String(s) => Value::String(s.clone()),
        }
    }

    /// Convert to the value used in store queries; see [`denormalize`].
    pub fn to_query_value(&self) -> Value {
        denormalize(self.to_value())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

impl From<ObjectId> for Identifier {
    fn from(id: ObjectId) -> Self {
        Self::ObjectId(id)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&Identifier> for Identifier {
    fn from(id: &Identifier) -> Self {
        id.clone()
    }
}

/// Normalized string form of a value: ids become hex, strings stay as they
/// are, anything else uses its display form.
pub fn normalize(value: &Value) -> String {
    match value {
        Value::ObjectId(id) => id.to_hex(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Returns `true` if `s` is a canonical id string: it passes the loose id
/// check and reconstructing an id from it prints back exactly `s`.
pub fn is_canonical_id_string(s: &str) -> bool {
    s.len() == OBJECT_ID_HEX_LEN
        && ObjectId::parse_loose(s).is_some_and(|id| id.to_hex() == s)
}

/// Best-effort reconstruction of a canonical id from a string.
///
/// Ids pass through unchanged. Strings become ids only when they
/// round-trip (see [`is_canonical_id_string`]); everything else is returned
/// as given. Total: never fails.
pub fn denormalize(value: Value) -> Value {
    match value {
        Value::String(s) if is_canonical_id_string(&s) => match ObjectId::from_hex(&s) {
            Ok(id) => Value::ObjectId(id),
            Err(_) => Value::String(s),
        },
        other => other,
    }
}

/// Equality key for matching and de-duplication.
///
/// Ids and strings share the `Text` variant, so an id matches its own hex
/// string. Integral floats collapse onto `Int` so `1` and `1.0` agree.
/// Composite values compare by their canonical encoding.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
    Composite(String),
}

impl MatchKey {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::Int(*i),
            Value::Float(x) => {
                if x.fract() == 0.0 && *x >= i64::MIN as f64 && *x <= i64::MAX as f64 {
                    Self::Int(*x as i64)
                } else {
                    Self::Float(x.to_bits())
                }
            }
            Value::String(s) => Self::Text(s.clone()),
            Value::ObjectId(id) => Self::Text(id.to_hex()),
            Value::Array(_) | Value::Object(_) => {
                Self::Composite(codec::to_canonical_string(value))
            }
        }
    }

    /// Append a deterministic, type-preserving rendering of this key.
    ///
    /// Text is quoted and escaped so that `"1"` and `1` never collide.
    pub fn render_into(&self, out: &mut String) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Self::Float(bits) => {
                let _ = write!(out, "{:?}", f64::from_bits(*bits));
            }
            Self::Text(s) => push_quoted(out, s),
            Self::Composite(encoded) => {
                out.push('#');
                push_quoted(out, encoded);
            }
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }
}

/// Append `s` wrapped in double quotes with `"` and `\` escaped.
pub fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}
