//! Request signatures.
//!
//! Two requests with the same logical content get the same signature,
//! whatever the order of their fields or values and whether ids were given
//! as ids or hex strings. Signatures key in-window de-duplication, the
//! memo and cache entries.

use std::collections::BTreeSet;
use std::fmt;

use docbatch_types::identifier::push_quoted;
use docbatch_types::{Identifier, MatchKey};

use crate::request::Fields;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Kind {
    Point,
    Fields,
}

/// Opaque, deterministic key for a lookup request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    kind: Kind,
    key: String,
}

impl Signature {
    /// Point lookups are keyed by the normalized identifier alone.
    pub fn point(id: &Identifier) -> Self {
        Self {
            kind: Kind::Point,
            key: id.normalized(),
        }
    }

    /// Field lookups render as `{"field":[v,..],..}` with fields in name
    /// order and values de-duplicated and sorted.
    pub fn fields(fields: &Fields) -> Self {
        let mut key = String::from("{");
        for (i, (name, values)) in fields.iter().enumerate() {
            if i > 0 {
                key.push(',');
            }
            push_quoted(&mut key, name);
            key.push_str(":[");
            let distinct: BTreeSet<MatchKey> = values.iter().map(MatchKey::of).collect();
            for (j, value) in distinct.iter().enumerate() {
                if j > 0 {
                    key.push(',');
                }
                value.render_into(&mut key);
            }
            key.push(']');
        }
        key.push('}');
        Self {
            kind: Kind::Fields,
            key,
        }
    }

    pub fn is_point(&self) -> bool {
        self.kind == Kind::Point
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
