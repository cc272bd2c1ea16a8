//! Lookup requests.
//!
//! A request is either a point lookup by identifier or a field lookup
//! mapping field names to accepted values. Before reaching the store both
//! are resolved into the same shape: a list of `(path, accepted values)`
//! pairs that must all match.

use std::collections::BTreeMap;
use std::time::Duration;

use docbatch_types::{Identifier, Value};

use crate::config::LoaderConfig;
use crate::signature::Signature;

/// Field lookup: field name (or dotted path) to accepted values.
///
/// A document matches when every field holds at least one accepted value.
/// Array inputs are spread into their elements, so `tags: ["a", "b"]`
/// accepts either tag. A field given an empty list matches nothing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fields(BTreeMap<String, Vec<Value>>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Fields::insert`].
    pub fn field(mut self, name: impl Into<String>, values: impl Into<Value>) -> Self {
        self.insert(name, values);
        self
    }

    /// Set the accepted values for `name`, replacing earlier ones.
    pub fn insert(&mut self, name: impl Into<String>, values: impl Into<Value>) {
        self.0.insert(name.into(), values.into().into_candidates());
    }

    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// Fields in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (name, values) in iter {
            fields.insert(name, values);
        }
        fields
    }
}

/// One logical lookup issued by a caller.
#[derive(Clone, Debug, PartialEq)]
pub enum LookupRequest {
    Point(Identifier),
    Fields(Fields),
}

impl LookupRequest {
    pub fn point(id: impl Into<Identifier>) -> Self {
        Self::Point(id.into())
    }

    pub fn fields(fields: Fields) -> Self {
        Self::Fields(fields)
    }

    /// Deterministic key identifying the logical content of this request.
    pub fn signature(&self) -> Signature {
        match self {
            Self::Point(id) => Signature::point(id),
            Self::Fields(fields) => Signature::fields(fields),
        }
    }

    /// Resolve against the document layout in `config`.
    pub fn resolve(&self, config: &LoaderConfig) -> ResolvedLookup {
        let clauses = match self {
            Self::Point(id) => vec![(config.id_field.clone(), vec![id.to_value()])],
            Self::Fields(fields) => fields
                .iter()
                .map(|(name, values)| (config.resolve_field(name).to_string(), values.to_vec()))
                .collect(),
        };
        ResolvedLookup::new(clauses)
    }
}

impl From<Identifier> for LookupRequest {
    fn from(id: Identifier) -> Self {
        Self::Point(id)
    }
}

impl From<Fields> for LookupRequest {
    fn from(fields: Fields) -> Self {
        Self::Fields(fields)
    }
}

/// A request in store terms: document paths and their accepted values.
///
/// Pairs are sorted by path. A path may repeat when a lookup named both the
/// id field and its alias; each occurrence must match.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedLookup {
    clauses: Vec<(String, Vec<Value>)>,
}

impl ResolvedLookup {
    pub fn new(mut clauses: Vec<(String, Vec<Value>)>) -> Self {
        clauses.sort_by(|a, b| a.0.cmp(&b.0));
        Self { clauses }
    }

    pub fn clauses(&self) -> &[(String, Vec<Value>)] {
        &self.clauses
    }

    /// Sorted field paths joined with `,`; requests sharing this key are
    /// merged into one clause set.
    pub fn shape(&self) -> String {
        let paths: Vec<&str> = self.clauses.iter().map(|(path, _)| path.as_str()).collect();
        paths.join(",")
    }
}

/// Per-call options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Cache the result for this many seconds. Results are only cached when
    /// this is present and positive.
    pub ttl: Option<u64>,
}

impl FindOptions {
    pub fn ttl(secs: u64) -> Self {
        Self { ttl: Some(secs) }
    }

    pub(crate) fn cache_ttl(&self) -> Option<Duration> {
        self.ttl.filter(|secs| *secs > 0).map(Duration::from_secs)
    }
}
