//! Membership filters understood by every query source.
//!
//! A filter is either one clause set (`{field: {within: [..]}, ..}`, fields
//! AND-ed) or an OR of clause sets (`{anyOf: [..]}`). Nothing else is
//! expressible: the engine only ever asks for equality/membership.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use docbatch_types::{codec, get_nested_value, Document, MatchKey, Value};

/// Accepted values for one field.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FieldClause {
    pub within: Vec<Value>,
}

impl FieldClause {
    pub fn new(within: Vec<Value>) -> Self {
        Self { within }
    }

    /// See [`value_matches`].
    pub fn matches(&self, field_value: Option<&Value>) -> bool {
        value_matches(&self.within, field_value)
    }
}

/// Returns `true` if any accepted value equals any value held at a field.
///
/// Arrays held at the field are matched element-wise and scalars as
/// single-element sets. An absent field never matches, nor does an empty
/// accepted list.
pub fn value_matches(accepted: &[Value], field_value: Option<&Value>) -> bool {
    let Some(field_value) = field_value else {
        return false;
    };
    let held: HashSet<MatchKey> = field_value.candidates().iter().map(MatchKey::of).collect();
    accepted.iter().any(|value| held.contains(&MatchKey::of(value)))
}

/// A conjunction of field clauses, keyed by field path.
pub type ClauseSet = BTreeMap<String, FieldClause>;

/// Combined query handed to a [`QuerySource`](crate::QuerySource).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Filter {
    Clauses(ClauseSet),
    AnyOf {
        #[serde(rename = "anyOf")]
        any_of: Vec<ClauseSet>,
    },
}

impl Filter {
    /// A filter matching every document.
    pub fn all() -> Self {
        Self::Clauses(ClauseSet::new())
    }

    /// Build from clause sets: one set stays as is, several become `anyOf`.
    pub fn from_groups(mut groups: Vec<ClauseSet>) -> Self {
        if groups.len() == 1 {
            Self::Clauses(groups.remove(0))
        } else {
            Self::AnyOf { any_of: groups }
        }
    }

    /// The clause sets this filter ORs together.
    pub fn groups(&self) -> &[ClauseSet] {
        match self {
            Self::Clauses(clauses) => std::slice::from_ref(clauses),
            Self::AnyOf { any_of } => any_of,
        }
    }

    /// Evaluate against a document. An empty clause set matches everything;
    /// an empty `anyOf` matches nothing.
    pub fn matches(&self, doc: &Document) -> bool {
        self.groups().iter().any(|clauses| clauses_match(clauses, doc))
    }
}

fn clauses_match(clauses: &ClauseSet, doc: &Document) -> bool {
    clauses
        .iter()
        .all(|(path, clause)| clause.matches(get_nested_value(doc, path)))
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match codec::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbatch_types::ObjectId;

    fn clause(values: Vec<Value>) -> FieldClause {
        FieldClause::new(values)
    }

    fn set(entries: Vec<(&str, Vec<Value>)>) -> ClauseSet {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), clause(v)))
            .collect()
    }

    #[test]
    fn scalar_membership() {
        let c = clause(vec![Value::from("bar"), Value::from("baz")]);
        assert!(c.matches(Some(&Value::from("bar"))));
        assert!(!c.matches(Some(&Value::from("qux"))));
        assert!(!c.matches(None));
    }

    #[test]
    fn array_fields_match_element_wise() {
        let c = clause(vec![Value::from("foo")]);
        assert!(c.matches(Some(&Value::from(vec!["foo", "bar"]))));
        assert!(!c.matches(Some(&Value::Array(vec![]))));
    }

    #[test]
    fn ids_match_their_hex_strings() {
        let id = ObjectId::new();
        let c = clause(vec![Value::ObjectId(id)]);
        assert!(c.matches(Some(&Value::from(id.to_hex()))));
    }

    #[test]
    fn empty_within_matches_nothing() {
        assert!(!clause(vec![]).matches(Some(&Value::from("x"))));
    }

    #[test]
    fn clauses_are_anded_groups_are_ored() {
        let doc = Document::new().with("foo", "bar").with("tags", vec!["a"]);
        let both = Filter::Clauses(set(vec![
            ("foo", vec![Value::from("bar")]),
            ("tags", vec![Value::from("b")]),
        ]));
        assert!(!both.matches(&doc));

        let either = Filter::from_groups(vec![
            set(vec![("foo", vec![Value::from("nope")])]),
            set(vec![("tags", vec![Value::from("a")])]),
        ]);
        assert!(either.matches(&doc));
    }

    #[test]
    fn nested_paths_resolve() {
        let doc = Document::new().with("nested", Document::new().with("field1", "value1"));
        let f = Filter::Clauses(set(vec![("nested.field1", vec![Value::from("value1")])]));
        assert!(f.matches(&doc));
    }

    #[test]
    fn empty_filter_matches_all() {
        assert!(Filter::all().matches(&Document::new()));
        assert!(!Filter::AnyOf { any_of: vec![] }.matches(&Document::new()));
    }

    #[test]
    fn serializes_in_wire_shape() {
        let single = Filter::Clauses(set(vec![("tags", vec![Value::from("foo")])]));
        assert_eq!(single.to_string(), r#"{"tags":{"within":["foo"]}}"#);

        let multi = Filter::from_groups(vec![
            set(vec![("foo", vec![Value::from("bar")])]),
            set(vec![("tags", vec![Value::from("baz")])]),
        ]);
        assert_eq!(
            multi.to_string(),
            r#"{"anyOf":[{"foo":{"within":["bar"]}},{"tags":{"within":["baz"]}}]}"#
        );
    }
}
