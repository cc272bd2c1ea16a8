//! Combine a window of requests into one store filter.
//!
//! Requests are grouped by the set of fields they constrain. Within a group
//! each field becomes one membership clause holding the union of the
//! group's accepted values; groups are OR-ed together. The result matches
//! a superset of what every request needs, and [`demux`](crate::demux)
//! narrows it back down per request.

use std::collections::{HashMap, HashSet};

use docbatch_store::{ClauseSet, FieldClause, Filter};
use docbatch_types::{denormalize, MatchKey};

use crate::request::ResolvedLookup;

struct Group {
    shape: String,
    clauses: ClauseSet,
    seen: HashMap<String, HashSet<MatchKey>>,
}

impl Group {
    fn new(shape: String) -> Self {
        Self {
            shape,
            clauses: ClauseSet::new(),
            seen: HashMap::new(),
        }
    }

    fn absorb(&mut self, lookup: &ResolvedLookup) {
        for (path, values) in lookup.clauses() {
            let clause = self.clauses.entry(path.clone()).or_insert_with(FieldClause::default);
            let seen = self.seen.entry(path.clone()).or_default();
            for value in values {
                if seen.insert(MatchKey::of(value)) {
                    clause.within.push(denormalize(value.clone()));
                }
            }
        }
    }
}

/// Build the combined filter for `lookups`.
///
/// Values keep their first-appearance order within a clause and groups
/// keep the order their shape first appeared in. A single group is emitted
/// as a plain clause set.
pub fn merge_filters(lookups: &[ResolvedLookup]) -> Filter {
    let mut groups: Vec<Group> = Vec::new();
    for lookup in lookups {
        let shape = lookup.shape();
        let i = match groups.iter().position(|g| g.shape == shape) {
            Some(i) => i,
            None => {
                groups.push(Group::new(shape));
                groups.len() - 1
            }
        };
        groups[i].absorb(lookup);
    }
    Filter::from_groups(groups.into_iter().map(|g| g.clauses).collect())
}
