//! Split one store result back into per-request answers.

use docbatch_store::value_matches;
use docbatch_types::{get_nested_value, Document};

use crate::request::ResolvedLookup;

/// Returns `true` if `doc` satisfies every clause of `lookup`.
pub fn matches(lookup: &ResolvedLookup, doc: &Document) -> bool {
    lookup
        .clauses()
        .iter()
        .all(|(path, accepted)| value_matches(accepted, get_nested_value(doc, path)))
}

/// For each lookup, in order, the documents it matches in store order.
///
/// Documents may land in several lists and duplicates returned by the store
/// are kept.
pub fn demux(lookups: &[ResolvedLookup], documents: &[Document]) -> Vec<Vec<Document>> {
    lookups
        .iter()
        .map(|lookup| {
            documents
                .iter()
                .filter(|doc| matches(lookup, doc))
                .cloned()
                .collect()
        })
        .collect()
}
