//! Store collaborator for docbatch.
//!
//! The loader never talks to a database directly. It hands a combined
//! [`Filter`] to a [`QuerySource`] and gets back every matching document.
//!
//! # Filters
//!
//! Filters only express membership: `{field: {within: [..]}}` clause sets,
//! AND-ed per field, optionally OR-ed together with `{anyOf: [..]}`.
//!
//! # Sources
//!
//! A [`QuerySource`] wraps one of two handle kinds, chosen once at
//! construction:
//!
//! - [`RawCollection`] -- a plain collection handle
//! - [`ModelHandle`] -- a model/schema layer returning lean documents
//!
//! [`InMemoryCollection`] implements [`RawCollection`] for tests and
//! embedding.

pub mod error;
pub mod filter;
pub mod memory;
pub mod source;

pub use error::{StoreError, StoreResult};
pub use filter::{value_matches, ClauseSet, FieldClause, Filter};
pub use memory::InMemoryCollection;
pub use source::{ModelHandle, QuerySource, RawCollection, SourceKind};
