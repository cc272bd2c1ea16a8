//! Foundation types for docbatch.
//!
//! This crate provides the document model shared by every other docbatch
//! crate: identifiers, values, nested field access and the extended-JSON
//! codec used when documents leave the process (for example into a cache).
//!
//! # Key Types
//!
//! - [`ObjectId`] -- canonical 12-byte identifier with a 24-char hex form
//! - [`Identifier`] -- an `ObjectId` or an arbitrary string id
//! - [`Value`] / [`Document`] -- document field values and records
//! - [`MatchKey`] -- the equality key used for matching and de-duplication

pub mod codec;
pub mod error;
pub mod identifier;
pub mod object_id;
pub mod path;
pub mod value;

pub use error::{TypeError, TypeResult};
pub use identifier::{denormalize, is_canonical_id_string, normalize, Identifier, MatchKey};
pub use object_id::ObjectId;
pub use path::get_nested_value;
pub use value::{Document, Value};
