//! Request-coalescing, cache-fronted document loader.
//!
//! [`DocumentLoader`] answers point lookups by identifier and field lookups
//! by accepted values. Lookups issued in the same scheduling tick are merged
//! into one store query and the result is split back per lookup. Results
//! can be written through to an external [`KeyValueCache`] with a TTL.
//!
//! # Pipeline
//!
//! 1. [`Signature`] -- deterministic key for a request's logical content
//! 2. [`BatchCoordinator`] -- collects requests per window, de-duplicating
//!    identical ones
//! 3. [`merge_filters`] -- groups requests by field set into one [`Filter`]
//! 4. [`demux`](demux::demux) -- hands each request the documents it matches
//! 5. [`CacheLayer`] -- reads and writes extended-JSON cache entries
//!
//! [`KeyValueCache`]: docbatch_cache::KeyValueCache
//! [`Filter`]: docbatch_store::Filter

pub mod cache_layer;
pub mod config;
pub mod coordinator;
pub mod demux;
pub mod error;
pub mod loader;
pub mod merge;
pub mod request;
pub mod signature;

pub use cache_layer::CacheLayer;
pub use config::LoaderConfig;
pub use coordinator::{BatchCoordinator, Documents, PendingLoad};
pub use error::{LoaderError, LoaderResult};
pub use loader::DocumentLoader;
pub use merge::merge_filters;
pub use request::{Fields, FindOptions, LookupRequest, ResolvedLookup};
pub use signature::Signature;
