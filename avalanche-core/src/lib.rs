//! Core library for the `avalanche` CLI.
//!
//! This crate defines:
//! - Cache keys, the in-memory cache store and per-key query orchestration
//! - Payload validation and the typed domain schemas it produces
//! - Aggregation of several query results into one display state
//! - Configuration handling
//!
//! It is used by `avalanche-cli`, but can also be reused by other binaries or services.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod fetch;
pub mod key;
pub mod model;
pub mod query;
pub mod validate;

pub use aggregate::{AggregateState, Aggregator, Outcome, QueryState, incomplete};
pub use cache::{CacheEntry, CacheStore, EntryStatus, Ttl};
pub use config::Config;
pub use endpoint::Endpoint;
pub use error::{AggregateError, QueryError, TransportError, ValidationError};
pub use fetch::{FetchRequest, Fetcher, HttpFetcher};
pub use key::{CacheKey, KeyPart};
pub use model::{AvalancheCenterId, NotFound, RequestedTime};
pub use query::{ErrorReporter, Query, QueryClient, QueryOptions, QueryResult, QueryStatus, TracingReporter};
pub use validate::Validated;
