//! Failure taxonomy shared by the fetch, validation and aggregation layers.

use thiserror::Error;

/// Network or HTTP failure, as classified by a [`Fetcher`](crate::Fetcher).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("could not reach {url}: {message}")]
    Offline { url: String, message: String },

    #[error("request to {url} failed with status {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// The service answered 404. Queries turn this into a not-found result.
    #[error("{url} returned 404 Not Found")]
    NotFound { url: String },

    #[error("failed to read response body from {url}: {message}")]
    Body { url: String, message: String },
}

/// A payload that does not match its schema.
///
/// `path` names the first offending field, e.g. `$.objects.periods[2]`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid payload at `{path}`: expected {expected}, found {actual}")]
pub struct ValidationError {
    pub path: String,
    pub expected: String,
    pub actual: String,
}

/// Terminal failure of a single query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl QueryError {
    pub fn is_transport(&self) -> bool {
        matches!(self, QueryError::Transport(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, QueryError::Validation(_))
    }
}

/// Every error collected from a set of aggregated queries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{} of the aggregated queries failed", .errors.len())]
pub struct AggregateError {
    errors: Vec<QueryError>,
}

impl AggregateError {
    pub fn new(errors: Vec<QueryError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[QueryError] {
        &self.errors
    }
}
