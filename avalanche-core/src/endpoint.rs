use serde_json::Value;

use crate::{fetch::FetchRequest, key::CacheKey, validate::Validated};

pub mod nac;
pub mod nwac;
pub mod observations;
pub mod snowbound;

/// One kind of remote record: how it is keyed, requested and validated.
pub trait Endpoint: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    /// Human-readable subject, e.g. "NWAC weather forecast".
    fn what(&self) -> &str;

    fn key(&self) -> CacheKey;

    fn request(&self) -> FetchRequest;

    fn validate(&self, raw: &Value) -> Validated<Self::Output>;

    /// Whether the parameters are complete enough to fetch at all.
    fn enabled(&self) -> bool {
        true
    }

    /// Whether this query applies to the requested provider at all.
    /// Queries that don't resolve to the ignore sentinel without a request.
    fn applies(&self) -> bool {
        true
    }
}
