//! Folds a set of query results into one display state.
//!
//! Precedence is Error > Loading > NotFound > Success. Ignored and idle
//! results are dropped before evaluation.

use std::sync::Arc;
use tracing::debug;

use crate::{
    error::{AggregateError, QueryError},
    model::NotFound,
    query::{ErrorReporter, QueryResult, QueryStatus},
};

/// Type-independent view of a [`QueryResult`], so results over different
/// payload types can be aggregated together.
pub trait QueryState {
    fn status(&self) -> QueryStatus;
    fn error(&self) -> Option<&QueryError>;
    fn not_found(&self) -> Option<&NotFound>;
    fn is_ignored(&self) -> bool;
}

impl<T> QueryState for QueryResult<T> {
    fn status(&self) -> QueryStatus {
        self.status
    }

    fn error(&self) -> Option<&QueryError> {
        self.error.as_ref()
    }

    fn not_found(&self) -> Option<&NotFound> {
        self.not_found.as_ref()
    }

    fn is_ignored(&self) -> bool {
        self.ignored
    }
}

fn counts(result: &dyn QueryState) -> bool {
    !result.is_ignored() && result.status() != QueryStatus::Idle
}

fn is_not_found(result: &dyn QueryState) -> bool {
    result.status() == QueryStatus::Success && result.not_found().is_some()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateState {
    Loading,
    Error(AggregateError),
    NotFound(Vec<NotFound>),
    Success,
}

/// Title and explanation shown in place of data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub title: String,
    pub reason: String,
}

impl AggregateState {
    /// Derive the combined state of `results`.
    pub fn derive(results: &[&dyn QueryState]) -> Self {
        let remaining: Vec<&dyn QueryState> = results.iter().copied().filter(|r| counts(*r)).collect();

        let errors: Vec<QueryError> = remaining.iter().filter_map(|r| r.error().cloned()).collect();
        if !errors.is_empty() {
            return AggregateState::Error(AggregateError::new(errors));
        }

        if remaining.iter().any(|r| r.status() == QueryStatus::Loading) {
            return AggregateState::Loading;
        }

        let missing: Vec<NotFound> = remaining
            .iter()
            .filter(|r| is_not_found(**r))
            .filter_map(|r| r.not_found().cloned())
            .collect();
        if !missing.is_empty() {
            return AggregateState::NotFound(missing);
        }

        AggregateState::Success
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AggregateState::Success)
    }

    /// User-facing text for the non-success states. Error details stay hidden.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            AggregateState::Error(_) => Some(Outcome {
                title: "Oops, something went wrong!".to_string(),
                reason: "We're sorry, but we cannot complete your request at this time.".to_string(),
            }),
            AggregateState::NotFound(missing) => {
                let thing = missing
                    .first()
                    .map(|nf| nf.what.as_str())
                    .filter(|what| !what.is_empty())
                    .unwrap_or("requested resource");
                Some(Outcome {
                    title: "No results found".to_string(),
                    reason: format!("We could not find the {thing}."),
                })
            }
            AggregateState::Loading | AggregateState::Success => None,
        }
    }
}

/// True when any result still needs the aggregate outcome rendered in place
/// of its data: an error, a pending load or a not-found marker.
pub fn incomplete(results: &[&dyn QueryState]) -> bool {
    results
        .iter()
        .filter(|r| counts(**r))
        .any(|r| matches!(r.status(), QueryStatus::Error | QueryStatus::Loading) || is_not_found(*r))
}

/// Derives aggregate state and reports failed aggregates.
#[derive(Debug, Clone)]
pub struct Aggregator {
    reporter: Arc<dyn ErrorReporter>,
}

impl Aggregator {
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { reporter }
    }

    pub fn evaluate(&self, results: &[&dyn QueryState]) -> AggregateState {
        let state = AggregateState::derive(results);
        match &state {
            AggregateState::Error(err) => self.reporter.report_aggregate_error(err),
            other => debug!(state = ?other, queries = results.len(), "aggregated query state"),
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::TransportError, query::tests::RecordingReporter};

    fn ok() -> QueryResult<i64> {
        QueryResult::success(1)
    }

    fn failed(url: &str) -> QueryResult<String> {
        QueryResult::failed(QueryError::Transport(TransportError::Timeout { url: url.to_string() }))
    }

    fn missing(what: &str) -> QueryResult<i64> {
        QueryResult::not_found(NotFound::new(what))
    }

    #[test]
    fn error_beats_loading() {
        let state = AggregateState::derive(&[&failed("a"), &QueryResult::<i64>::loading()]);
        assert!(matches!(state, AggregateState::Error(_)));
    }

    #[test]
    fn loading_beats_success() {
        let state = AggregateState::derive(&[&QueryResult::<i64>::loading(), &ok()]);
        assert_eq!(state, AggregateState::Loading);
    }

    #[test]
    fn not_found_beats_success() {
        let state = AggregateState::derive(&[&missing("NWAC weather forecast"), &ok()]);
        assert_eq!(state, AggregateState::NotFound(vec![NotFound::new("NWAC weather forecast")]));
    }

    #[test]
    fn all_success_is_success() {
        assert_eq!(AggregateState::derive(&[&ok(), &ok()]), AggregateState::Success);
    }

    #[test]
    fn ignored_and_idle_results_are_excluded() {
        let ignored = QueryResult::<i64>::ignored();
        let idle = QueryResult::<i64>::idle();

        assert_eq!(AggregateState::derive(&[&ignored, &ok()]), AggregateState::Success);
        assert_eq!(AggregateState::derive(&[&ignored, &idle]), AggregateState::Success);
        assert_eq!(AggregateState::derive(&[]), AggregateState::Success);
    }

    #[test]
    fn every_error_is_surfaced() {
        let state = AggregateState::derive(&[&failed("a"), &ok(), &failed("b")]);
        let AggregateState::Error(err) = state else {
            panic!("expected an error state");
        };
        assert_eq!(err.errors().len(), 2);
    }

    #[test]
    fn stale_data_with_failed_revalidation_is_an_error() {
        let mut result = failed("a");
        result.data = Some(Arc::new("cached".to_string()));
        assert!(matches!(AggregateState::derive(&[&result]), AggregateState::Error(_)));
    }

    #[test]
    fn outcome_texts() {
        let err = AggregateState::derive(&[&failed("a")]).outcome().unwrap();
        assert_eq!(err.title, "Oops, something went wrong!");

        let nf = AggregateState::derive(&[&missing("weather forecast"), &missing("observations")])
            .outcome()
            .unwrap();
        assert_eq!(nf.title, "No results found");
        assert_eq!(nf.reason, "We could not find the weather forecast.");

        let fallback = AggregateState::NotFound(vec![NotFound::new("")]).outcome().unwrap();
        assert_eq!(fallback.reason, "We could not find the requested resource.");
        assert_eq!(AggregateState::Success.outcome(), None);
    }

    #[test]
    fn incomplete_flags_anything_but_plain_success() {
        assert!(incomplete(&[&ok(), &QueryResult::<i64>::loading()]));
        assert!(incomplete(&[&missing("x")]));
        assert!(incomplete(&[&failed("a")]));
        assert!(!incomplete(&[&ok(), &QueryResult::<i64>::ignored()]));
    }

    #[test]
    fn aggregator_reports_failed_aggregates_only() {
        let reporter = Arc::new(RecordingReporter::default());
        let aggregator = Aggregator::new(reporter.clone());

        aggregator.evaluate(&[&ok()]);
        aggregator.evaluate(&[&failed("a"), &failed("b")]);

        let reported = reporter.aggregate_errors.lock();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].errors().len(), 2);
    }
}
