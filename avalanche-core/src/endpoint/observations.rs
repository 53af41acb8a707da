use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;

use super::Endpoint;
use crate::{
    fetch::FetchRequest,
    key::CacheKey,
    model::{AvalancheCenterId, RequestedTime},
    validate::{self, Validated},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationSummary {
    pub id: String,
    pub observer_type: String,
    pub name: String,
    pub start_date: String,
    pub location_name: String,
    pub location_point: LocationPoint,
    pub observation_summary: Option<String>,
}

impl ObservationSummary {
    fn started(&self) -> Option<NaiveDateTime> {
        DateTime::parse_from_rfc3339(&self.start_date)
            .map(|dt| dt.naive_utc())
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(&self.start_date, "%Y-%m-%d")
                    .ok()
                    .map(|d| d.and_time(NaiveTime::MIN))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationList {
    #[serde(rename = "getObservationList", default, deserialize_with = "validate::null_as_default")]
    pub observations: Vec<ObservationSummary>,
}

impl ObservationList {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Observations ordered newest first. Unparseable start dates sort last.
    pub fn newest_first(&self) -> Vec<&ObservationSummary> {
        let mut sorted: Vec<&ObservationSummary> = self.observations.iter().collect();
        sorted.sort_by_key(|o| Reverse(o.started()));
        sorted
    }
}

/// An absent or `null` list is read as empty.
pub fn validate_observations(raw: &Value) -> Validated<ObservationList> {
    validate::validate(raw)
}

/// Public observations for a center over an inclusive date range.
#[derive(Debug, Clone)]
pub struct ObservationsQuery {
    pub host: String,
    pub center: AvalancheCenterId,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ObservationsQuery {
    /// The month leading up to `requested`.
    pub fn month_before(host: impl Into<String>, center: AvalancheCenterId, requested: RequestedTime) -> Self {
        let end = requested.resolve(Utc::now()).date_naive();
        let start = end.checked_sub_months(Months::new(1)).unwrap_or(end);
        Self { host: host.into(), center, start, end }
    }
}

impl Endpoint for ObservationsQuery {
    type Output = ObservationList;

    fn what(&self) -> &str {
        "observations"
    }

    fn key(&self) -> CacheKey {
        CacheKey::builder("observations")
            .param("host", &self.host)
            .param("center", self.center.as_str())
            .param("start_date", self.start)
            .param("end_date", self.end)
            .build()
    }

    fn request(&self) -> FetchRequest {
        FetchRequest::get(format!("{}/obs/v1/public/observation", self.host))
            .param("center", self.center)
            .param("startDate", self.start.format("%Y-%m-%d"))
            .param("endDate", self.end.format("%Y-%m-%d"))
    }

    fn validate(&self, raw: &Value) -> Validated<ObservationList> {
        validate_observations(raw)
    }
}
