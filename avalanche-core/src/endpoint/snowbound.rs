//! Snowbound weather-station data: station listings and time series.
//!
//! The time-series endpoint returns station metadata with upper-case field
//! names while the station listing uses lower-case ones for the same data.
//! Each shape keeps its own casing on the way back out, and
//! [`TimeSeriesStation::metadata`] converts to the common [`StationMetadata`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::Endpoint;
use crate::{
    fetch::FetchRequest,
    key::CacheKey,
    validate::{self, Validated},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "ACTIVE")]
    ActiveUpper,
    #[serde(rename = "inactive")]
    Inactive,
    #[serde(rename = "INACTIVE")]
    InactiveUpper,
}

impl StationStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, StationStatus::Active | StationStatus::ActiveUpper)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotType {
    #[serde(rename = "default")]
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationMessage {
    pub datalogger_id: i64,
    pub date: NaiveDate,
    pub node: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnowObsMetadata {
    pub id: i64,
    pub name: String,
    pub plot_type: PlotType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationStyle {
    pub client_id: i64,
    pub fill_color: String,
    pub id: i64,
    pub name: String,
    pub stroke_color: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationMetadata {
    pub client_id: i64,
    #[serde(default)]
    pub custom_attributes: Value,
    /// Feet above sea level.
    pub elevation: f64,
    pub id: i64,
    pub location_style_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub messages: Vec<StationMessage>,
    #[serde(default)]
    pub mnet_id: Value,
    pub plot_type: PlotType,
    pub snowobs: SnowObsMetadata,
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub source_id: Value,
    pub state: String,
    pub status: StationStatus,
    pub stid: i64,
    pub style: StationStyle,
    pub timezone: String,
}

/// Station entry of a time series. Same data as [`StationMetadata`], but its
/// own fields are upper-case on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct TimeSeriesStation {
    pub client_id: i64,
    #[serde(default)]
    pub custom_attributes: Value,
    pub elevation: f64,
    pub id: i64,
    pub location_style_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub messages: Vec<StationMessage>,
    #[serde(default)]
    pub mnet_id: Value,
    pub plot_type: PlotType,
    pub snowobs: SnowObsMetadata,
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub source_id: Value,
    pub state: String,
    pub status: StationStatus,
    pub stid: i64,
    pub style: StationStyle,
    pub timezone: String,
    /// Samples per variable; the sample type depends on the variable.
    #[serde(default)]
    pub observations: BTreeMap<String, Vec<Value>>,
}

impl TimeSeriesStation {
    pub fn metadata(&self) -> StationMetadata {
        StationMetadata {
            client_id: self.client_id,
            custom_attributes: self.custom_attributes.clone(),
            elevation: self.elevation,
            id: self.id,
            location_style_id: self.location_style_id,
            latitude: self.latitude,
            longitude: self.longitude,
            messages: self.messages.clone(),
            mnet_id: self.mnet_id.clone(),
            plot_type: self.plot_type,
            snowobs: self.snowobs.clone(),
            name: self.name.clone(),
            source: self.source.clone(),
            source_id: self.source_id.clone(),
            state: self.state.clone(),
            status: self.status,
            stid: self.stid,
            style: self.style.clone(),
            timezone: self.timezone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableMetadata {
    pub id: i64,
    pub long_name: String,
    pub rounding: f64,
    pub tab: String,
    pub source: String,
    pub units: String,
    pub variable: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct StationTimeSeries {
    pub summary: BTreeMap<String, Value>,
    /// Source -> variable -> unit.
    pub units: BTreeMap<String, BTreeMap<String, String>>,
    pub variables: BTreeMap<String, BTreeMap<String, VariableMetadata>>,
    pub station: Vec<TimeSeriesStation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesResponse {
    pub msg: String,
    pub status: String,
    pub station_timeseries: StationTimeSeries,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationResponse {
    pub status: String,
    pub total: i64,
    pub pages: i64,
    /// 1-indexed.
    pub current_page: i64,
    pub results: Vec<StationMetadata>,
}

pub fn validate_timeseries(raw: &Value) -> Validated<TimeSeriesResponse> {
    validate::validate(raw)
}

pub fn validate_station_list(raw: &Value) -> Validated<StationResponse> {
    validate::validate(raw)
}

/// Time series for a set of stations over an inclusive date range.
#[derive(Debug, Clone)]
pub struct StationTimeSeriesQuery {
    pub host: String,
    pub source: String,
    pub stations: Vec<i64>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Endpoint for StationTimeSeriesQuery {
    type Output = TimeSeriesResponse;

    fn what(&self) -> &str {
        "weather station time series"
    }

    fn key(&self) -> CacheKey {
        CacheKey::builder("station-timeseries")
            .param("host", &self.host)
            .param("source", &self.source)
            .param("stations", self.stations.clone())
            .param("start", self.start)
            .param("end", self.end)
            .build()
    }

    fn request(&self) -> FetchRequest {
        let stids: Vec<String> = self.stations.iter().map(i64::to_string).collect();
        FetchRequest::get(format!("{}/wxd/stationdata", self.host))
            .param("source", &self.source)
            .param("stid", stids.join(","))
            .param("start_date", self.start.format("%Y-%m-%d"))
            .param("end_date", self.end.format("%Y-%m-%d"))
    }

    fn validate(&self, raw: &Value) -> Validated<TimeSeriesResponse> {
        validate_timeseries(raw)
    }

    fn enabled(&self) -> bool {
        !self.stations.is_empty()
    }
}

/// One page of the station listing for a data source.
#[derive(Debug, Clone)]
pub struct StationListQuery {
    pub host: String,
    pub source: String,
    pub page: u32,
}

impl Endpoint for StationListQuery {
    type Output = StationResponse;

    fn what(&self) -> &str {
        "weather stations"
    }

    fn key(&self) -> CacheKey {
        CacheKey::builder("stations")
            .param("host", &self.host)
            .param("source", &self.source)
            .param("page", self.page)
            .build()
    }

    fn request(&self) -> FetchRequest {
        FetchRequest::get(format!("{}/wxd/stations", self.host))
            .param("source", &self.source)
            .param("page", self.page)
    }

    fn validate(&self, raw: &Value) -> Validated<StationResponse> {
        validate_station_list(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn lower_station() -> Value {
        json!({
            "client_id": 1,
            "custom_attributes": {"wind_ht": 30},
            "elevation": 5470,
            "id": 6,
            "location_style_id": 2,
            "latitude": 47.42,
            "longitude": -121.41,
            "messages": [{"datalogger_id": 12, "date": "2024-01-04", "node": "Upper"}],
            "mnet_id": null,
            "plot_type": "default",
            "snowobs": {"id": 3, "name": "Snoqualmie Pass", "plot_type": "default"},
            "name": "Alpental Summit",
            "source": "nwac",
            "source_id": "49",
            "state": "WA",
            "status": "active",
            "stid": 6,
            "style": {
                "client_id": 1, "fill_color": "#ffffff", "id": 4,
                "name": "nwac", "stroke_color": "#000000", "symbol": "circle"
            },
            "timezone": "PST"
        })
    }

    fn upper_station() -> Value {
        let mut upper: Map<String, Value> = lower_station()
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.to_uppercase(), v.clone()))
            .collect();
        upper.insert("STATUS".into(), json!("INACTIVE"));
        upper.insert("OBSERVATIONS".into(), json!({"air_temp": [31.2, null, 30.9], "date_time": ["2024-01-05T00:00:00-0800"]}));
        Value::Object(upper)
    }

    #[test]
    fn station_list_uses_lower_case_fields() {
        let response = validate_station_list(&station_list()).into_result().unwrap();

        let station = &response.results[0];
        assert_eq!(station.name, "Alpental Summit");
        assert!(station.status.is_active());
        assert_eq!(station.mnet_id, Value::Null);
        assert_eq!(station.snowobs.plot_type, PlotType::Default);
    }

    fn station_list() -> Value {
        json!({"status": "ok", "total": 1, "pages": 1, "current_page": 1, "results": [lower_station()]})
    }

    fn timeseries() -> Value {
        json!({
            "msg": "",
            "status": "success",
            "station_timeseries": {
                "SUMMARY": {"NWAC_NUMBER_OF_OBJECTS": 1, "NWAC_TOTAL_DATA_TIME": "12.3 ms"},
                "UNITS": {"nwac": {"air_temp": "fahrenheit"}},
                "VARIABLES": {"nwac": {"air_temp": {
                    "id": 1, "long_name": "Air Temperature", "rounding": 1, "tab": "temp",
                    "source": "nwac", "units": "fahrenheit", "variable": "air_temp"
                }}},
                "STATION": [upper_station()]
            }
        })
    }

    #[test]
    fn timeseries_uses_upper_case_fields() {
        let response = validate_timeseries(&timeseries()).into_result().unwrap();
        let series = &response.station_timeseries;

        assert_eq!(series.units["nwac"]["air_temp"], "fahrenheit");
        assert_eq!(series.variables["nwac"]["air_temp"].long_name, "Air Temperature");
        let station = &series.station[0];
        assert!(!station.status.is_active());
        assert_eq!(station.observations["air_temp"].len(), 3);

        let metadata = station.metadata();
        assert_eq!(metadata.name, "Alpental Summit");
        assert_eq!(metadata.messages[0].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
    }

    #[test]
    fn timeseries_output_validates_again() {
        let response = validate_timeseries(&timeseries()).into_result().unwrap();
        let out = serde_json::to_value(&response).unwrap();

        assert_eq!(out["station_timeseries"]["STATION"][0]["STID"], 6);
        assert!(out["station_timeseries"]["STATION"][0].get("stid").is_none());
        assert_eq!(validate_timeseries(&out).into_result().unwrap(), response);
    }

    #[test]
    fn station_list_output_validates_again() {
        let response = validate_station_list(&station_list()).into_result().unwrap();
        let out = serde_json::to_value(&response).unwrap();

        assert_eq!(out["results"][0]["stid"], 6);
        assert_eq!(validate_station_list(&out).into_result().unwrap(), response);
    }

    #[test]
    fn lower_case_station_is_rejected_in_timeseries() {
        let mut raw = timeseries();
        raw["station_timeseries"]["STATION"] = json!([lower_station()]);

        let err = validate_timeseries(&raw).into_result().unwrap_err();
        assert_eq!(err.path, "$.station_timeseries.STATION[0].CLIENT_ID");
        assert_eq!(err.actual, "missing");
    }

    #[test]
    fn unknown_status_is_rejected_at_its_path() {
        let mut raw_station = lower_station();
        raw_station["status"] = json!("retired");
        let raw = json!({"status": "ok", "total": 1, "pages": 1, "current_page": 1, "results": [raw_station]});

        let err = validate_station_list(&raw).into_result().unwrap_err();
        assert_eq!(err.path, "$.results[0].status");
        assert_eq!(err.actual, "variant `retired`");
    }

    #[test]
    fn timeseries_request_joins_station_ids() {
        let q = StationTimeSeriesQuery {
            host: "https://api.snowobs.com".into(),
            source: "nwac".into(),
            stations: vec![6, 49],
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
        };
        let request = q.request();

        assert_eq!(request.url, "https://api.snowobs.com/wxd/stationdata");
        assert!(request.query.contains(&("stid".to_string(), "6,49".to_string())));
        assert!(request.query.contains(&("end_date".to_string(), "2024-01-05".to_string())));
        assert_eq!(
            q.key().to_string(),
            r#"["station-timeseries",{"end":"2024-01-05","host":"https://api.snowobs.com","source":"nwac","start":"2024-01-01","stations":[6,49]}]"#
        );
        assert!(!StationTimeSeriesQuery { stations: vec![], ..q }.enabled());
    }
}
