use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Endpoint;
use crate::{
    fetch::FetchRequest,
    key::CacheKey,
    model::{AvalancheCenterId, RequestedTime, to_atom},
    validate::{self, Validated},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeOfDay {
    #[serde(rename = "0-notspec")]
    NotSpecified,
    #[serde(rename = "1-morning")]
    Morning,
    #[serde(rename = "1a-midday")]
    Midday,
    #[serde(rename = "2-afternoon")]
    Afternoon,
    #[serde(rename = "3-evening")]
    Evening,
    #[serde(rename = "4-night")]
    Night,
}

impl TimeOfDay {
    /// Display label. Unspecified renders as an empty string.
    pub fn label(&self) -> &'static str {
        match self {
            TimeOfDay::NotSpecified => "",
            TimeOfDay::Morning => "Morning",
            TimeOfDay::Midday => "Mid-day",
            TimeOfDay::Afternoon => "Afternoon",
            TimeOfDay::Evening => "Evening",
            TimeOfDay::Night => "Night",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecaster {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountainWeatherForecast {
    pub id: f64,
    #[serde(deserialize_with = "validate::utc_timestamp")]
    pub creation_date: String,
    #[serde(deserialize_with = "validate::utc_timestamp")]
    pub publish_date: String,
    pub day1_date: String,
    pub special_header_notes: String,
    pub synopsis_day1_day2: String,
    pub extended_synopsis: String,
    #[serde(default, deserialize_with = "validate::truthy")]
    pub afternoon: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precipitation {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPrecipitation {
    pub name: String,
    pub order: f64,
    pub precipitation: Vec<Precipitation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnowLevel {
    pub elevation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgelineWind {
    pub direction: Option<String>,
    pub speed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherPeriod {
    pub date: String,
    pub time_of_day: TimeOfDay,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NwacWeatherForecast {
    pub five_thousand_foot_temperatures: Vec<TemperatureRange>,
    pub forecaster: Forecaster,
    pub mountain_weather_forecast: MountainWeatherForecast,
    pub periods: Vec<String>,
    pub sub_periods: Vec<String>,
    pub precipitation_by_location: Vec<LocationPrecipitation>,
    pub snow_levels: Vec<SnowLevel>,
    pub ridgeline_winds: Vec<RidgelineWind>,
    pub weather_forecasts: Vec<WeatherPeriod>,
}

/// Pagination block of the response envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Meta {
    pub limit: Option<f64>,
    pub next: Option<String>,
    pub offset: Option<f64>,
    pub previous: Option<String>,
    pub total_count: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ForecastEnvelope {
    #[serde(rename = "meta")]
    _meta: Meta,
    objects: NwacWeatherForecast,
}

/// Validate the `{meta, objects}` envelope and return the forecast inside it.
pub fn validate_forecast(raw: &Value) -> Validated<NwacWeatherForecast> {
    validate::validate::<ForecastEnvelope>(raw).map(|envelope| envelope.objects)
}

/// Mountain weather forecast for one NWAC zone. Only meaningful for NWAC.
#[derive(Debug, Clone)]
pub struct NwacWeatherForecastQuery {
    pub host: String,
    pub center: AvalancheCenterId,
    pub zone_id: i64,
    pub requested: RequestedTime,
}

impl NwacWeatherForecastQuery {
    pub fn new(host: impl Into<String>, center: AvalancheCenterId, zone_id: i64, requested: RequestedTime) -> Self {
        Self { host: host.into(), center, zone_id, requested }
    }
}

impl Endpoint for NwacWeatherForecastQuery {
    type Output = NwacWeatherForecast;

    fn what(&self) -> &str {
        "NWAC weather forecast"
    }

    fn key(&self) -> CacheKey {
        CacheKey::builder("nwac-weather")
            .param("host", &self.host)
            .param("zone_id", self.zone_id)
            .param("requested_time", self.requested.key_part())
            .build()
    }

    fn request(&self) -> FetchRequest {
        FetchRequest::get(format!("{}/api/v1/mountain-weather-region-forecast", self.host))
            .param("zone_id", self.zone_id)
            .param("published_datetime", to_atom(self.requested.resolve(Utc::now())))
    }

    fn validate(&self, raw: &Value) -> Validated<NwacWeatherForecast> {
        validate_forecast(raw)
    }

    fn applies(&self) -> bool {
        self.center == AvalancheCenterId::Nwac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "meta": {"limit": 20, "next": null, "offset": 0, "previous": null, "total_count": 1},
            "objects": {
                "five_thousand_foot_temperatures": [{"min": 22, "max": 31}],
                "forecaster": {"first_name": "Dennis", "last_name": "D'Amico"},
                "mountain_weather_forecast": {
                    "id": 1431,
                    "creation_date": "2024-01-05 10:00:00",
                    "publish_date": "2024-01-05 14:30:00",
                    "day1_date": "2024-01-05",
                    "special_header_notes": "",
                    "synopsis_day1_day2": "<p>A weak front arrives Saturday.</p>",
                    "extended_synopsis": "",
                    "afternoon": 1
                },
                "periods": ["Friday", "Friday Night"],
                "sub_periods": ["Friday Morning", "Friday Afternoon"],
                "precipitation_by_location": [
                    {"name": "Hurricane Ridge", "order": 1, "precipitation": [{"value": "LT 0.25"}]}
                ],
                "snow_levels": [{"elevation": 3500}],
                "ridgeline_winds": [{"direction": "SW", "speed": "10-20"}, {"direction": null, "speed": null}],
                "weather_forecasts": [
                    {"date": "2024-01-05", "time_of_day": "1a-midday", "description": "Cloudy."}
                ]
            }
        })
    }

    fn query(center: AvalancheCenterId) -> NwacWeatherForecastQuery {
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        NwacWeatherForecastQuery::new("https://nwac.us", center, 5, RequestedTime::on(day))
    }

    #[test]
    fn parses_and_normalizes_forecast() {
        let forecast = validate_forecast(&sample()).into_result().unwrap();
        let mwf = &forecast.mountain_weather_forecast;

        assert_eq!(mwf.creation_date, "2024-01-05T10:00:00+00:00");
        assert_eq!(mwf.publish_date, "2024-01-05T14:30:00+00:00");
        assert!(mwf.afternoon);
        assert_eq!(forecast.weather_forecasts[0].time_of_day, TimeOfDay::Midday);
        assert_eq!(forecast.weather_forecasts[0].time_of_day.label(), "Mid-day");
        assert_eq!(forecast.ridgeline_winds[1], RidgelineWind { direction: None, speed: None });
    }

    #[test]
    fn afternoon_zero_and_null_coerce_to_false() {
        for value in [json!(0), json!(null), json!("")] {
            let mut raw = sample();
            raw["objects"]["mountain_weather_forecast"]["afternoon"] = value;
            let forecast = validate_forecast(&raw).into_result().unwrap();
            assert!(!forecast.mountain_weather_forecast.afternoon);
        }
    }

    #[test]
    fn first_offending_field_is_reported() {
        let mut raw = sample();
        raw["objects"]["forecaster"]["last_name"] = json!(7);
        raw["objects"]["weather_forecasts"][0]["time_of_day"] = json!("5-dawn");

        let err = validate_forecast(&raw).into_result().unwrap_err();
        assert_eq!(err.path, "$.objects.forecaster.last_name");
        assert_eq!(err.expected, "a string");
        assert_eq!(err.actual, "integer `7`");
    }

    #[test]
    fn unknown_time_of_day_is_rejected() {
        let mut raw = sample();
        raw["objects"]["weather_forecasts"][0]["time_of_day"] = json!("5-dawn");

        let err = validate_forecast(&raw).into_result().unwrap_err();
        assert_eq!(err.path, "$.objects.weather_forecasts[0].time_of_day");
        assert_eq!(err.actual, "variant `5-dawn`");
        assert!(err.expected.starts_with("one of `0-notspec`"));
    }

    #[test]
    fn missing_meta_is_rejected() {
        let mut raw = sample();
        raw.as_object_mut().unwrap().remove("meta");
        let err = validate_forecast(&raw).into_result().unwrap_err();
        assert_eq!(err.path, "$.meta");
        assert_eq!(err.actual, "missing");
    }

    #[test]
    fn forecast_serializes_with_wire_names() {
        let forecast = validate_forecast(&sample()).into_result().unwrap();
        let out = serde_json::to_value(&forecast).unwrap();

        assert_eq!(out["weather_forecasts"][0]["time_of_day"], "1a-midday");
        assert_eq!(out["mountain_weather_forecast"]["afternoon"], true);

        let again: NwacWeatherForecast = serde_json::from_value(out).unwrap();
        assert_eq!(again, forecast);
    }

    #[test]
    fn key_and_request_follow_zone_and_date() {
        let q = query(AvalancheCenterId::Nwac);

        assert_eq!(
            q.key().to_string(),
            r#"["nwac-weather",{"host":"https://nwac.us","requested_time":"2024-01-05","zone_id":5}]"#
        );
        let request = q.request();
        assert_eq!(request.url, "https://nwac.us/api/v1/mountain-weather-region-forecast");
        assert!(request.query.contains(&("zone_id".to_string(), "5".to_string())));
        assert!(request.query.contains(&("published_datetime".to_string(), "2024-01-05T00:00:00+00:00".to_string())));
    }

    #[test]
    fn only_applies_to_nwac() {
        assert!(query(AvalancheCenterId::Nwac).applies());
        assert!(!query(AvalancheCenterId::Snfac).applies());
    }
}
