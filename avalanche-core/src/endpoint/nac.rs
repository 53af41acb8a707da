use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Endpoint;
use crate::{
    fetch::FetchRequest,
    key::CacheKey,
    validate::{self, Validated},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvalancheCenterRef {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastZoneRef {
    pub id: i64,
    pub name: String,
    pub url: Option<String>,
    pub state: Option<String>,
    pub zone_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    #[serde(rename = "weather")]
    Weather,
}

/// Weather product published by an avalanche center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherProduct {
    pub id: i64,
    pub product_type: ProductType,
    pub status: String,
    pub author: Option<String>,
    #[serde(deserialize_with = "validate::utc_timestamp")]
    pub published_time: String,
    #[serde(default, deserialize_with = "validate::optional_utc_timestamp")]
    pub expires_time: Option<String>,
    #[serde(deserialize_with = "validate::utc_timestamp")]
    pub created_at: String,
    #[serde(deserialize_with = "validate::utc_timestamp")]
    pub updated_at: String,
    pub weather_discussion: Option<String>,
    #[serde(default)]
    pub weather_data: Option<Value>,
    pub avalanche_center: AvalancheCenterRef,
    pub forecast_zone: Vec<ForecastZoneRef>,
}

pub fn validate_weather_product(raw: &Value) -> Validated<WeatherProduct> {
    validate::validate(raw)
}

/// Weather product by id from the National Avalanche Center API.
/// Without an id the query stays disabled.
#[derive(Debug, Clone)]
pub struct WeatherForecastQuery {
    pub host: String,
    pub forecast_id: Option<i64>,
}

impl WeatherForecastQuery {
    pub fn new(host: impl Into<String>, forecast_id: Option<i64>) -> Self {
        Self { host: host.into(), forecast_id }
    }

    fn id(&self) -> i64 {
        self.forecast_id.unwrap_or_default()
    }
}

impl Endpoint for WeatherForecastQuery {
    type Output = WeatherProduct;

    fn what(&self) -> &str {
        "weather forecast"
    }

    fn key(&self) -> CacheKey {
        CacheKey::builder("weather-forecast")
            .param("host", &self.host)
            .param("forecast", self.id())
            .build()
    }

    fn request(&self) -> FetchRequest {
        FetchRequest::get(format!("{}/v2/public/product/{}", self.host, self.id()))
    }

    fn validate(&self, raw: &Value) -> Validated<WeatherProduct> {
        validate_weather_product(raw)
    }

    fn enabled(&self) -> bool {
        self.forecast_id.is_some_and(|id| id != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "id": 132911,
            "product_type": "weather",
            "status": "published",
            "author": "Robert Hahn",
            "published_time": "2024-01-05T14:30:00+00:00",
            "expires_time": null,
            "created_at": "2024-01-05 12:00:00",
            "updated_at": "2024-01-05T13:00:00",
            "weather_discussion": "<p>Clearing by evening.</p>",
            "weather_data": {"columns": [["Sky"]], "rows": []},
            "avalanche_center": {"id": "NWAC", "name": "Northwest Avalanche Center", "url": "https://nwac.us"},
            "forecast_zone": [{"id": 1128, "name": "Olympics", "zone_id": "1"}]
        })
    }

    #[test]
    fn parses_product_and_normalizes_timestamps() {
        let product = validate_weather_product(&sample()).into_result().unwrap();

        assert_eq!(product.created_at, "2024-01-05T12:00:00+00:00");
        assert_eq!(product.updated_at, "2024-01-05T13:00:00+00:00");
        assert_eq!(product.published_time, "2024-01-05T14:30:00+00:00");
        assert_eq!(product.expires_time, None);
        assert_eq!(product.avalanche_center.city, None);
        assert_eq!(product.forecast_zone[0].zone_id.as_deref(), Some("1"));
        assert!(product.weather_data.is_some());
        assert_eq!(product.product_type, ProductType::Weather);
    }

    #[test]
    fn other_product_types_are_rejected() {
        let mut raw = sample();
        raw["product_type"] = json!("forecast");

        let err = validate_weather_product(&raw).into_result().unwrap_err();
        assert_eq!(err.path, "$.product_type");
        assert_eq!(err.expected, "`weather`");
        assert_eq!(err.actual, "variant `forecast`");
    }

    #[test]
    fn zone_errors_name_the_index() {
        let mut raw = sample();
        raw["forecast_zone"] = json!([{"id": 1, "name": "A"}, {"id": "two", "name": "B"}]);

        let err = validate_weather_product(&raw).into_result().unwrap_err();
        assert_eq!(err.path, "$.forecast_zone[1].id");
        assert_eq!(err.expected, "i64");
    }

    #[test]
    fn disabled_without_forecast_id() {
        assert!(!WeatherForecastQuery::new("https://api.avalanche.org", None).enabled());
        assert!(!WeatherForecastQuery::new("https://api.avalanche.org", Some(0)).enabled());

        let q = WeatherForecastQuery::new("https://api.avalanche.org", Some(132911));
        assert!(q.enabled());
        assert_eq!(q.request().url, "https://api.avalanche.org/v2/public/product/132911");
        assert_eq!(
            q.key().to_string(),
            r#"["weather-forecast",{"forecast":132911,"host":"https://api.avalanche.org"}]"#
        );
    }
}
