//! Current-weather tool backed by Open-Meteo.
//!
//! Two calls: the geocoding API resolves a city name to coordinates, then
//! the forecast API returns the current conditions there.

use async_trait::async_trait;
use serde::Deserialize;
use threadline_core::error::ToolError;
use threadline_core::tool::{Tool, ToolResult};

use crate::http::JsonClient;

pub struct WeatherTool {
    http: JsonClient,
    geocoding_base_url: String,
    weather_base_url: String,
}

impl WeatherTool {
    pub fn new(
        geocoding_base_url: impl Into<String>,
        weather_base_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            http: JsonClient::new("get_weather", timeout_secs),
            geocoding_base_url: geocoding_base_url.into(),
            weather_base_url: weather_base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Deserialize)]
struct Place {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
}

#[derive(Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
    #[serde(default)]
    weathercode: Option<u32>,
    #[serde(default)]
    time: Option<String>,
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a city. Returns temperature in Celsius and wind speed in km/h."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City name, e.g. 'Paris'"
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let city = arguments["city"]
            .as_str()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'city' argument".into()))?;

        let url = self.http.url(
            &self.geocoding_base_url,
            "/v1/search",
            &[("name", city), ("count", "1")],
        )?;
        let geo: GeocodingResponse = self.http.get_json(url).await?;
        let place = geo
            .results
            .into_iter()
            .next()
            .ok_or_else(|| self.http.failed(format!("no location found for '{city}'")))?;

        let latitude = place.latitude.to_string();
        let longitude = place.longitude.to_string();
        let url = self.http.url(
            &self.weather_base_url,
            "/v1/forecast",
            &[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("current_weather", "true"),
            ],
        )?;
        let forecast: ForecastResponse = self.http.get_json(url).await?;
        let current = forecast.current_weather;

        Ok(ToolResult::structured(serde_json::json!({
            "city": place.name,
            "country": place.country,
            "latitude": place.latitude,
            "longitude": place.longitude,
            "temperature_c": current.temperature,
            "windspeed_kmh": current.windspeed,
            "weathercode": current.weathercode,
            "observed_at": current.time,
        })))
    }
}
