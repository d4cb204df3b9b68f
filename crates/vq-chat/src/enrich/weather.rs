//! Current weather via OpenWeatherMap, with one nearest-city retry.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

use super::{describe_send_error, provider_client, read_json, FetchOutcome};
use crate::classify::{Classifier, NearestCity};

const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Observed conditions, metric units.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub place: String,
    pub country: Option<String>,
    pub condition: String,
    pub description: String,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub temp_min_c: f64,
    pub temp_max_c: f64,
    pub humidity_pct: u32,
    pub wind_speed_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WeatherLookup {
    Found(WeatherReport),
    /// The provider does not recognise the location.
    NotFound,
}

#[async_trait]
pub trait WeatherBackend: Send + Sync {
    async fn current(&self, location: &str) -> Result<WeatherLookup>;
}

pub struct OpenWeatherMap {
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    weather: Vec<OwmCondition>,
    main: OwmMain,
    #[serde(default)]
    wind: Option<OwmWind>,
    #[serde(default)]
    sys: Option<OwmSys>,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    #[serde(default)]
    main: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    feels_like: f64,
    temp_min: f64,
    temp_max: f64,
    humidity: u32,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwmSys {
    #[serde(default)]
    country: Option<String>,
}

impl From<OwmResponse> for WeatherReport {
    fn from(r: OwmResponse) -> Self {
        let (condition, description) = r
            .weather
            .into_iter()
            .next()
            .map(|w| (w.main, w.description))
            .unwrap_or_default();
        Self {
            place: r.name,
            country: r.sys.and_then(|s| s.country).filter(|c| !c.is_empty()),
            condition,
            description,
            temperature_c: r.main.temp,
            feels_like_c: r.main.feels_like,
            temp_min_c: r.main.temp_min,
            temp_max_c: r.main.temp_max,
            humidity_pct: r.main.humidity,
            wind_speed_ms: r.wind.map(|w| w.speed).unwrap_or_default(),
        }
    }
}

impl OpenWeatherMap {
    pub fn new(api_key: String, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            api_key,
            base_url: OPENWEATHER_URL.to_string(),
            client: provider_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl WeatherBackend for OpenWeatherMap {
    async fn current(&self, location: &str) -> Result<WeatherLookup> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", location), ("appid", self.api_key.as_str()), ("units", "metric")])
            .send()
            .await
            .map_err(|e| describe_send_error("OpenWeatherMap", e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(WeatherLookup::NotFound);
        }
        let body: OwmResponse = read_json(response, "OpenWeatherMap").await?;
        Ok(WeatherLookup::Found(body.into()))
    }
}

/// Instruction used when no location is known: ask for it instead of guessing.
pub fn ask_location_instruction() -> String {
    "# WEATHER REQUEST: LOCATION NEEDED\n\
     The visitor asked about the weather but did not say where. You have NO weather data. \
     Do not guess or invent conditions. Ask them which city or town they want the weather for."
        .to_string()
}

/// Instruction used when the provider could not resolve the given location.
pub fn unresolved_location_instruction(location: &str) -> String {
    format!(
        "# WEATHER REQUEST: LOCATION NOT FOUND\n\
         Weather data for \"{}\" could not be retrieved. You have NO weather data. \
         Do not guess or invent conditions. Tell the visitor briefly and ask which city or town \
         nearby you should check instead.",
        location
    )
}

pub struct WeatherFetcher {
    backend: Arc<dyn WeatherBackend>,
}

impl WeatherFetcher {
    pub fn new(backend: Arc<dyn WeatherBackend>) -> Self {
        Self { backend }
    }

    /// Look up `location`; on "not found", ask the classifier for the nearest
    /// major city and retry once. Empty outcome on any failure.
    pub async fn fetch(&self, location: &str, classifier: &Classifier) -> FetchOutcome {
        match self.backend.current(location).await {
            Ok(WeatherLookup::Found(report)) => {
                return FetchOutcome::found(format_report(&report, None), resolved_name(&report));
            }
            Ok(WeatherLookup::NotFound) => {
                tracing::info!(location = %location, "Weather location not found, asking for nearest city");
            }
            Err(e) => {
                tracing::warn!(location = %location, error = %e, "Weather lookup failed");
                return FetchOutcome::empty(location);
            }
        }

        let nearest = match classifier.classify(&NearestCity, location).await {
            Ok(Some(city)) if !city.eq_ignore_ascii_case(location) => city,
            Ok(_) => return FetchOutcome::empty(location),
            Err(e) => {
                tracing::warn!(location = %location, error = %e, "Nearest-city resolution failed");
                return FetchOutcome::empty(location);
            }
        };

        match self.backend.current(&nearest).await {
            Ok(WeatherLookup::Found(report)) => {
                FetchOutcome::found(format_report(&report, Some(location)), resolved_name(&report))
            }
            Ok(WeatherLookup::NotFound) => {
                tracing::info!(location = %location, nearest = %nearest, "Nearest city not found either");
                FetchOutcome::empty(location)
            }
            Err(e) => {
                tracing::warn!(location = %nearest, error = %e, "Weather retry failed");
                FetchOutcome::empty(location)
            }
        }
    }
}

fn resolved_name(report: &WeatherReport) -> String {
    match &report.country {
        Some(country) => format!("{}, {}", report.place, country),
        None => report.place.clone(),
    }
}

fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

fn format_report(report: &WeatherReport, requested: Option<&str>) -> String {
    let mut text = String::from("# LIVE WEATHER DATA (OpenWeatherMap, retrieved just now)\n");
    text.push_str(&format!("Location: {}\n", resolved_name(report)));
    if let Some(requested) = requested {
        text.push_str(&format!(
            "Note: \"{}\" was not found; this is the nearest major city. Mention that.\n",
            requested
        ));
    }
    text.push_str(&format!("Conditions: {} ({})\n", report.condition, report.description));
    text.push_str(&format!(
        "Temperature: {:.1}°C ({:.0}°F), feels like {:.1}°C ({:.0}°F)\n",
        report.temperature_c,
        celsius_to_fahrenheit(report.temperature_c),
        report.feels_like_c,
        celsius_to_fahrenheit(report.feels_like_c)
    ));
    text.push_str(&format!(
        "Low / High: {:.1}°C / {:.1}°C\n",
        report.temp_min_c, report.temp_max_c
    ));
    text.push_str(&format!("Humidity: {}%\n", report.humidity_pct));
    text.push_str(&format!(
        "Wind: {:.1} m/s ({:.0} km/h)\n",
        report.wind_speed_ms,
        report.wind_speed_ms * 3.6
    ));
    text.push_str("Answer using only these figures. This is live data; present it naturally.");
    text
}
