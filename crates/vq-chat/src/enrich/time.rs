//! Local time lookup
//!
//! Location → IANA zone via a built-in city table, then the provider's zone
//! directory, then UTC. The provider supplies the wall-clock time; when it is
//! unreachable the server's own UTC clock is used with a note to the model.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

use super::{describe_send_error, provider_client, read_json, FetchOutcome};

pub const DEFAULT_TIME_API_URL: &str = "https://worldtimeapi.org/api";
pub const DEFAULT_ZONE: &str = "Etc/UTC";

/// Common visitor locations, checked before the remote directory.
const CITY_ZONES: &[(&str, &str)] = &[
    ("new york", "America/New_York"),
    ("nyc", "America/New_York"),
    ("boston", "America/New_York"),
    ("washington", "America/New_York"),
    ("miami", "America/New_York"),
    ("atlanta", "America/New_York"),
    ("toronto", "America/Toronto"),
    ("chicago", "America/Chicago"),
    ("dallas", "America/Chicago"),
    ("houston", "America/Chicago"),
    ("mexico city", "America/Mexico_City"),
    ("denver", "America/Denver"),
    ("phoenix", "America/Phoenix"),
    ("los angeles", "America/Los_Angeles"),
    ("la", "America/Los_Angeles"),
    ("san francisco", "America/Los_Angeles"),
    ("seattle", "America/Los_Angeles"),
    ("vancouver", "America/Vancouver"),
    ("anchorage", "America/Anchorage"),
    ("honolulu", "Pacific/Honolulu"),
    ("sao paulo", "America/Sao_Paulo"),
    ("são paulo", "America/Sao_Paulo"),
    ("rio de janeiro", "America/Sao_Paulo"),
    ("buenos aires", "America/Argentina/Buenos_Aires"),
    ("bogota", "America/Bogota"),
    ("lima", "America/Lima"),
    ("london", "Europe/London"),
    ("dublin", "Europe/Dublin"),
    ("lisbon", "Europe/Lisbon"),
    ("madrid", "Europe/Madrid"),
    ("paris", "Europe/Paris"),
    ("brussels", "Europe/Brussels"),
    ("amsterdam", "Europe/Amsterdam"),
    ("berlin", "Europe/Berlin"),
    ("rome", "Europe/Rome"),
    ("vienna", "Europe/Vienna"),
    ("zurich", "Europe/Zurich"),
    ("stockholm", "Europe/Stockholm"),
    ("warsaw", "Europe/Warsaw"),
    ("athens", "Europe/Athens"),
    ("kyiv", "Europe/Kyiv"),
    ("istanbul", "Europe/Istanbul"),
    ("moscow", "Europe/Moscow"),
    ("cairo", "Africa/Cairo"),
    ("lagos", "Africa/Lagos"),
    ("nairobi", "Africa/Nairobi"),
    ("johannesburg", "Africa/Johannesburg"),
    ("jerusalem", "Asia/Jerusalem"),
    ("tel aviv", "Asia/Jerusalem"),
    ("dubai", "Asia/Dubai"),
    ("karachi", "Asia/Karachi"),
    ("mumbai", "Asia/Kolkata"),
    ("delhi", "Asia/Kolkata"),
    ("new delhi", "Asia/Kolkata"),
    ("bangalore", "Asia/Kolkata"),
    ("dhaka", "Asia/Dhaka"),
    ("bangkok", "Asia/Bangkok"),
    ("jakarta", "Asia/Jakarta"),
    ("singapore", "Asia/Singapore"),
    ("manila", "Asia/Manila"),
    ("hong kong", "Asia/Hong_Kong"),
    ("beijing", "Asia/Shanghai"),
    ("shanghai", "Asia/Shanghai"),
    ("taipei", "Asia/Taipei"),
    ("seoul", "Asia/Seoul"),
    ("tokyo", "Asia/Tokyo"),
    ("osaka", "Asia/Tokyo"),
    ("perth", "Australia/Perth"),
    ("brisbane", "Australia/Brisbane"),
    ("sydney", "Australia/Sydney"),
    ("melbourne", "Australia/Melbourne"),
    ("auckland", "Pacific/Auckland"),
];

/// Wall-clock time in one zone as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneTime {
    pub zone: String,
    pub datetime: DateTime<FixedOffset>,
    pub abbreviation: Option<String>,
}

#[async_trait]
pub trait TimeBackend: Send + Sync {
    /// Every zone identifier the provider knows.
    async fn zones(&self) -> Result<Vec<String>>;

    async fn zone_time(&self, zone: &str) -> Result<ZoneTime>;
}

pub struct WorldTimeApi {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct WorldTimeResponse {
    timezone: String,
    datetime: String,
    #[serde(default)]
    abbreviation: Option<String>,
}

impl WorldTimeResponse {
    fn into_zone_time(self) -> Result<ZoneTime> {
        let datetime = DateTime::parse_from_rfc3339(&self.datetime)
            .map_err(|e| anyhow!("Unparseable datetime {:?}: {}", self.datetime, e))?;
        Ok(ZoneTime {
            zone: self.timezone,
            datetime,
            abbreviation: self.abbreviation.filter(|a| !a.is_empty()),
        })
    }
}

impl WorldTimeApi {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: provider_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl TimeBackend for WorldTimeApi {
    async fn zones(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/timezone", self.base_url))
            .send()
            .await
            .map_err(|e| describe_send_error("WorldTimeAPI", e))?;
        read_json(response, "WorldTimeAPI").await
    }

    async fn zone_time(&self, zone: &str) -> Result<ZoneTime> {
        let path = zone
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let response = self
            .client
            .get(format!("{}/timezone/{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| describe_send_error("WorldTimeAPI", e))?;
        let body: WorldTimeResponse = read_json(response, "WorldTimeAPI").await?;
        body.into_zone_time()
    }
}

/// Normalise free text to a lookup key: lowercase, first comma-separated part.
fn city_key(location: &str) -> String {
    location
        .split(',')
        .next()
        .unwrap_or(location)
        .trim()
        .trim_end_matches(|c: char| c == '?' || c == '.' || c == '!')
        .to_lowercase()
}

pub fn lookup_city_zone(location: &str) -> Option<&'static str> {
    let key = city_key(location);
    CITY_ZONES.iter().find(|(city, _)| *city == key).map(|(_, zone)| *zone)
}

/// Find a directory entry whose last segment names the city
/// ("America/Argentina/Buenos_Aires" matches "buenos aires").
fn search_zone_directory<'a>(zones: &'a [String], location: &str) -> Option<&'a str> {
    let key = city_key(location);
    if key.is_empty() {
        return None;
    }
    zones
        .iter()
        .find(|zone| {
            zone.rsplit('/')
                .next()
                .map(|city| city.replace('_', " ").to_lowercase() == key)
                .unwrap_or(false)
        })
        .map(String::as_str)
}

pub struct TimeFetcher {
    backend: Arc<dyn TimeBackend>,
}

impl TimeFetcher {
    pub fn new(backend: Arc<dyn TimeBackend>) -> Self {
        Self { backend }
    }

    /// Resolve a zone for `location`, never failing: unresolved locations fall
    /// back to UTC.
    pub async fn resolve_zone(&self, location: &str) -> (String, bool) {
        if let Some(zone) = lookup_city_zone(location) {
            return (zone.to_string(), true);
        }
        match self.backend.zones().await {
            Ok(zones) => {
                if let Some(zone) = search_zone_directory(&zones, location) {
                    return (zone.to_string(), true);
                }
                tracing::info!(location = %location, "No timezone match, defaulting to UTC");
            }
            Err(e) => tracing::warn!(location = %location, error = %e, "Timezone directory unavailable"),
        }
        (DEFAULT_ZONE.to_string(), false)
    }

    /// Always returns text: provider time when available, server UTC otherwise.
    pub async fn fetch(&self, location: &str) -> FetchOutcome {
        let (zone, matched) = self.resolve_zone(location).await;
        match self.backend.zone_time(&zone).await {
            Ok(time) => FetchOutcome::found(format_zone_time(location, &time, matched), zone),
            Err(e) => {
                tracing::warn!(location = %location, zone = %zone, error = %e, "Time lookup failed, using server UTC");
                FetchOutcome::found(server_utc_fallback(location, Utc::now()), DEFAULT_ZONE)
            }
        }
    }
}

/// Instruction used when the visitor asked for the time without saying where.
pub fn ask_location_instruction() -> String {
    "# TIME REQUEST: LOCATION NEEDED\n\
     The visitor asked about the time but did not say where. Do not guess their timezone. \
     Ask them which city or town they want the time for."
        .to_string()
}

fn format_zone_time(location: &str, time: &ZoneTime, matched: bool) -> String {
    let mut text = String::from("# CURRENT TIME (live, retrieved just now)\n");
    text.push_str(&format!("Location: {} ({})\n", location.trim(), time.zone));
    text.push_str(&format!("Local time: {}\n", time.datetime.format("%-I:%M %p")));
    text.push_str(&format!("Day: {}\n", time.datetime.format("%A")));
    text.push_str(&format!("Date: {}\n", time.datetime.format("%B %-d, %Y")));
    let offset = time.datetime.format("%:z");
    match &time.abbreviation {
        Some(abbr) => text.push_str(&format!("Zone: {} (UTC{})\n", abbr, offset)),
        None => text.push_str(&format!("Zone: UTC{}\n", offset)),
    }
    if !matched {
        text.push_str(&format!(
            "Note: \"{}\" could not be matched to a timezone, so this is UTC. Say so and offer to \
             check a nearby major city.\n",
            location.trim()
        ));
    }
    text.push_str("Answer using only this time data.");
    text
}

fn server_utc_fallback(location: &str, now: DateTime<Utc>) -> String {
    format!(
        "# CURRENT TIME (server clock)\n\
         The local time for \"{}\" could not be resolved. Current UTC time: {} ({}, {}).\n\
         Tell the visitor you could not look up their local time and give the UTC time instead.",
        location.trim(),
        now.format("%-I:%M %p"),
        now.format("%A"),
        now.format("%B %-d, %Y")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeTime;
    use chrono::TimeZone;

    #[test]
    fn test_city_table() {
        assert!(CITY_ZONES.len() >= 40);
        assert_eq!(lookup_city_zone("Tokyo"), Some("Asia/Tokyo"));
        assert_eq!(lookup_city_zone("London, UK"), Some("Europe/London"));
        assert_eq!(lookup_city_zone("  new york? "), Some("America/New_York"));
        assert_eq!(lookup_city_zone("Ulaanbaatar"), None);
    }

    #[test]
    fn test_zone_directory_search() {
        let zones = vec![
            "America/Argentina/Buenos_Aires".to_string(),
            "Asia/Ulaanbaatar".to_string(),
            "Europe/London".to_string(),
        ];
        assert_eq!(search_zone_directory(&zones, "Ulaanbaatar, Mongolia"), Some("Asia/Ulaanbaatar"));
        assert_eq!(search_zone_directory(&zones, "buenos aires"), Some("America/Argentina/Buenos_Aires"));
        assert_eq!(search_zone_directory(&zones, "Gotham"), None);
    }

    #[test]
    fn test_parses_worldtimeapi_sample() {
        let raw = r#"{"abbreviation":"JST","client_ip":"203.0.113.9","datetime":"2024-05-01T21:03:04.123456+09:00","day_of_week":3,"day_of_year":122,"dst":false,"raw_offset":32400,"timezone":"Asia/Tokyo","unixtime":1714564984,"utc_datetime":"2024-05-01T12:03:04.123456+00:00","utc_offset":"+09:00","week_number":18}"#;
        let parsed: WorldTimeResponse = serde_json::from_str(raw).unwrap();
        let time = parsed.into_zone_time().unwrap();
        assert_eq!(time.zone, "Asia/Tokyo");

        let text = format_zone_time("Tokyo", &time, true);
        assert!(text.contains("Local time: 9:03 PM"));
        assert!(text.contains("Day: Wednesday"));
        assert!(text.contains("Date: May 1, 2024"));
        assert!(text.contains("Zone: JST (UTC+09:00)"));
        assert!(!text.contains("could not be matched"));
    }

    #[tokio::test]
    async fn test_remote_directory_then_utc_default() {
        let backend = Arc::new(FakeTime::new(vec!["Asia/Ulaanbaatar".into(), "Etc/UTC".into()]));
        let fetcher = TimeFetcher::new(backend.clone());

        let outcome = fetcher.fetch("Ulaanbaatar").await;
        assert_eq!(outcome.resolved, "Asia/Ulaanbaatar");

        let outcome = fetcher.fetch("Gotham").await;
        assert_eq!(outcome.resolved, DEFAULT_ZONE);
        assert!(outcome.text.contains("\"Gotham\" could not be matched"));

        // Table hits never touch the directory.
        fetcher.fetch("Paris").await;
        assert_eq!(backend.directory_calls(), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_uses_server_utc() {
        let fetcher = TimeFetcher::new(Arc::new(FakeTime::failing()));
        let outcome = fetcher.fetch("Tokyo").await;
        assert!(!outcome.is_empty());
        assert_eq!(outcome.resolved, DEFAULT_ZONE);
        assert!(outcome.text.contains("could not be resolved"));
    }

    #[test]
    fn test_server_utc_fallback_format() {
        let now = Utc.with_ymd_and_hms(2024, 12, 25, 6, 5, 0).unwrap();
        let text = server_utc_fallback("Tokyo", now);
        assert!(text.contains("6:05 AM (Wednesday, December 25, 2024)"));
    }
}
