//! Keyword intent detection
//!
//! Decides, from the visitor's message and the assistant turn right before it,
//! which enrichments to attempt. Weather, time and image intents are plain
//! case-insensitive substring matches; the web-search decision is made later
//! by a classification call (see [`crate::classify::SearchNeed`]).

use serde::{Deserialize, Serialize};

const WEATHER_KEYWORDS: &[&str] = &[
    "weather",
    "temperature",
    "forecast",
    "raining",
    "rain today",
    "snowing",
    "snow today",
    "sunny",
    "humidity",
    "humid",
    "windy",
    "how hot",
    "how cold",
    "degrees outside",
];

const TIME_KEYWORDS: &[&str] = &[
    "what time",
    "time is it",
    "current time",
    "local time",
    "time in ",
    "time zone",
    "timezone",
    "what day is it",
    "what's the date",
    "what is the date",
    "today's date",
];

const IMAGE_KEYWORDS: &[&str] = &[
    "show me a",
    "show me an",
    "show me the",
    "show me some",
    "picture of",
    "pictures of",
    "image of",
    "images of",
    "photo of",
    "photos of",
    "what does it look like",
    "what do they look like",
    "what does a",
];

/// Phrases an assistant turn uses when it asked the visitor where they are.
const LOCATION_REQUEST_PHRASES: &[&str] = &[
    "which city",
    "what city",
    "which town",
    "what town",
    "which location",
    "what location",
    "where are you located",
    "where you are located",
    "your location",
    "your city",
    "city or town",
    "let me know where",
];

/// Result of the keyword pass. `needs_search` stays false until the
/// pipeline asks the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentFlags {
    pub is_weather: bool,
    pub is_time: bool,
    pub is_image: bool,
    pub needs_search: bool,
    /// The message answers a location question from the previous assistant turn.
    pub location_follow_up: bool,
}

impl IntentFlags {
    pub fn wants_location(&self) -> bool {
        self.is_weather || self.is_time
    }

    pub fn labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.is_weather {
            labels.push("weather");
        }
        if self.is_time {
            labels.push("time");
        }
        if self.is_image {
            labels.push("image");
        }
        if self.needs_search {
            labels.push("search");
        }
        labels
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntentDetector;

impl IntentDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, message: &str, previous_assistant: Option<&str>) -> IntentFlags {
        let lower = message.to_lowercase();
        let mut flags = IntentFlags {
            is_weather: contains_any(&lower, WEATHER_KEYWORDS),
            is_time: contains_any(&lower, TIME_KEYWORDS),
            is_image: contains_any(&lower, IMAGE_KEYWORDS),
            ..Default::default()
        };

        if !flags.wants_location() {
            if let Some(pending) = previous_assistant.and_then(pending_location_request) {
                flags.is_weather = pending.weather;
                flags.is_time = pending.time;
                flags.location_follow_up = true;
            }
        }

        flags
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingLocation {
    weather: bool,
    time: bool,
}

/// Which location-dependent intent, if any, the assistant turn left open.
fn pending_location_request(assistant_turn: &str) -> Option<PendingLocation> {
    let lower = assistant_turn.to_lowercase();
    if !contains_any(&lower, LOCATION_REQUEST_PHRASES) {
        return None;
    }
    let pending = PendingLocation {
        weather: contains_any(&lower, WEATHER_KEYWORDS),
        time: contains_any(&lower, TIME_KEYWORDS) || lower.contains("the time"),
    };
    if pending.weather || pending.time {
        Some(pending)
    } else {
        None
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
