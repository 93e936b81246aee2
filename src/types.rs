use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Price quote
// ---------------------------------------------------------------------------

/// One simulated market reading, as served to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct PriceQuote {
    pub bif_per_kg: i64,
    pub usd_per_lb: f64,
    pub change_24h: f64,
    pub change_7d: f64,
    pub last_updated: DateTime<Utc>,
    pub market_trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Stable,
    Rising,
    Falling,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Trend::Stable => "stable",
            Trend::Rising => "rising",
            Trend::Falling => "falling",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Market events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Frost,
    Harvest,
    Demand,
    Weather,
    Quality,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Price impact in BIF applied to the base price when the event fires.
    pub impact: i64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    pub event: MarketEvent,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Prompt context
// ---------------------------------------------------------------------------

/// Immutable snapshot of market data taken once at the start of a refresh
/// job. The cache never holds a live reference to market state.
#[derive(Debug, Clone)]
pub struct MarketContext {
    pub current_price: f64,
    pub change_24h: f64,
    pub trend: Trend,
    /// Historical prices, newest first.
    pub recent_prices: Vec<f64>,
    pub recent_events: Vec<String>,
}

// ---------------------------------------------------------------------------
// Dashboard composition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct WeatherSnapshot {
    pub temp: i64,
    pub humidity: i64,
    pub conditions: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Region {
    pub id: u32,
    pub name: String,
    pub coordinates: Coordinates,
    pub farmers: u64,
    pub alert_level: AlertLevel,
    pub price_bif: i64,
    pub weather: WeatherSnapshot,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Green,
    Yellow,
}

// ---------------------------------------------------------------------------
// Ask languages
// ---------------------------------------------------------------------------

/// Languages the /api/ai/ask endpoint answers in. Unknown values fall back
/// to English.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    French,
    Kirundi,
}

impl Language {
    pub fn from_code(code: &str) -> Self {
        match code {
            "rn" => Language::Kirundi,
            "fr" => Language::French,
            _ => Language::English,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::French => "fr",
            Language::Kirundi => "rn",
        }
    }

    /// Directive injected at the top of an ask prompt.
    pub fn directive(&self) -> &'static str {
        match self {
            Language::English => "Respond in English.",
            Language::French => "Respond ONLY in French.",
            Language::Kirundi => "Respond ONLY in Kirundi.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_from_code_defaults_to_english() {
        assert_eq!(Language::from_code("rn"), Language::Kirundi);
        assert_eq!(Language::from_code("fr"), Language::French);
        assert_eq!(Language::from_code("en"), Language::English);
        assert_eq!(Language::from_code("sw"), Language::English);
        assert_eq!(Language::from_code(""), Language::English);
    }

    #[test]
    fn trend_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Trend::Rising).unwrap(), "\"rising\"");
        assert_eq!(Trend::Stable.to_string(), "stable");
    }
}
