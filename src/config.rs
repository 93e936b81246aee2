use crate::error::{AppError, Result};

pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const ELASTIC_ENDPOINT: &str = "http://localhost:9200";

/// Maximum age of a cached prediction before a background refresh is due.
/// A freshly-failed generation also satisfies this window (the fallback is
/// cached with a timestamp), which suppresses retry storms against a failing
/// AI service.
pub const PREDICTION_STALENESS_SECS: u64 = 300;

/// Upper bound on a single Gemini call. On timeout the refresh job caches the
/// fallback payload like any other failure.
pub const AI_TIMEOUT_SECS: u64 = 30;

/// Analytics-store request timeout. Writes are best-effort; a slow store must
/// not hold a worker for long.
pub const ANALYTICS_TIMEOUT_SECS: u64 = 5;

/// Background worker count. Tuning constant, not a correctness parameter —
/// the at-most-one-refresh guarantee lives in the cache, not here.
pub const WORKER_POOL_SIZE: usize = 3;

/// Delay before the startup cache warmup kicks off the first generation.
pub const CACHE_WARMUP_DELAY_SECS: u64 = 2;

/// Channel capacity for the analytics index writer.
pub const CHANNEL_CAPACITY: usize = 1024;

/// How many historical prices to pull into a prediction prompt.
pub const PRICE_HISTORY_SIZE: usize = 20;

pub const PRICES_INDEX: &str = "agripulse-prices";
pub const PREDICTIONS_INDEX: &str = "agripulse-predictions";
pub const QUERIES_INDEX: &str = "agripulse-queries";

/// Served while the very first generation is still running.
pub const FALLBACK_GENERATING: &str = r#"{"prediction": "Igiciro cy'ikawa gishobora guhinduka. Komeza gukurikirana.", "confidence": "medium", "recommendation": "hold", "predicted_change": "0", "reasoning": "Generating fresh analysis..."}"#;

/// Cached when a refresh job fails for any reason.
pub const FALLBACK_UNAVAILABLE: &str = r#"{"prediction": "Igiciro cy'ikawa gishobora guhinduka. Komeza gukurikirana.", "confidence": "medium", "recommendation": "hold", "predicted_change": "0", "reasoning": "AI analysis temporarily unavailable"}"#;

#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini API key (GEMINI_API_KEY). Empty means every generation fails
    /// and the fallback payload is served.
    pub gemini_api_key: String,
    pub gemini_api_url: String,
    pub gemini_model: String,
    /// Elasticsearch-compatible endpoint (ELASTIC_ENDPOINT)
    pub elastic_endpoint: String,
    /// ApiKey credential for the analytics store (ELASTIC_API_KEY, optional)
    pub elastic_api_key: String,
    pub api_port: u16,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            gemini_api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_api_url: std::env::var("GEMINI_API_URL")
                .unwrap_or_else(|_| GEMINI_API_URL.to_string()),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| GEMINI_MODEL.to_string()),
            elastic_endpoint: std::env::var("ELASTIC_ENDPOINT")
                .unwrap_or_else(|_| ELASTIC_ENDPOINT.to_string()),
            elastic_api_key: std::env::var("ELASTIC_API_KEY").unwrap_or_default(),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "5001".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}
