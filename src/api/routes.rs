use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::analytics::client::compute_stats;
use crate::analytics::AnalyticsClient;
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::cache::PredictionCache;
use crate::config::PRICES_INDEX;
use crate::error::AppError;
use crate::market::MarketState;
use crate::predictor::Predictor;
use crate::types::{AlertLevel, Coordinates, Language, Region, WeatherSnapshot};

#[derive(Clone)]
pub struct ApiState {
    pub market: Arc<MarketState>,
    pub predictor: Predictor,
    pub cache: Arc<PredictionCache>,
    pub analytics: Arc<AnalyticsClient>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/ai/ask", get(get_ai_ask))
        .route("/api/regions", get(get_regions))
        .route("/api/analytics/trends", get(get_trends))
        .route("/api/health", get(get_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct AskQuery {
    pub q: Option<String>,
    pub lang: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Dashboard payload: fresh quote, cached AI analysis, recent events,
/// weather. The AI call never runs on this path — `get_current` serves the
/// cache and defers any refresh to the job runner.
async fn get_dashboard(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let quote = state.market.next_quote();
    state.predictor.submit_index(
        PRICES_INDEX,
        json!({
            "timestamp": quote.last_updated.to_rfc3339(),
            "price_bif": quote.bif_per_kg,
            "change_percent": quote.change_24h,
        }),
    );

    let analysis = state.predictor.get_current();
    let events = state.market.recent_events(3);

    Json(json!({
        "success": true,
        "data": {
            "price": quote,
            "ai_analysis": analysis,
            "recent_events": events,
            "weather": {
                "kayanza": simulate_weather(22..=26, &["Partly Cloudy", "Clear", "Cloudy"]),
            },
            "alerts": [{
                "id": 1,
                "type": "ai_prediction",
                "title": "AI Market Analysis",
                "message": truncate(&analysis, 200),
                "timestamp": Utc::now().to_rfc3339(),
            }],
        },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn get_ai_ask(
    State(state): State<ApiState>,
    Query(params): Query<AskQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let question = params.q.unwrap_or_default();
    if question.trim().is_empty() {
        return Err(AppError::BadRequest("no question provided".to_string()));
    }
    let lang = Language::from_code(params.lang.as_deref().unwrap_or("en"));

    let quote = state.market.next_quote();
    let answer = state.predictor.ask(&quote, question.clone(), lang);

    Ok(Json(json!({
        "success": true,
        "question": question,
        "answer": answer,
        "language": lang.code(),
        "context_used": {
            "current_price": quote.bif_per_kg,
            "trend": quote.market_trend,
        },
    })))
}

async fn get_regions(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let quote = state.market.next_quote();
    let mut rng = rand::thread_rng();

    let regions = vec![
        Region {
            id: 1,
            name: "Kayanza".to_string(),
            coordinates: Coordinates { lat: -2.9217, lng: 29.6297 },
            farmers: 120_000,
            alert_level: if quote.change_24h > 0.0 {
                AlertLevel::Green
            } else {
                AlertLevel::Yellow
            },
            price_bif: quote.bif_per_kg + rng.gen_range(-20..=20),
            weather: WeatherSnapshot {
                temp: rng.gen_range(22..=26),
                humidity: rng.gen_range(60..=75),
                conditions: pick(&mut rng, &["Partly Cloudy", "Clear"]),
            },
        },
        Region {
            id: 2,
            name: "Ngozi".to_string(),
            coordinates: Coordinates { lat: -2.9078, lng: 29.8306 },
            farmers: 98_000,
            alert_level: if quote.change_24h.abs() > 3.0 {
                AlertLevel::Yellow
            } else {
                AlertLevel::Green
            },
            price_bif: quote.bif_per_kg + rng.gen_range(-30..=10),
            weather: WeatherSnapshot {
                temp: rng.gen_range(21..=25),
                humidity: rng.gen_range(60..=75),
                conditions: pick(&mut rng, &["Cloudy", "Light Rain"]),
            },
        },
        Region {
            id: 3,
            name: "Kirundo".to_string(),
            coordinates: Coordinates { lat: -2.5847, lng: 30.0953 },
            farmers: 85_000,
            alert_level: AlertLevel::Green,
            price_bif: quote.bif_per_kg + rng.gen_range(-10..=30),
            weather: WeatherSnapshot {
                temp: rng.gen_range(23..=27),
                humidity: rng.gen_range(60..=75),
                conditions: "Sunny".to_string(),
            },
        },
    ];

    Json(json!({
        "success": true,
        "regions": regions,
        "market_state": state.market.trend(),
    }))
}

async fn get_trends(State(state): State<ApiState>) -> Json<serde_json::Value> {
    match state.analytics.price_series_7d().await {
        Ok(series) => {
            let statistics = compute_stats(&series);
            Json(json!({
                "success": true,
                "prices": series,
                "statistics": statistics,
            }))
        }
        Err(e) => {
            warn!("Trends query failed: {e}");
            Json(json!({
                "success": true,
                "prices": [],
                "statistics": {
                    "average": state.market.base_price(),
                    "trend": "stable",
                },
            }))
        }
    }
}

async fn get_health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let (p50, p95, p99) = state.latency.percentiles();
    Json(json!({
        "status": "healthy",
        "gemini_ai": "configured",
        "elasticsearch": if state.health.analytics_connected() {
            "connected"
        } else {
            "disconnected"
        },
        "market_state": state.market.trend(),
        "events_count": state.market.event_count(),
        "ai_cache_age": state.cache.age().map(|d| d.as_secs_f64()),
        "ai_refresh_in_flight": state.cache.in_flight(),
        "pending_writes": state.health.write_queue_pending(),
        "ai_latency": {
            "p50_ms": p50.map(us_to_ms),
            "p95_ms": p95.map(us_to_ms),
            "p99_ms": p99.map(us_to_ms),
        },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn us_to_ms(us: u64) -> f64 {
    us as f64 / 1000.0
}

fn simulate_weather(
    temp_range: std::ops::RangeInclusive<i64>,
    conditions: &[&str],
) -> WeatherSnapshot {
    let mut rng = rand::thread_rng();
    WeatherSnapshot {
        temp: rng.gen_range(temp_range),
        humidity: rng.gen_range(60..=75),
        conditions: pick(&mut rng, conditions),
    }
}

fn pick(rng: &mut impl Rng, choices: &[&str]) -> String {
    choices[rng.gen_range(0..choices.len())].to_string()
}

/// Char-boundary-safe truncation with an ellipsis, for alert messages.
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_are_untouched() {
        assert_eq!(truncate("hello", 200), "hello");
    }

    #[test]
    fn long_messages_get_an_ellipsis() {
        let long = "a".repeat(250);
        let out = truncate(&long, 200);
        assert_eq!(out.chars().count(), 203);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn truncation_respects_multibyte_chars() {
        let s = "\u{b0}".repeat(10);
        let out = truncate(&s, 5);
        assert_eq!(out.chars().count(), 8);
    }

    #[test]
    fn weather_stays_in_range() {
        for _ in 0..20 {
            let w = simulate_weather(22..=26, &["Clear"]);
            assert!((22..=26).contains(&w.temp));
            assert!((60..=75).contains(&w.humidity));
            assert_eq!(w.conditions, "Clear");
        }
    }
}
