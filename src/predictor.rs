use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ai::GeminiClient;
use crate::analytics::{AnalyticsClient, IndexRequest};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::cache::{PredictionCache, RefreshOutcome};
use crate::config::{PREDICTIONS_INDEX, PREDICTION_STALENESS_SECS, PRICE_HISTORY_SIZE, QUERIES_INDEX};
use crate::market::MarketState;
use crate::runner::JobHandle;
use crate::types::{Language, MarketContext, PriceQuote};

/// Wires the prediction cache to the AI service, market state and analytics
/// store. Injected into request handlers via axum state — request threads
/// only ever touch the cache; every slow call runs on the job runner.
#[derive(Clone)]
pub struct Predictor {
    cache: Arc<PredictionCache>,
    jobs: JobHandle,
    ai: Arc<GeminiClient>,
    analytics: Arc<AnalyticsClient>,
    market: Arc<MarketState>,
    writer_tx: mpsc::Sender<IndexRequest>,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
}

impl Predictor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<PredictionCache>,
        jobs: JobHandle,
        ai: Arc<GeminiClient>,
        analytics: Arc<AnalyticsClient>,
        market: Arc<MarketState>,
        writer_tx: mpsc::Sender<IndexRequest>,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
    ) -> Self {
        Self { cache, jobs, ai, analytics, market, writer_tx, health, latency }
    }

    pub fn cache(&self) -> &PredictionCache {
        &self.cache
    }

    /// Serve the current market prediction. Always returns immediately with
    /// the cached payload (or the fixed fallback); when the cache is stale
    /// and no refresh is running, exactly one background job is started.
    pub fn get_current(&self) -> String {
        let read = self
            .cache
            .read(Duration::from_secs(PREDICTION_STALENESS_SECS));
        if read.needs_refresh && self.cache.try_begin_refresh() {
            self.spawn_refresh();
        }
        read.payload
    }

    /// Answer a farmer's question. Price and weather questions get an
    /// immediate canned answer; everything else gets a quick contextual
    /// reply while a full Gemini answer is generated (and logged to the
    /// analytics store) in the background.
    pub fn ask(&self, quote: &PriceQuote, question: String, lang: Language) -> String {
        if let Some(answer) = quick_answer(&question, lang, quote) {
            return answer;
        }
        self.spawn_ask(quote.clone(), question, lang);
        generic_answer(lang, quote)
    }

    /// Submit a document write to the index writer. Fire and forget: a full
    /// queue drops the document with a warning.
    pub fn submit_index(&self, index: &'static str, doc: serde_json::Value) {
        self.health.inc_write_queue_pending();
        if self.writer_tx.try_send(IndexRequest { index, doc }).is_err() {
            self.health.dec_write_queue_pending();
            warn!("Index writer channel full; dropping {index} document");
        }
    }

    /// Run one refresh job on the runner. Caller must already hold the
    /// in-flight slot via `try_begin_refresh`.
    fn spawn_refresh(&self) {
        let this = self.clone();
        self.jobs.submit(async move {
            let guard = CompletionGuard::new(Arc::clone(&this.cache), Arc::clone(&this.health));

            // Snapshot taken once at job start; never re-read mid-job.
            let history = match this.analytics.recent_prices(PRICE_HISTORY_SIZE).await {
                Ok(prices) if !prices.is_empty() => prices,
                Ok(_) => vec![this.market.base_price()],
                Err(e) => {
                    debug!("Price history unavailable, using base price: {e}");
                    vec![this.market.base_price()]
                }
            };
            let ctx = this.market.context(history);
            let prompt = prediction_prompt(&ctx);

            let started = Instant::now();
            match this.ai.generate(&prompt).await {
                Ok(text) => {
                    this.latency.record(started.elapsed());
                    this.submit_index(
                        PREDICTIONS_INDEX,
                        json!({
                            "timestamp": Utc::now().to_rfc3339(),
                            "prediction": text,
                            "base_price": ctx.current_price,
                        }),
                    );
                    guard.finish(RefreshOutcome::Generated(text));
                }
                Err(e) => {
                    warn!("AI generation failed: {e}");
                    guard.finish(RefreshOutcome::Failed);
                }
            }
        });
    }

    fn spawn_ask(&self, quote: PriceQuote, question: String, lang: Language) {
        let this = self.clone();
        self.jobs.submit(async move {
            let prompt = ask_prompt(&quote, &question, lang);
            let started = Instant::now();
            match this.ai.generate(&prompt).await {
                Ok(answer) => {
                    this.latency.record(started.elapsed());
                    this.submit_index(
                        QUERIES_INDEX,
                        json!({
                            "timestamp": Utc::now().to_rfc3339(),
                            "question": question,
                            "answer": answer,
                            "language": lang.code(),
                            "price_at_query": quote.bif_per_kg,
                        }),
                    );
                }
                Err(e) => warn!("AI ask failed: {e}"),
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Completion guard
// ---------------------------------------------------------------------------

/// Guarantees `PredictionCache::complete` runs exactly once per refresh job.
/// `finish` consumes the guard on the normal paths; if the job unwinds
/// before finishing, Drop caches the fallback so `in_flight` is never left
/// set.
pub(crate) struct CompletionGuard {
    cache: Arc<PredictionCache>,
    health: Arc<HealthState>,
    done: bool,
}

impl CompletionGuard {
    pub(crate) fn new(cache: Arc<PredictionCache>, health: Arc<HealthState>) -> Self {
        Self { cache, health, done: false }
    }

    pub(crate) fn finish(mut self, outcome: RefreshOutcome) {
        self.done = true;
        self.complete(outcome);
    }

    fn complete(&self, outcome: RefreshOutcome) {
        self.cache.complete(outcome);
        self.health.set_last_refresh_at_ns(now_ns());
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if !self.done {
            self.complete(RefreshOutcome::Failed);
        }
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

fn prediction_prompt(ctx: &MarketContext) -> String {
    let shown = &ctx.recent_prices[..ctx.recent_prices.len().min(5)];
    let price_trend = match (ctx.recent_prices.first(), ctx.recent_prices.last()) {
        (Some(newest), Some(oldest)) if ctx.recent_prices.len() > 1 && newest > oldest => "Rising",
        _ => "Stable",
    };
    let events_text = if ctx.recent_events.is_empty() {
        "No major events".to_string()
    } else {
        ctx.recent_events
            .iter()
            .map(|e| format!("- {e}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are AgriPulse AI for Burundian coffee farmers.

CURRENT DATA:
- Price: {price:.0} BIF/kg
- Recent prices: {shown:?}
- Trend: {price_trend}

EVENTS:
{events_text}

Respond in JSON format:
{{
    "prediction": "Brief prediction in Kirundi (1-2 sentences)",
    "confidence": "high/medium/low",
    "recommendation": "sell now / hold / wait",
    "predicted_change": "percentage as float",
    "reasoning": "Brief reasoning in English"
}}"#,
        price = ctx.current_price,
    )
}

fn ask_prompt(quote: &PriceQuote, question: &str, lang: Language) -> String {
    format!(
        r#"{directive}

You are AgriPulse AI helping Burundian coffee farmers.

CURRENT CONTEXT:
- Coffee price: {price} BIF/kg
- Change today: {change}%
- Market trend: {trend}

Farmer's question: {question}

Provide helpful, data-driven answer in 2-3 sentences."#,
        directive = lang.directive(),
        price = quote.bif_per_kg,
        change = quote.change_24h,
        trend = quote.market_trend,
    )
}

// ---------------------------------------------------------------------------
// Canned answers
// ---------------------------------------------------------------------------

/// Immediate answer for common question shapes, per language. Returns None
/// when the question needs a real AI response.
fn quick_answer(question: &str, lang: Language, quote: &PriceQuote) -> Option<String> {
    let q = question.to_lowercase();
    match lang {
        Language::Kirundi => {
            if q.contains("igiciro") || q.contains("price") {
                Some(format!(
                    "Igiciro cy'ikawa ubu ni {} BIF ku kilo. Guhinduka {:+.1}%.",
                    quote.bif_per_kg, quote.change_24h
                ))
            } else if q.contains("ikirere") || q.contains("weather") {
                Some("Ikirere cyiza cyiteganywa mu minsi 3 bizaza. Ubushyuhe bwa 24\u{b0}C.".to_string())
            } else {
                None
            }
        }
        _ => {
            if q.contains("price") {
                Some(format!(
                    "Current coffee price is {} BIF per kg, change: {:+.1}%.",
                    quote.bif_per_kg, quote.change_24h
                ))
            } else if q.contains("weather") {
                Some(
                    "Weather conditions are favorable for the next 3 days. Temperature around 24\u{b0}C."
                        .to_string(),
                )
            } else {
                None
            }
        }
    }
}

/// Quick reply returned while the full AI answer is generated in the
/// background.
fn generic_answer(lang: Language, quote: &PriceQuote) -> String {
    match lang {
        Language::Kirundi => format!(
            "Igiciro cy'ikawa ni {} BIF. Komeza gukurikirana amakuru.",
            quote.bif_per_kg
        ),
        _ => format!(
            "Coffee price is {} BIF per kg. Market is {}.",
            quote.bif_per_kg, quote.market_trend
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
