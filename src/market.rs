use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use rand::Rng;
use tracing::info;

use crate::types::{EventKind, MarketContext, MarketEvent, PriceQuote, RecordedEvent, Trend};

/// Starting base price in BIF per kg.
const BASE_PRICE_BIF: f64 = 4800.0;

/// BIF/kg to USD/lb conversion divisor.
const BIF_PER_USD_LB: f64 = 1960.0;

/// Per-quote chance of a market event firing.
const EVENT_PROBABILITY: f64 = 0.10;

const EVENT_TABLE: &[(EventKind, i64, &str)] = &[
    (EventKind::Frost, 150, "Brazilian frost detected"),
    (EventKind::Harvest, -80, "Bumper harvest in Vietnam"),
    (EventKind::Demand, 120, "Strong demand from Europe"),
    (EventKind::Weather, 50, "Drought concerns in Colombia"),
    (EventKind::Quality, 30, "Burundi coffee wins quality award"),
];

struct Inner {
    base_price: f64,
    last_price: Option<f64>,
    trend: Trend,
    events: Vec<RecordedEvent>,
}

/// Simulated market owned by the process: a base price nudged by random
/// events and a random walk on every quote. Pure randomness, no invariants —
/// it exists so the dashboard has live-looking data to serve.
pub struct MarketState {
    inner: Mutex<Inner>,
}

impl MarketState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                base_price: BASE_PRICE_BIF,
                last_price: None,
                trend: Trend::Stable,
                events: Vec::new(),
            }),
        }
    }

    /// Produce the next simulated quote, possibly firing a market event.
    pub fn next_quote(&self) -> PriceQuote {
        let mut rng = rand::thread_rng();
        let mut inner = self.lock();

        if rng.gen_bool(EVENT_PROBABILITY) {
            let &(kind, impact, description) = &EVENT_TABLE[rng.gen_range(0..EVENT_TABLE.len())];
            inner.apply_event(MarketEvent {
                kind,
                impact,
                description: description.to_string(),
            });
        }

        let change = rng.gen_range(-30.0..40.0);
        let current = inner.base_price + change;
        let previous = inner.last_price.unwrap_or(current);
        let change_percent = if previous > 0.0 {
            (current - previous) / previous * 100.0
        } else {
            0.0
        };
        inner.last_price = Some(current);
        inner.trend = trend_from_change(change_percent);

        PriceQuote {
            bif_per_kg: current as i64,
            usd_per_lb: round2(current / BIF_PER_USD_LB),
            change_24h: round2(change_percent),
            change_7d: round1(rng.gen_range(-5.0..8.0)),
            last_updated: Utc::now(),
            market_trend: inner.trend,
        }
    }

    /// Last `n` recorded events, oldest first.
    pub fn recent_events(&self, n: usize) -> Vec<RecordedEvent> {
        let inner = self.lock();
        let start = inner.events.len().saturating_sub(n);
        inner.events[start..].to_vec()
    }

    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    pub fn trend(&self) -> Trend {
        self.lock().trend
    }

    pub fn base_price(&self) -> f64 {
        self.lock().base_price
    }

    /// Snapshot for prompt construction. `recent_prices` comes from the
    /// analytics store (newest first) with the base price as fallback.
    pub fn context(&self, recent_prices: Vec<f64>) -> MarketContext {
        let inner = self.lock();
        let current = inner.last_price.unwrap_or(inner.base_price);
        let previous = recent_prices.first().copied().unwrap_or(current);
        let change_24h = if previous > 0.0 {
            round2((current - previous) / previous * 100.0)
        } else {
            0.0
        };
        MarketContext {
            current_price: current,
            change_24h,
            trend: inner.trend,
            recent_prices,
            recent_events: inner
                .events
                .iter()
                .rev()
                .take(3)
                .map(|r| r.event.description.clone())
                .collect(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn force_event(&self, event: MarketEvent) {
        self.lock().apply_event(event);
    }
}

impl Inner {
    fn apply_event(&mut self, event: MarketEvent) {
        self.base_price += event.impact as f64;
        info!(
            "Market event: {} ({:+} BIF)",
            event.description, event.impact
        );
        self.events.push(RecordedEvent {
            event,
            timestamp: Utc::now(),
        });
    }
}

impl Default for MarketState {
    fn default() -> Self {
        Self::new()
    }
}

fn trend_from_change(change_percent: f64) -> Trend {
    if change_percent > 2.0 {
        Trend::Rising
    } else if change_percent < -2.0 {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_stay_near_the_base_price() {
        let market = MarketState::new();
        for _ in 0..50 {
            let quote = market.next_quote();
            let base = market.base_price();
            let price = quote.bif_per_kg as f64;
            assert!(
                price >= base - 31.0 && price <= base + 41.0,
                "price {price} outside walk range of base {base}"
            );
        }
    }

    #[test]
    fn first_quote_has_zero_change() {
        let market = MarketState::new();
        // change_24h compares against the previous quote, which doesn't
        // exist yet, so the first reading is flat by construction.
        let quote = market.next_quote();
        assert_eq!(quote.change_24h, 0.0);
        assert_eq!(quote.market_trend, Trend::Stable);
    }

    #[test]
    fn events_move_the_base_price_and_accumulate() {
        let market = MarketState::new();
        let before = market.base_price();
        market.force_event(MarketEvent {
            kind: EventKind::Frost,
            impact: 150,
            description: "Brazilian frost detected".to_string(),
        });
        assert_eq!(market.base_price(), before + 150.0);
        assert_eq!(market.event_count(), 1);

        let recent = market.recent_events(3);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event.description, "Brazilian frost detected");
    }

    #[test]
    fn recent_events_returns_only_the_tail() {
        let market = MarketState::new();
        for i in 0..5 {
            market.force_event(MarketEvent {
                kind: EventKind::Demand,
                impact: 1,
                description: format!("event {i}"),
            });
        }
        let recent = market.recent_events(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].event.description, "event 2");
        assert_eq!(recent[2].event.description, "event 4");
    }

    #[test]
    fn context_snapshot_carries_history_and_events() {
        let market = MarketState::new();
        market.next_quote();
        market.force_event(MarketEvent {
            kind: EventKind::Quality,
            impact: 30,
            description: "Burundi coffee wins quality award".to_string(),
        });

        let ctx = market.context(vec![4810.0, 4795.0, 4802.0]);
        assert_eq!(ctx.recent_prices.len(), 3);
        assert_eq!(ctx.recent_events.len(), 1);
        assert!(ctx.current_price > 0.0);
    }
}
