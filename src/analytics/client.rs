use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::config::{Config, ANALYTICS_TIMEOUT_SECS, PRICES_INDEX};
use crate::error::{AppError, Result};

/// Client for the Elasticsearch-compatible analytics store. Everything here
/// is best-effort from the caller's point of view: the store may be down or
/// slow, so requests carry a short timeout and callers supply fallbacks.
pub struct AnalyticsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PricePoint {
    pub timestamp: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendStats {
    pub average: f64,
    pub max: f64,
    pub min: f64,
    pub volatility: f64,
    pub data_points: usize,
    pub trend: &'static str,
}

impl AnalyticsClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(ANALYTICS_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.elastic_endpoint.trim_end_matches('/').to_string(),
            api_key: cfg.elastic_api_key.clone(),
        })
    }

    /// Connectivity probe for startup and the health endpoint.
    pub async fn ping(&self) -> bool {
        match self.request(reqwest::Method::GET, "").send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Analytics ping failed: {e}");
                false
            }
        }
    }

    /// Index one document. Non-2xx responses are errors so the writer can
    /// log them, but nothing upstream ever retries.
    pub async fn index(&self, index: &str, doc: &serde_json::Value) -> Result<()> {
        let path = format!("{index}/_doc");
        let resp = self
            .request(reqwest::Method::POST, &path)
            .json(doc)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Analytics(format!(
                "index into {index} returned {status}: {body}"
            )));
        }
        Ok(())
    }

    /// Last week's prices, newest first, capped at `size`.
    pub async fn recent_prices(&self, size: usize) -> Result<Vec<f64>> {
        let query = json!({
            "query": {"range": {"timestamp": {"gte": "now-7d/d"}}},
            "sort": [{"timestamp": {"order": "desc"}}],
            "size": size
        });
        let body = self.search(PRICES_INDEX, &query).await?;
        Ok(parse_price_values(&body))
    }

    /// Last week's price series, oldest first, for the trends endpoint.
    pub async fn price_series_7d(&self) -> Result<Vec<PricePoint>> {
        let query = json!({
            "query": {"range": {"timestamp": {"gte": "now-7d/d"}}},
            "sort": [{"timestamp": {"order": "asc"}}],
            "size": 100
        });
        let body = self.search(PRICES_INDEX, &query).await?;
        Ok(parse_price_series(&body))
    }

    async fn search(&self, index: &str, query: &serde_json::Value) -> Result<serde_json::Value> {
        let path = format!("{index}/_search");
        let resp = self
            .request(reqwest::Method::POST, &path)
            .json(query)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Analytics(format!(
                "search on {index} returned {status}: {body}"
            )));
        }
        Ok(resp.json().await?)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self.client.request(method, &url);
        if self.api_key.is_empty() {
            builder
        } else {
            builder.header("Authorization", format!("ApiKey {}", self.api_key))
        }
    }
}

fn hits(body: &serde_json::Value) -> &[serde_json::Value] {
    body.get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(|h| h.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn parse_price_values(body: &serde_json::Value) -> Vec<f64> {
    hits(body)
        .iter()
        .filter_map(|hit| hit.get("_source")?.get("price_bif")?.as_f64())
        .collect()
}

fn parse_price_series(body: &serde_json::Value) -> Vec<PricePoint> {
    hits(body)
        .iter()
        .filter_map(|hit| {
            let source = hit.get("_source")?;
            Some(PricePoint {
                timestamp: source.get("timestamp")?.as_str()?.to_string(),
                price: source.get("price_bif")?.as_f64()?,
            })
        })
        .collect()
}

/// Summary statistics over an ascending price series.
pub fn compute_stats(series: &[PricePoint]) -> TrendStats {
    if series.is_empty() {
        return TrendStats {
            average: 0.0,
            max: 0.0,
            min: 0.0,
            volatility: 0.0,
            data_points: 0,
            trend: "stable",
        };
    }
    let prices: Vec<f64> = series.iter().map(|p| p.price).collect();
    let sum: f64 = prices.iter().sum();
    let max = prices.iter().cloned().fold(f64::MIN, f64::max);
    let min = prices.iter().cloned().fold(f64::MAX, f64::min);
    let trend = if prices[prices.len() - 1] > prices[0] {
        "rising"
    } else {
        "stable"
    };
    TrendStats {
        average: sum / prices.len() as f64,
        max,
        min,
        volatility: max - min,
        data_points: prices.len(),
        trend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_body() -> serde_json::Value {
        json!({
            "took": 3,
            "hits": {
                "total": {"value": 3},
                "hits": [
                    {"_source": {"timestamp": "2026-08-27T10:00:00Z", "price_bif": 4790.0, "change_percent": -0.2}},
                    {"_source": {"timestamp": "2026-08-28T10:00:00Z", "price_bif": 4810.0, "change_percent": 0.4}},
                    {"_source": {"timestamp": "2026-08-29T10:00:00Z", "price_bif": 4835.0, "change_percent": 0.5}}
                ]
            }
        })
    }

    #[test]
    fn parses_price_values_from_hits() {
        let prices = parse_price_values(&search_body());
        assert_eq!(prices, vec![4790.0, 4810.0, 4835.0]);
    }

    #[test]
    fn malformed_body_parses_to_empty() {
        assert!(parse_price_values(&json!({"error": "index_not_found"})).is_empty());
        assert!(parse_price_series(&json!("not an object")).is_empty());
    }

    #[test]
    fn parses_series_and_skips_incomplete_hits() {
        let mut body = search_body();
        body["hits"]["hits"]
            .as_array_mut()
            .unwrap()
            .push(json!({"_source": {"timestamp": "2026-08-29T11:00:00Z"}}));
        let series = parse_price_series(&body);
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].timestamp, "2026-08-27T10:00:00Z");
    }

    #[test]
    fn stats_over_ascending_series() {
        let series = parse_price_series(&search_body());
        let stats = compute_stats(&series);
        assert_eq!(stats.data_points, 3);
        assert_eq!(stats.max, 4835.0);
        assert_eq!(stats.min, 4790.0);
        assert_eq!(stats.volatility, 45.0);
        assert_eq!(stats.trend, "rising");
        assert!((stats.average - 4811.666).abs() < 0.01);
    }

    #[test]
    fn stats_over_empty_series() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.data_points, 0);
        assert_eq!(stats.trend, "stable");
    }
}
