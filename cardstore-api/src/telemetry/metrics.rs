//! Prometheus Metrics Definitions
//!
//! All card store metrics live in one dedicated registry and are exposed
//! at `/metrics` in the Prometheus text format.

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};
use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Process-wide metrics, registered on first use.
pub static METRICS: Lazy<ApiResult<CardStoreMetrics>> = Lazy::new(CardStoreMetrics::new);

/// The metrics instance, if registration succeeded.
pub fn metrics() -> Option<&'static CardStoreMetrics> {
    METRICS.as_ref().ok()
}

fn register_err(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

/// Container for all card store metrics.
#[derive(Clone)]
pub struct CardStoreMetrics {
    registry: Registry,

    /// labels: method, endpoint, status
    pub http_requests_total: CounterVec,

    /// labels: method, endpoint
    pub http_request_duration_seconds: HistogramVec,

    /// labels: cache (hit/miss)
    pub batch_requests_total: IntCounterVec,

    /// labels: card_type
    pub cards_created_total: IntCounterVec,

    pub retrieve_cache_hits_total: IntCounter,
    pub retrieve_cache_misses_total: IntCounter,
    pub retrieve_degraded_total: IntCounter,

    /// labels: workflow_type
    pub usage_events_total: IntCounterVec,
}

impl CardStoreMetrics {
    /// Create and register all metrics in a fresh registry.
    pub fn new() -> ApiResult<Self> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("cardstore_http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )
        .map_err(|e| register_err("http_requests_total", e))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "cardstore_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(HTTP_LATENCY_BUCKETS.to_vec()),
            &["method", "endpoint"],
        )
        .map_err(|e| register_err("http_request_duration_seconds", e))?;

        let batch_requests_total = IntCounterVec::new(
            Opts::new(
                "cardstore_batch_requests_total",
                "Batch create requests by idempotency cache outcome",
            ),
            &["cache"],
        )
        .map_err(|e| register_err("batch_requests_total", e))?;

        let cards_created_total = IntCounterVec::new(
            Opts::new("cardstore_cards_created_total", "Cards created"),
            &["card_type"],
        )
        .map_err(|e| register_err("cards_created_total", e))?;

        let retrieve_cache_hits_total = IntCounter::new(
            "cardstore_retrieve_cache_hits_total",
            "Card lookups served from the cache",
        )
        .map_err(|e| register_err("retrieve_cache_hits_total", e))?;

        let retrieve_cache_misses_total = IntCounter::new(
            "cardstore_retrieve_cache_misses_total",
            "Card lookups that went to the store",
        )
        .map_err(|e| register_err("retrieve_cache_misses_total", e))?;

        let retrieve_degraded_total = IntCounter::new(
            "cardstore_retrieve_degraded_total",
            "Retrievals answered from cache only after a store failure",
        )
        .map_err(|e| register_err("retrieve_degraded_total", e))?;

        let usage_events_total = IntCounterVec::new(
            Opts::new("cardstore_usage_events_total", "Distinct card usage events recorded"),
            &["workflow_type"],
        )
        .map_err(|e| register_err("usage_events_total", e))?;

        registry
            .register(Box::new(http_requests_total.clone()))
            .map_err(|e| register_err("http_requests_total", e))?;
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .map_err(|e| register_err("http_request_duration_seconds", e))?;
        registry
            .register(Box::new(batch_requests_total.clone()))
            .map_err(|e| register_err("batch_requests_total", e))?;
        registry
            .register(Box::new(cards_created_total.clone()))
            .map_err(|e| register_err("cards_created_total", e))?;
        registry
            .register(Box::new(retrieve_cache_hits_total.clone()))
            .map_err(|e| register_err("retrieve_cache_hits_total", e))?;
        registry
            .register(Box::new(retrieve_cache_misses_total.clone()))
            .map_err(|e| register_err("retrieve_cache_misses_total", e))?;
        registry
            .register(Box::new(retrieve_degraded_total.clone()))
            .map_err(|e| register_err("retrieve_degraded_total", e))?;
        registry
            .register(Box::new(usage_events_total.clone()))
            .map_err(|e| register_err("usage_events_total", e))?;

        #[cfg(target_os = "linux")]
        registry
            .register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))
            .map_err(|e| register_err("process_collector", e))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            batch_requests_total,
            cards_created_total,
            retrieve_cache_hits_total,
            retrieve_cache_misses_total,
            retrieve_degraded_total,
            usage_events_total,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, endpoint: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, endpoint, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration_secs);
    }

    pub fn record_batch(&self, from_cache: bool, created: &[cardstore_core::Card]) {
        let cache = if from_cache { "hit" } else { "miss" };
        self.batch_requests_total.with_label_values(&[cache]).inc();
        if !from_cache {
            for card in created {
                self.cards_created_total
                    .with_label_values(&[card.card_type.as_str()])
                    .inc();
            }
        }
    }

    pub fn record_retrieval(&self, hits: usize, misses: usize, degraded: bool) {
        self.retrieve_cache_hits_total.inc_by(hits as u64);
        self.retrieve_cache_misses_total.inc_by(misses as u64);
        if degraded {
            self.retrieve_degraded_total.inc();
        }
    }

    pub fn record_usage_event(&self, workflow_type: &str) {
        self.usage_events_total.with_label_values(&[workflow_type]).inc();
    }

    /// Encode every registered metric in the text exposition format.
    pub fn encode(&self) -> ApiResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| ApiError::internal_error(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| ApiError::internal_error(format!("Metrics are not UTF-8: {}", e)))
    }
}

/// Handler for GET /metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoded = match METRICS.as_ref() {
        Ok(metrics) => metrics.encode(),
        Err(e) => Err(e.clone()),
    };
    match encoded {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardstore_core::CardType;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_fresh_registries_do_not_collide() {
        assert!(CardStoreMetrics::new().is_ok());
        assert!(CardStoreMetrics::new().is_ok());
    }

    #[test]
    fn test_record_and_encode() {
        let metrics = CardStoreMetrics::new().unwrap();
        let tenant = Uuid::new_v4();
        let card = cardstore_core::CardCreate::new(tenant, CardType::Voice, json!({"tone": "dry"}), "t")
            .into_card(chrono::Utc::now());

        metrics.record_batch(false, &[card]);
        metrics.record_batch(true, &[]);
        metrics.record_retrieval(2, 1, true);
        metrics.record_usage_event("newsletter");
        metrics.record_http_request("POST", "/api/v1/cards/batch", 201, 0.01);

        let text = metrics.encode().unwrap();
        assert!(text.contains("cardstore_batch_requests_total{cache=\"hit\"} 1"));
        assert!(text.contains("cardstore_cards_created_total{card_type=\"voice\"} 1"));
        assert!(text.contains("cardstore_retrieve_cache_hits_total 2"));
        assert!(text.contains("cardstore_retrieve_degraded_total 1"));
        assert!(text.contains("cardstore_usage_events_total{workflow_type=\"newsletter\"} 1"));
    }
}
