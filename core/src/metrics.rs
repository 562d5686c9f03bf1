use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters for the three things worth watching from outside the process:
/// pipeline outcomes, refresh-token rotation/reuse, and balance exhaustion.
/// Deliberately not a dashboard or aggregation query —
/// those are out of scope — just the counters a `/metrics` scrape exposes.
#[derive(Clone)]
pub struct CoreMetrics {
    registry: Registry,
    pipeline_requests: IntCounterVec,
    refresh_token_rotations: IntCounterVec,
    refresh_token_reuse_detected: IntCounterVec,
    balance_exceeded: IntCounterVec,
}

impl CoreMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let pipeline_requests = IntCounterVec::new(
            Opts::new(
                "pipeline_requests_total",
                "Requests processed by the request-context pipeline, by outcome",
            ),
            &["outcome"],
        )?;
        let refresh_token_rotations = IntCounterVec::new(
            Opts::new(
                "refresh_token_rotations_total",
                "Successful refresh token rotations",
            ),
            &["actor_type"],
        )?;
        let refresh_token_reuse_detected = IntCounterVec::new(
            Opts::new(
                "refresh_token_reuse_detected_total",
                "Refresh token reuse detections, which revoke the whole family",
            ),
            &["actor_type"],
        )?;
        let balance_exceeded = IntCounterVec::new(
            Opts::new(
                "balance_exceeded_total",
                "Company-balance gate rejections, by balance type",
            ),
            &["balance_type"],
        )?;

        registry.register(Box::new(pipeline_requests.clone()))?;
        registry.register(Box::new(refresh_token_rotations.clone()))?;
        registry.register(Box::new(refresh_token_reuse_detected.clone()))?;
        registry.register(Box::new(balance_exceeded.clone()))?;

        Ok(Self {
            registry,
            pipeline_requests,
            refresh_token_rotations,
            refresh_token_reuse_detected,
            balance_exceeded,
        })
    }

    pub fn record_pipeline_outcome(&self, outcome: &str) {
        self.pipeline_requests.with_label_values(&[outcome]).inc();
    }

    pub fn record_refresh_rotation(&self, actor_type: &str) {
        self.refresh_token_rotations
            .with_label_values(&[actor_type])
            .inc();
    }

    pub fn record_refresh_reuse_detected(&self, actor_type: &str) {
        self.refresh_token_reuse_detected
            .with_label_values(&[actor_type])
            .inc();
    }

    pub fn record_balance_exceeded(&self, balance_type: &str) {
        self.balance_exceeded.with_label_values(&[balance_type]).inc();
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
