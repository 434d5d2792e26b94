// Request metrics module
// This file handles collection and exposition of per-route request metrics:
// the registry, the route template resolver, and the tracking middleware

use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Route templates excluded from measurement unless the caller overrides
/// them. Keeps the scraper's own traffic and the liveness probe out of the
/// numbers.
pub const DEFAULT_SKIP_PATHS: &[&str] = &["/metrics", "/health"];

/// Process-wide request metrics, registered against a private registry.
///
/// Cloning is cheap and every clone observes the same underlying series, so
/// the single instance built in `main` can be handed to the middleware and
/// the exposition handler.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    requests_total: CounterVec,
    request_duration_seconds: HistogramVec,
    request_errors_total: CounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )?;
        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency in seconds",
            ),
            &["method", "path", "status"],
        )?;
        let request_errors_total = CounterVec::new(
            Opts::new(
                "http_request_errors_total",
                "Total HTTP requests that resulted in an error",
            ),
            &["method", "path"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(request_errors_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            request_duration_seconds,
            request_errors_total,
        })
    }

    /// Count one completed request and observe its latency.
    pub fn record_request(&self, method: &str, path: &str, status: &str, elapsed_secs: f64) {
        self.requests_total
            .with_label_values(&[method, path, status])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[method, path, status])
            .observe(elapsed_secs);
    }

    /// Count one failed request. No status label: error events are rare and
    /// do not need the breakdown.
    pub fn record_error(&self, method: &str, path: &str) {
        self.request_errors_total
            .with_label_values(&[method, path])
            .inc();
    }

    /// Render the current registry state in the text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|err| prometheus::Error::Msg(format!("metrics are not valid UTF-8: {err}")))
    }

    /// Content type of [`Metrics::render`] output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Sum of `http_requests_total` across all label combinations.
    pub fn total_requests(&self) -> u64 {
        self.registry
            .gather()
            .iter()
            .find(|family| family.get_name() == "http_requests_total")
            .map(|family| {
                family
                    .get_metric()
                    .iter()
                    .map(|metric| metric.get_counter().get_value())
                    .sum::<f64>() as u64
            })
            .unwrap_or(0)
    }
}

/// Exposition endpoint: the full registry state in the text scrape format.
/// Read-only; every observation recorded before the call is reflected.
pub async fn serve_metrics(State(metrics): State<Metrics>) -> Response {
    match metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, metrics.content_type())], body).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "metrics rendering failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

/// Middleware state: the metric handles plus the set of route templates that
/// bypass measurement.
#[derive(Clone)]
pub struct RequestTracker {
    metrics: Metrics,
    skip_paths: Arc<HashSet<String>>,
}

impl RequestTracker {
    pub fn new<I, S>(metrics: Metrics, skip_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metrics,
            skip_paths: Arc::new(skip_paths.into_iter().map(Into::into).collect()),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Resolve the route template a request matched, e.g. `/groups/:id` for a
/// request to `/groups/42`. Falls back to the raw path when routing matched
/// nothing, so 404s stay visible without exploding label cardinality for
/// real routes.
pub fn resolve_path_template(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned())
}

/// Measure one request: time the downstream chain, classify the outcome, and
/// record into the registry. A panic unwinding out of the chain is recorded
/// as an error and re-raised with its original payload.
pub async fn track_requests(
    State(tracker): State<RequestTracker>,
    request: Request,
    next: Next,
) -> Response {
    let path = resolve_path_template(&request);
    if tracker.skip_paths.contains(path.as_str()) {
        return next.run(request).await;
    }

    let method = request.method().to_string();
    let start = Instant::now();

    let outcome = AssertUnwindSafe(next.run(request)).catch_unwind().await;

    let status = match &outcome {
        Ok(response) => response.status().as_u16().to_string(),
        Err(_) => {
            // A panic leaves no response to read a status from; record the
            // worst case. This is the only exception-driven error increment.
            tracker.metrics.record_error(&method, &path);
            "500".to_string()
        }
    };

    // Runs on every exit path, panicking or not.
    let elapsed = start.elapsed().as_secs_f64();
    tracker.metrics.record_request(&method, &path, &status, elapsed);

    match outcome {
        Ok(response) => {
            // Server-side failure responses count as errors too. The panic
            // branch above cannot have run for this request, so the counter
            // moves at most once.
            if response.status().is_server_error() {
                tracker.metrics.record_error(&method, &path);
            }
            response
        }
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
