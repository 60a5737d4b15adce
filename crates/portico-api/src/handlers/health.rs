//! Health check and metrics handlers
//!
//! Author: hephaex@gmail.com

use crate::state::{AppState, EndpointMetrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use utoipa::ToSchema;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub name: String,
}

/// Liveness probe - basic health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
    })
}

/// Readiness response
#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
}

#[derive(Serialize, ToSchema)]
pub struct ReadinessChecks {
    pub database: bool,
}

/// Readiness probe - checks the account store
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Service not ready", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match state.accounts.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            false
        }
    };

    let ready = state.is_ready() && database;
    let response = ReadinessResponse {
        ready,
        checks: ReadinessChecks { database },
    };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Prometheus-compatible metrics endpoint
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "health",
    responses(
        (status = 200, description = "Metrics in Prometheus text format", content_type = "text/plain")
    )
)]
pub async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut output = String::new();

    push_metric(
        &mut output,
        "portico_uptime_seconds",
        "Time since server start",
        "gauge",
    );
    let _ = writeln!(output, "portico_uptime_seconds {}\n", state.uptime_secs());

    push_metric(
        &mut output,
        "portico_requests_total",
        "Total number of HTTP requests",
        "counter",
    );
    let _ = writeln!(
        output,
        "portico_requests_total {}\n",
        state.get_request_count()
    );

    push_metric(
        &mut output,
        "portico_build_info",
        "Build information",
        "gauge",
    );
    let _ = writeln!(
        output,
        "portico_build_info{{version=\"{}\"}} 1\n",
        env!("CARGO_PKG_VERSION")
    );

    let metrics = state.metrics.read().await;
    let mut endpoints: Vec<_> = metrics.iter().collect();
    endpoints.sort_by(|a, b| a.0.cmp(b.0));

    push_metric(
        &mut output,
        "portico_http_requests_total",
        "HTTP requests by endpoint and status",
        "counter",
    );
    for (endpoint, endpoint_metrics) in &endpoints {
        let mut statuses: Vec<_> = endpoint_metrics.status_counts.iter().collect();
        statuses.sort();
        for (status, count) in statuses {
            let _ = writeln!(
                output,
                "portico_http_requests_total{{endpoint=\"{endpoint}\",status=\"{status}\"}} {count}"
            );
        }
    }
    output.push('\n');

    push_metric(
        &mut output,
        "portico_http_request_duration_seconds",
        "HTTP request latency",
        "histogram",
    );
    for (endpoint, endpoint_metrics) in &endpoints {
        if endpoint_metrics.latency_count == 0 {
            continue;
        }

        let buckets = &endpoint_metrics.latency_buckets;
        let mut cumulative = 0u64;
        for (le, count) in [
            ("0.01", buckets.under_10ms),
            ("0.05", buckets.ms_10_50),
            ("0.1", buckets.ms_50_100),
            ("0.5", buckets.ms_100_500),
            ("1.0", buckets.ms_500_1000),
            ("+Inf", buckets.over_1s),
        ] {
            cumulative += count;
            let _ = writeln!(
                output,
                "portico_http_request_duration_seconds_bucket{{endpoint=\"{endpoint}\",le=\"{le}\"}} {cumulative}"
            );
        }

        let _ = writeln!(
            output,
            "portico_http_request_duration_seconds_sum{{endpoint=\"{endpoint}\"}} {:.6}",
            endpoint_metrics.total_latency_us as f64 / 1_000_000.0
        );
        let _ = writeln!(
            output,
            "portico_http_request_duration_seconds_count{{endpoint=\"{endpoint}\"}} {}",
            endpoint_metrics.latency_count
        );
    }
    output.push('\n');

    push_metric(
        &mut output,
        "portico_http_request_duration_seconds_summary",
        "HTTP request latency summary",
        "summary",
    );
    for (endpoint, endpoint_metrics) in &endpoints {
        if endpoint_metrics.latency_count == 0 {
            continue;
        }
        for quantile in [0.5, 0.9, 0.99] {
            let _ = writeln!(
                output,
                "portico_http_request_duration_seconds_summary{{endpoint=\"{endpoint}\",quantile=\"{quantile}\"}} {:.6}",
                approximate_quantile(endpoint_metrics, quantile)
            );
        }
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        output,
    )
}

fn push_metric(output: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {kind}");
}

/// Approximate a latency quantile in seconds from the histogram buckets
///
/// Returns the midpoint of the first bucket whose cumulative count reaches
/// the quantile rank.
fn approximate_quantile(metrics: &EndpointMetrics, quantile: f64) -> f64 {
    let rank = (metrics.latency_count as f64 * quantile).ceil() as u64;
    let buckets = &metrics.latency_buckets;

    let mut cumulative = 0u64;
    for (midpoint, count) in [
        (0.005, buckets.under_10ms),
        (0.03, buckets.ms_10_50),
        (0.075, buckets.ms_50_100),
        (0.3, buckets.ms_100_500),
        (0.75, buckets.ms_500_1000),
    ] {
        cumulative += count;
        if cumulative >= rank {
            return midpoint;
        }
    }
    1.5
}
