//! Metrics tracking middleware
//!
//! Tracks request latency, counts, and status codes for Prometheus metrics
//!
//! Author: hephaex@gmail.com

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

/// Path prefixes followed by `{uidb64}/{token}` link segments
const LINK_PREFIXES: [&str; 2] = ["activate-account", "reset-password"];

/// Metrics tracking middleware
///
/// Records per-endpoint request count, latency distribution and response
/// status codes.
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let endpoint = normalize_endpoint(request.uri().path());

    let response = next.run(request).await;

    let latency_us = start.elapsed().as_micros() as u64;
    let status = response.status().as_u16();

    // Record off the response path
    tokio::spawn(async move {
        state.record_request(endpoint, status, latency_us).await;
    });

    response
}

/// Normalize endpoint paths for consistent metrics
///
/// Numeric IDs and UUIDs become `:id`; the two segments after an
/// activation or reset prefix become `:uidb64/:token`, so neither link
/// secrets nor per-account paths reach the metrics labels.
fn normalize_endpoint(path: &str) -> String {
    let mut normalized = Vec::new();
    let mut link_segments = 0;

    for seg in path.split('/') {
        if link_segments > 0 && !seg.is_empty() {
            normalized.push(if link_segments == 2 { ":uidb64" } else { ":token" }.to_string());
            link_segments -= 1;
            continue;
        }

        if LINK_PREFIXES.contains(&seg) {
            link_segments = 2;
            normalized.push(seg.to_string());
        } else if is_uuid(seg) || is_numeric(seg) {
            normalized.push(":id".to_string());
        } else {
            normalized.push(seg.to_string());
        }
    }

    normalized.join("/")
}

/// Check if a string looks like a UUID
fn is_uuid(s: &str) -> bool {
    s.len() == 36
        && s.chars().enumerate().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

/// Check if a string is numeric (likely an ID)
fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
