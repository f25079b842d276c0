//! HTTP request tracking middleware for observability

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use std::time::Instant;

/// Middleware to track HTTP request latency and counts
pub async fn track_metrics(req: Request, next: Next) -> Result<Response, StatusCode> {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    // Normalize path to avoid high cardinality (group dynamic IDs)
    let normalized_path = normalize_path(&path);

    crate::metrics::HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &normalized_path, &status])
        .observe(duration);

    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &normalized_path, &status])
        .inc();

    Ok(response)
}

/// Normalize path to prevent metric cardinality explosion
/// /api/questionnaire/act-123 -> /api/questionnaire/{id}
fn normalize_path(path: &str) -> String {
    // Path shapes with a dynamic tail segment
    const DYNAMIC_TAILS: &[&str] = &[
        "/api/questionnaire/",
        "/api/rules/",
    ];

    for prefix in DYNAMIC_TAILS {
        if let Some(rest) = path.strip_prefix(prefix) {
            if !rest.is_empty() && !rest.contains('/') {
                return format!("{prefix}{{id}}");
            }
        }
    }

    // Lifecycle routes: /api/lifecycle/{kind}/{key}/soft-delete|restore
    if let Some(rest) = path.strip_prefix("/api/lifecycle/") {
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() == 3 {
            return format!("/api/lifecycle/{}/{{key}}/{}", parts[0], parts[2]);
        }
    }

    path.to_string()
}
