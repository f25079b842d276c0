//! Router configuration - centralized route definitions
//!
//! Routes are organized by domain and split into public (no auth) and
//! protected (auth required) sets. The auth middleware and rate limiter are
//! applied by the caller in `main`.

use axum::{
    routing::{delete, get, post},
    Router,
};

use super::state::AppState;
use super::{health, lifecycle, questionnaire, resolve, rules};

/// Build the public routes (no authentication required)
///
/// These must always be accessible for health checks (Kubernetes probes)
/// and metrics (Prometheus scraping).
pub fn build_public_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // HEALTH & KUBERNETES PROBES
        // =================================================================
        .route("/health", get(health::health))
        .route("/health/live", get(health::health_live))
        .route("/health/ready", get(health::health_ready))
        // =================================================================
        // METRICS (PROMETHEUS)
        // =================================================================
        .route("/metrics", get(health::metrics_endpoint))
        .with_state(state)
}

/// Build the protected API routes (authentication required)
pub fn build_protected_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // RULE RESOLUTION
        // =================================================================
        .route("/api/resolve", post(resolve::resolve_action))
        // =================================================================
        // QUESTIONNAIRES
        // =================================================================
        .route(
            "/api/questionnaire/{action_id}",
            get(questionnaire::get_questionnaire),
        )
        .route("/api/questionnaire", post(questionnaire::save_questionnaire))
        .route(
            "/api/questionnaire/{action_id}",
            delete(questionnaire::delete_questionnaire),
        )
        // =================================================================
        // FLOW RULES (AUTHORING / LISTING)
        // =================================================================
        .route("/api/rules/{flow}", get(rules::list_rules))
        .route("/api/rules", post(rules::upsert_rule))
        // =================================================================
        // LIFECYCLE
        // =================================================================
        .route(
            "/api/lifecycle/{kind}/{key}/soft-delete",
            post(lifecycle::soft_delete),
        )
        .route(
            "/api/lifecycle/{kind}/{key}/restore",
            post(lifecycle::restore),
        )
        // =================================================================
        // ADMIN
        // =================================================================
        .route("/api/snapshot/rebuild", post(health::snapshot_rebuild))
        .with_state(state)
}
