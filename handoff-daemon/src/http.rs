use std::future::ready;

use axum::routing::get;
use axum::Router;
use handoff_core::health::HealthRegistry;
use metrics_exporter_prometheus::PrometheusHandle;

/// The thin health/metrics HTTP surface spec.md §1 keeps in scope
/// (ambient observability is not part of the excluded CRUD façade).
/// Modeled on the reference codebase's janitor binary `app()` function.
pub fn app(liveness: HealthRegistry, readiness: HealthRegistry, metrics: PrometheusHandle) -> Router {
    Router::new()
        .route("/", get(|| ready("handoff-daemon")))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/_readiness", get(move || ready(readiness.get_status())))
        .route("/metrics", get(move || ready(metrics.render())))
}
