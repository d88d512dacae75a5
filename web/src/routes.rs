//! Router configuration.
//!
//! Builds the complete Axum router with all endpoints.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{health, inventory, requests};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;

/// Build the complete Axum router.
///
/// - `/health` and `/metrics` at the root
/// - inventory and request endpoints under `/api`
/// - correlation IDs, request tracing and permissive CORS on every route
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Stock levels (public)
        .route("/inventory", get(inventory::get_inventory))
        // Requests
        .route(
            "/requests",
            post(requests::submit_request).get(requests::list_requests),
        )
        .route("/requests/me", get(requests::my_requests))
        .route("/requests/urgent", get(requests::urgent_requests))
        .route(
            "/requests/:id",
            get(requests::get_request).put(requests::update_status),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
