use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Defines endpoints that are **unauthenticated** and accessible to any client.
/// These are the entry points of the identity flow plus the monitoring probe.
///
/// Security Mandate:
/// The credential handlers in this module are individually gated by the critical
/// (fail-closed) rate-limit windows; they are deliberately NOT behind the general
/// API throttle, whose fail-open policy would be wrong for login traffic.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // A simple, unauthenticated endpoint used for monitoring and load balancer checks.
        // Returns "ok" immediately to verify the service is running and responsive.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/login
        // The credential flow. Consumes one attempt from the login window before any
        // credential material is inspected.
        .route("/auth/login", post(handlers::login))
        // POST /auth/refresh
        // Exchanges a live refresh token for a rotated pair. Stateless except for the
        // session-version check against the cache.
        .route("/auth/refresh", post(handlers::refresh))
}
