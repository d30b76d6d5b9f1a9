use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Defines endpoints that require a verified bearer access token. The token check
/// itself is applied as a route layer in `create_router`; handlers additionally
/// receive the resolved `AuthUser` identity as an extractor argument.
///
/// These routes also sit behind the general-API rate-limit layer (fail-open).
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        // GET /auth/me
        // Echoes the identity claims resolved from the access token.
        .route("/auth/me", get(handlers::me))
        // POST /auth/change-password
        // Rotates the credential and revokes all outstanding refresh tokens for the
        // subject. Additionally gated by the password-reset window inside the handler.
        .route("/auth/change-password", post(handlers::change_password))
}
