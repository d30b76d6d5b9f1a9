use axum::{
    Router,
    extract::{FromRef, Request, State},
    http::HeaderName,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core authentication services and components.
pub mod auth;
pub mod cache;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod password;
pub mod rate_limit;
pub mod service;
pub mod token;

// Module for routing segregation (Public, Authenticated).
pub mod routes;
use auth::{AuthUser, client_key};
use errors::AuthError;
use rate_limit::RouteClass;
use routes::{authenticated, public};

// --- Public Re-exports ---

// Makes core state types easily accessible to the main application entry point (main.rs).
pub use cache::{CacheState, MemoryCache, RedisCache};
pub use config::AppConfig;
pub use service::{AuthService, AuthServiceState, MemoryUserStore, UserStoreState};

/// ApiDoc
///
/// This struct auto-generates the OpenAPI documentation (Swagger JSON) for the
/// authentication surface. It aggregates all API paths and data schemas decorated
/// with the `#[utoipa::path]` and `#[derive(utoipa::ToSchema)]` macros.
/// The resulting JSON is served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login,
        handlers::refresh,
        handlers::change_password,
        handlers::me
    ),
    components(
        schemas(
            models::LoginRequest,
            models::RefreshRequest,
            models::ChangePasswordRequest,
            models::TokenPairResponse,
            models::ProfileResponse,
        )
    ),
    tags(
        (name = "gov-portal-auth", description = "Authentication & Session API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Implements the **Unified State Pattern**. This is the single, thread-safe, and
/// immutable container holding all essential application services and configuration,
/// shared across all incoming requests. Every component is constructed exactly once
/// at startup and injected here; there are no ambient global clients anywhere in the
/// core.
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator: credentials, tokens, rate limiting, revocation bookkeeping.
    pub auth: AuthServiceState,
    /// Cache Layer: the shared key-value client (Redis in production).
    pub cache: CacheState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// These implementations allow handlers and extractors to selectively pull components
// from the shared AppState. This is critical for dependency injection and keeping
// extractor bounds narrow.

impl FromRef<AppState> for AuthServiceState {
    fn from_ref(app_state: &AppState) -> AuthServiceState {
        app_state.auth.clone()
    }
}

impl FromRef<AppState> for CacheState {
    fn from_ref(app_state: &AppState) -> CacheState {
        app_state.cache.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// A middleware function that enforces authentication for the `authenticated_routes`.
///
/// *Mechanism*: It attempts to extract `AuthUser` from the request. Since `AuthUser`
/// implements `FromRequestParts`, if token verification fails, the extractor
/// immediately rejects the request with a 401 Unauthorized status, preventing
/// execution of the handler. If successful, it allows the request to proceed.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// api_rate_limit_middleware
///
/// Applies the general-API throttle to every authenticated route. This class is
/// non-critical: when the cache backend is down the limiter fails OPEN, so an
/// infrastructure outage degrades throttling rather than taking the API down.
async fn api_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(request.headers());
    let decision = state
        .auth
        .limiter()
        .check_and_consume(&client, RouteClass::Api)
        .await;

    if !decision.allowed {
        return AuthError::RateLimitExceeded {
            retry_after_secs: decision.retry_after_secs,
        }
        .into_response();
    }
    next.run(request).await
}

/// create_router
///
/// Assembles the application's entire routing structure, applies global and scoped
/// middleware, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: health + credential entry points. The credential handlers
        // gate themselves with the fail-closed login/password-reset windows.
        .merge(public::public_routes())
        // Authenticated Routes: Protected by the `auth_middleware` and the
        // general-API throttle (innermost layer runs last).
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    api_rate_limit_middleware,
                ))
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        // Apply the Unified State to all routes.
        .with_state(state);

    // 3. Observability and Correlation Layers (Applied outermost/first)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: Generates a unique UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing: Wraps the entire request/response lifecycle in a
                // tracing span correlated by the generated request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation: Ensures the generated x-request-id header is
                // returned to the client and injected into subsequent service calls.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer (Applied last, allowing all traffic in/out after processing)
        .layer(cors)
}

/// trace_span_logger
///
/// Helper function used by `TraceLayer` to customize the tracing span creation.
/// It extracts the `x-request-id` header (if present) and includes it in the
/// structured logging metadata alongside the HTTP method and URI.
///
/// *Goal*: Ensure every log line for a single request is correlated by a unique ID.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
