use crate::{
    AppState,
    auth::{AuthUser, client_key},
    errors::AuthError,
    models::{
        ChangePasswordRequest, LoginRequest, ProfileResponse, RefreshRequest, TokenPairResponse,
    },
    rate_limit::RouteClass,
    token::TokenPair,
};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};

impl AppState {
    fn pair_response(&self, pair: TokenPair) -> TokenPairResponse {
        TokenPairResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in_secs: self.auth.tokens().access_ttl_secs(),
        }
    }
}

/// login
///
/// [Public Route] The credential flow: rate-limit gate, user lookup, password
/// verification, token-pair issuance.
///
/// *Security*: Every failure inside the credential check collapses to the same
/// generic 401; only rate-limit exhaustion is distinguishable (429 + Retry-After),
/// since the throttle is not a security-sensitive distinction.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPairResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Login window exhausted")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenPairResponse>, AuthError> {
    let client = client_key(&headers);
    let pair = state.auth.login(&client, &payload.email, &payload.password).await?;
    Ok(Json(state.pair_response(pair)))
}

/// refresh
///
/// [Public Route] Exchanges a live refresh token for a rotated token pair. No
/// password is involved; possession of the refresh token is the credential.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated token pair", body = TokenPairResponse),
        (status = 401, description = "Invalid, expired, or revoked refresh token")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPairResponse>, AuthError> {
    let pair = state.auth.refresh(&payload.refresh_token).await?;
    Ok(Json(state.pair_response(pair)))
}

/// change_password
///
/// [Authenticated Route] Re-verifies the current password, enforces the composition
/// policy on the replacement, persists the rehash, and invalidates every outstanding
/// refresh token for the subject.
///
/// Gated by the password-reset window (3 attempts per hour by default), which fails
/// CLOSED on cache outage like the login window.
#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed, refresh tokens revoked"),
        (status = 401, description = "Current password wrong"),
        (status = 422, description = "New password violates policy"),
        (status = 429, description = "Reset window exhausted")
    )
)]
pub async fn change_password(
    AuthUser { email, .. }: AuthUser,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AuthError> {
    let client = client_key(&headers);
    let decision = state
        .auth
        .limiter()
        .check_and_consume(&client, RouteClass::PasswordReset)
        .await;
    if !decision.allowed {
        return Err(AuthError::RateLimitExceeded {
            retry_after_secs: decision.retry_after_secs,
        });
    }

    state
        .auth
        .change_password(&email, &payload.current_password, &payload.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// me
///
/// [Authenticated Route] Returns the identity resolved from the presented access
/// token. Purely claim-derived; the user store is never consulted here.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Resolved identity", body = ProfileResponse),
        (status = 401, description = "Missing or invalid access token")
    )
)]
pub async fn me(AuthUser { id, email, role }: AuthUser) -> Json<ProfileResponse> {
    Json(ProfileResponse { id, email, role })
}
