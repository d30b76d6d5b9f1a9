use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// AuthError
///
/// The complete error taxonomy of the authentication core. Every failure mode in the
/// token, password, cache, and rate-limit layers maps to exactly one of these variants,
/// so the HTTP mapping in `IntoResponse` is the single place where internal detail is
/// collapsed into client-safe responses.
///
/// Security Mandate:
/// `CredentialInvalid` deliberately covers both "no such user" and "wrong password".
/// The two cases must never be distinguishable from the outside (status, body, or
/// timing), which is why the orchestrator verifies against a dummy hash when the
/// lookup misses.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token's signature validated but its expiry is in the past.
    #[error("token expired")]
    TokenExpired,

    /// The token's signature does not match the expected secret.
    #[error("invalid token signature")]
    InvalidSignature,

    /// The token could not be parsed, or its issuer/audience claims are wrong.
    #[error("malformed token")]
    TokenMalformed,

    /// A structurally valid token carried the wrong `kind` claim (e.g. an access
    /// token presented where a refresh token was required).
    #[error("wrong token kind")]
    WrongTokenKind,

    /// Signing failed, typically because a secret is unavailable or invalid.
    #[error("token issuance failed: {0}")]
    TokenIssuance(String),

    /// The password hashing primitive itself errored.
    #[error("password hashing failed: {0}")]
    Hashing(String),

    /// The client exhausted its request window for this route class.
    #[error("rate limit exceeded")]
    RateLimitExceeded { retry_after_secs: u64 },

    /// The cache backend could not be reached within its bounded timeout.
    #[error("cache unavailable")]
    CacheUnavailable,

    /// Generic credential failure: unknown user OR wrong password.
    #[error("invalid credentials")]
    CredentialInvalid,

    /// A proposed new password violated the composition policy. Carries every
    /// violated rule so clients can render the full checklist, not just the first.
    #[error("password does not meet policy")]
    WeakPassword(Vec<String>),

    /// A collaborator (user-record store) failed in a way the core cannot recover from.
    #[error("internal error: {0}")]
    Internal(String),
}

/// HTTP Mapping
///
/// Maps the internal taxonomy to minimally-informative client responses:
/// - All credential and token failures collapse to a uniform 401 with the same body.
/// - Rate-limit exceedance is 429 with a `Retry-After` header (not security sensitive,
///   so the retry hint is allowed to be precise).
/// - Weak-password reports are 422 and carry the full list of violated rules.
/// - Cache/internal failures are 503/500 with no detail.
///
/// The specific variant is always logged server-side before being collapsed, so
/// operators keep the detail that clients are denied.
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::RateLimitExceeded { retry_after_secs } => {
                let body = Json(json!({
                    "error": "too many requests",
                    "retry_after_secs": retry_after_secs,
                }));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                if let Ok(value) = header::HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            AuthError::WeakPassword(rules) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "error": "password does not meet policy",
                    "violations": rules,
                })),
            )
                .into_response(),
            AuthError::CredentialInvalid
            | AuthError::TokenExpired
            | AuthError::InvalidSignature
            | AuthError::TokenMalformed
            | AuthError::WrongTokenKind => {
                // Uniform body: an attacker must not learn which check failed.
                tracing::info!(kind = ?self, "authentication rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "invalid credentials or token" })),
                )
                    .into_response()
            }
            AuthError::CacheUnavailable => {
                tracing::error!("cache backend unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "service temporarily unavailable" })),
                )
                    .into_response()
            }
            AuthError::TokenIssuance(ref detail)
            | AuthError::Hashing(ref detail)
            | AuthError::Internal(ref detail) => {
                tracing::error!(detail = %detail, kind = ?self, "internal auth failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}
