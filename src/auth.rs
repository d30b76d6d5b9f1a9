use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, StatusCode, header, request::Parts},
};
use uuid::Uuid;

use crate::service::AuthServiceState;

/// AuthUser Extractor Result
///
/// This struct represents the resolved identity of an authenticated request.
/// It is the core output of the AuthUser extractor implementation.
/// Handlers use this struct to retrieve the user's ID, email, and role claims.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The unique identifier of the subject, taken from the verified `sub` claim.
    pub id: Uuid,
    /// The subject's email, echoed from the claim-set.
    pub email: String,
    /// The RBAC role label carried by the token.
    pub role: String,
}

/// AuthUser Extractor Implementation
///
/// Implements Axum's FromRequestParts trait, making AuthUser usable as a function
/// argument in any authenticated handler. This cleanly separates authentication
/// (extractor) from business logic (the handler).
///
/// The process:
/// 1. Dependency Resolution: Accessing the AuthService from the application state.
/// 2. Token Extraction: Standard Bearer token extraction from the Authorization header.
/// 3. Verification: Signature, issuer, audience, expiry, and kind checks via the
///    Token Service. Tokens are stateless; no store lookup happens per request.
///
/// Rejection: Returns StatusCode::UNAUTHORIZED (401) on any failure. The specific
/// failure kind is logged server-side but never leaks to the client.
impl<S> FromRequestParts<S> for AuthUser
where
    // S must allow sending across threads and sharing.
    S: Send + Sync,
    // Allows the extractor to pull the orchestrator (for the Token Service).
    AuthServiceState: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthServiceState::from_ref(state);

        // Token Extraction
        // Retrieve the Authorization header and ensure it is prefixed with "Bearer ".
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(StatusCode::UNAUTHORIZED)?;

        match auth.tokens().verify_access_token(token) {
            Ok(claims) => Ok(AuthUser {
                id: claims.sub,
                email: claims.email,
                role: claims.role,
            }),
            Err(e) => {
                // Operators keep the detail; the client only sees 401.
                tracing::debug!(error = %e, "access token rejected");
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    }
}

/// client_key
///
/// Resolves the client identity used for rate-limit bucketing. Behind the
/// platform's reverse proxy the first `x-forwarded-for` hop is the real client;
/// `x-real-ip` is the fallback. Requests with neither header share one bucket,
/// which throttles misconfigured deployments conservatively instead of not at all.
pub fn client_key(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first_hop) = forwarded.split(',').next() {
            let first_hop = first_hop.trim();
            if !first_hop.is_empty() {
                return first_hop.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|value| value.to_str().ok()) {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_key_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_key(&headers), "203.0.113.7");
    }

    #[test]
    fn client_key_falls_back_to_real_ip_then_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_key(&headers), "198.51.100.2");

        assert_eq!(client_key(&HeaderMap::new()), "unknown");
    }
}
