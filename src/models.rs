use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Request Payloads (Input Schemas) ---

/// LoginRequest
///
/// Input payload for the credential flow (POST /auth/login).
/// Note: The password is verified against the stored hash and never persisted or
/// logged by this application.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[schema(example = "clerk@example.gov")]
    pub email: String,
    pub password: String,
}

/// RefreshRequest
///
/// Input payload for minting a new access token without re-entering a password
/// (POST /auth/refresh).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// ChangePasswordRequest
///
/// Input payload for the authenticated password-change flow
/// (POST /auth/change-password). The current password is re-verified even though
/// the caller already holds a valid access token.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// --- Response Payloads (Output Schemas) ---

/// TokenPairResponse
///
/// Output schema of a successful login or refresh: the short-lived access token,
/// the long-lived refresh token, and the access token's lifetime so clients can
/// schedule renewal without decoding the JWT.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always "Bearer"; included so clients can build the Authorization header blindly.
    pub token_type: String,
    pub expires_in_secs: u64,
}

/// ProfileResponse
///
/// Output schema of GET /auth/me: the identity resolved from the presented access
/// token. Derived entirely from verified claims; no store lookup happens here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub role: String,
}
