use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::AppConfig, errors::AuthError};

/// TokenKind
///
/// Discriminates the two token families. Carried as an explicit claim so kind
/// confusion is rejected at the application level even if the secret split were
/// ever misconfigured; both checks must agree for a token to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims
///
/// The signed payload carried by every token issued by this core. Tokens are
/// immutable: once issued, a claim-set is never edited—revocation happens via the
/// cache-tracked session version (`sv`), never by mutating the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's UUID.
    pub sub: Uuid,
    /// The user's primary identifier, echoed for display and audit convenience.
    pub email: String,
    /// The RBAC role label.
    pub role: String,
    /// Access or refresh. Verified against the expected kind on every decode.
    pub kind: TokenKind,
    /// Session version stamp. Refresh tokens whose `sv` trails the cache-tracked
    /// current version are treated as revoked (password-change invalidation).
    pub sv: u64,
    /// Issued At: timestamp when the token was created.
    pub iat: usize,
    /// Expiration Time: timestamp after which the token must not be accepted.
    pub exp: usize,
    /// Issuer, validated on decode.
    pub iss: String,
    /// Audience, validated on decode.
    pub aud: String,
}

/// TokenPair
///
/// The result of a full issuance: one short-lived access token and one long-lived
/// refresh token. The two are independently verifiable; no atomicity is required.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// TokenService
///
/// Issues and verifies signed, time-boxed access and refresh tokens. Access and
/// refresh tokens are signed with DIFFERENT secrets so a compromised access-token
/// secret cannot forge refresh tokens; the `kind` claim is the second, redundant
/// check on top of that split.
///
/// Keys are derived once at construction from the immutable AppConfig and never
/// rotate at runtime.
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
    issuer: String,
    audience: String,
}

impl TokenService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            access_ttl_secs: config.access_token_ttl_secs,
            refresh_ttl_secs: config.refresh_token_ttl_secs,
            issuer: config.token_issuer.clone(),
            audience: config.token_audience.clone(),
        }
    }

    pub fn access_ttl_secs(&self) -> u64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> u64 {
        self.refresh_ttl_secs
    }

    /// issue_access_token
    ///
    /// Signs a short-lived access token for the given identity.
    pub fn issue_access_token(
        &self,
        sub: Uuid,
        email: &str,
        role: &str,
        sv: u64,
    ) -> Result<String, AuthError> {
        self.issue(TokenKind::Access, sub, email, role, sv)
    }

    /// issue_refresh_token
    ///
    /// Signs a long-lived refresh token for the given identity.
    pub fn issue_refresh_token(
        &self,
        sub: Uuid,
        email: &str,
        role: &str,
        sv: u64,
    ) -> Result<String, AuthError> {
        self.issue(TokenKind::Refresh, sub, email, role, sv)
    }

    /// issue_token_pair
    ///
    /// Convenience composition over the two single-kind issuers.
    pub fn issue_token_pair(
        &self,
        sub: Uuid,
        email: &str,
        role: &str,
        sv: u64,
    ) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(sub, email, role, sv)?,
            refresh_token: self.issue_refresh_token(sub, email, role, sv)?,
        })
    }

    /// verify_access_token
    ///
    /// Verifies signature, issuer, audience, and expiry against the ACCESS secret,
    /// then asserts the `kind` claim. A refresh token presented here fails even
    /// before the kind check, because it is signed with the other secret.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify(token, TokenKind::Access, &self.access_decoding)
    }

    /// verify_refresh_token
    ///
    /// The refresh-side counterpart of `verify_access_token`.
    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify(token, TokenKind::Refresh, &self.refresh_decoding)
    }

    fn issue(
        &self,
        kind: TokenKind,
        sub: Uuid,
        email: &str,
        role: &str,
        sv: u64,
    ) -> Result<String, AuthError> {
        let (key, ttl_secs) = match kind {
            TokenKind::Access => (&self.access_encoding, self.access_ttl_secs),
            TokenKind::Refresh => (&self.refresh_encoding, self.refresh_ttl_secs),
        };

        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub,
            email: email.to_string(),
            role: role.to_string(),
            kind,
            sv,
            iat: now,
            exp: now + ttl_secs as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        encode(&Header::default(), &claims, key)
            .map_err(|e| AuthError::TokenIssuance(e.to_string()))
    }

    fn verify(
        &self,
        token: &str,
        expected: TokenKind,
        key: &DecodingKey,
    ) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let token_data = decode::<Claims>(token, key, &validation).map_err(|e| match e.kind() {
            // Token expired: the most common failure for a valid-but-old token.
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            // Signed with a different secret (including the other kind's secret).
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            // Everything else: undecodable payload, wrong issuer/audience, etc.
            _ => AuthError::TokenMalformed,
        })?;

        // Redundant application-level kind assertion on top of the secret split.
        if token_data.claims.kind != expected {
            return Err(AuthError::WrongTokenKind);
        }
        Ok(token_data.claims)
    }
}
