use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{
    cache::CacheState,
    config::AppConfig,
    errors::AuthError,
    password::PasswordPolicy,
    rate_limit::{RateLimiter, RouteClass},
    token::{TokenPair, TokenService},
};

/// UserRecord
///
/// The minimal credential view the core needs from the platform's user store:
/// opaque identity, algorithm-tagged salted hash, and the RBAC role label. The
/// core never sees or stores a plaintext password.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

/// UserStore Trait
///
/// Defines the abstract contract for the external user-record collaborator. The
/// rest of the platform owns persistence; this core only looks credentials up and
/// writes back rehashed passwords.
///
/// **Send + Sync + async_trait** are required to make the trait object
/// (`Arc<dyn UserStore>`) safely shareable across Axum's asynchronous task
/// boundaries.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Option<UserRecord>;
    /// Persists a new password hash. Returns false if the user no longer exists
    /// or the write failed.
    async fn update_password(&self, id: Uuid, new_hash: &str) -> bool;
}

/// UserStoreState
///
/// The concrete type used to share the user-record collaborator across the
/// application state.
pub type UserStoreState = Arc<dyn UserStore>;

/// MemoryUserStore
///
/// An in-process store used by tests and by local development runs where the
/// platform's real store is not wired up. Seeded explicitly; never used in
/// production.
#[derive(Default)]
pub struct MemoryUserStore {
    records: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: UserRecord) {
        let mut records = self.records.lock().expect("user store mutex poisoned");
        records.insert(record.email.clone(), record);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Option<UserRecord> {
        let records = self.records.lock().expect("user store mutex poisoned");
        records.get(email).cloned()
    }

    async fn update_password(&self, id: Uuid, new_hash: &str) -> bool {
        let mut records = self.records.lock().expect("user store mutex poisoned");
        for record in records.values_mut() {
            if record.id == id {
                record.password_hash = new_hash.to_string();
                return true;
            }
        }
        false
    }
}

/// AuthService
///
/// The composition point of the authentication core: validates credentials against
/// the user-record collaborator, gates attempts through the rate limiter, and
/// issues/refreshes token pairs via the token service. Constructed exactly once at
/// startup and shared through the application state—no ambient globals.
pub struct AuthService {
    users: UserStoreState,
    cache: CacheState,
    tokens: TokenService,
    passwords: PasswordPolicy,
    limiter: RateLimiter,
    // Verified against when a login targets a nonexistent account, so the missing
    // and wrong-password paths cost the same. Precomputed once at startup.
    dummy_hash: String,
}

/// AuthServiceState
///
/// The concrete type used to share the orchestrator across the application state.
pub type AuthServiceState = Arc<AuthService>;

impl AuthService {
    /// new
    ///
    /// Builds the orchestrator from its injected collaborators. Fails only if the
    /// hashing primitive cannot produce the dummy hash, which indicates a broken
    /// bcrypt backend and should abort startup.
    pub fn new(
        users: UserStoreState,
        cache: CacheState,
        config: &AppConfig,
    ) -> Result<Self, AuthError> {
        let passwords = PasswordPolicy::new(config.bcrypt_cost);
        let dummy_hash = passwords.hash_blocking(&passwords.generate_random(24))?;
        Ok(Self {
            users,
            cache: cache.clone(),
            tokens: TokenService::new(config),
            passwords,
            limiter: RateLimiter::new(cache, config),
            dummy_hash,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn passwords(&self) -> &PasswordPolicy {
        &self.passwords
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// login
    ///
    /// The full credential flow: rate-limit gate, user lookup, password check,
    /// token-pair issuance. Lookup misses and password mismatches both collapse to
    /// the single generic `CredentialInvalid`—status, body, and timing must not
    /// reveal which one occurred, hence the dummy-hash verification on the missing
    /// path.
    ///
    /// The rate-limit attempt is consumed before credentials are inspected, so an
    /// exhausted window blocks even a correct password.
    pub async fn login(
        &self,
        client_key: &str,
        email: &str,
        password: &str,
    ) -> Result<TokenPair, AuthError> {
        let decision = self
            .limiter
            .check_and_consume(client_key, RouteClass::Login)
            .await;
        if !decision.allowed {
            return Err(AuthError::RateLimitExceeded {
                retry_after_secs: decision.retry_after_secs,
            });
        }

        let record = match self.users.find_by_email(email).await {
            Some(record) => record,
            None => {
                // Equalize timing with the wrong-password path.
                self.passwords.verify(password, &self.dummy_hash).await;
                return Err(AuthError::CredentialInvalid);
            }
        };

        if !self.passwords.verify(password, &record.password_hash).await {
            return Err(AuthError::CredentialInvalid);
        }

        let sv = self.current_session_version(record.id).await;
        let pair = self
            .tokens
            .issue_token_pair(record.id, &record.email, &record.role, sv)?;

        // Best-effort audit stamp: detached so a slow or failing cache never delays
        // the login response. Failures are logged, not surfaced.
        let cache = self.cache.clone();
        let sub = record.id;
        tokio::spawn(async move {
            let key = format!("auth:last_login:{sub}");
            if !cache.set(&key, &Utc::now().to_rfc3339(), 30 * 24 * 60 * 60).await {
                tracing::warn!(user_id = %sub, "failed to record last-login stamp");
            }
        });

        tracing::info!(user_id = %record.id, "login succeeded");
        Ok(pair)
    }

    /// refresh
    ///
    /// Verifies a refresh token (signature, expiry, kind, and session version) and
    /// mints a rotated token pair. No password re-check occurs here; possession of
    /// a live refresh token IS the credential.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.tokens.verify_refresh_token(refresh_token)?;

        // Session-version check: a password change bumps the cache-tracked version,
        // which retires every refresh token minted before it. A token whose stamp
        // trails the current version reads as expired to the client.
        let current = self.current_session_version(claims.sub).await;
        if claims.sv != current {
            tracing::info!(user_id = %claims.sub, "refresh token superseded by session-version bump");
            return Err(AuthError::TokenExpired);
        }

        self.tokens
            .issue_token_pair(claims.sub, &claims.email, &claims.role, current)
    }

    /// change_password
    ///
    /// Verifies the current password, enforces the composition policy on the new
    /// one, rehashes, persists via the collaborator, and bumps the session version
    /// so every outstanding refresh token for the subject is invalidated.
    pub async fn change_password(
        &self,
        email: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let record = self
            .users
            .find_by_email(email)
            .await
            .ok_or(AuthError::CredentialInvalid)?;

        if !self
            .passwords
            .verify(current_password, &record.password_hash)
            .await
        {
            return Err(AuthError::CredentialInvalid);
        }

        let report = self.passwords.validate_strength(new_password);
        if !report.valid {
            return Err(AuthError::WeakPassword(report.errors));
        }

        let new_hash = self.passwords.hash(new_password).await?;
        if !self.users.update_password(record.id, &new_hash).await {
            return Err(AuthError::Internal(
                "user store rejected password update".to_string(),
            ));
        }

        self.bump_session_version(record.id).await;
        tracing::info!(user_id = %record.id, "password changed, refresh tokens invalidated");
        Ok(())
    }

    /// Reads the subject's current session version. A missing key (first login,
    /// expired entry, or cache outage) reads as version 0: reads fail OPEN so the
    /// platform stays usable when the cache is degraded.
    async fn current_session_version(&self, sub: Uuid) -> u64 {
        self.cache
            .get(&session_version_key(sub))
            .await
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0)
    }

    /// Bumps the session version with a TTL matching the refresh-token lifetime:
    /// once every pre-bump token has aged out on its own, the marker no longer
    /// needs to exist.
    async fn bump_session_version(&self, sub: Uuid) {
        let next = self.current_session_version(sub).await + 1;
        let ttl = self.tokens.refresh_ttl_secs();
        if !self
            .cache
            .set(&session_version_key(sub), &next.to_string(), ttl)
            .await
        {
            tracing::warn!(
                user_id = %sub,
                "could not bump session version; outstanding refresh tokens remain valid until expiry"
            );
        }
    }
}

fn session_version_key(sub: Uuid) -> String {
    format!("auth:sv:{sub}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    const SUB: Uuid = Uuid::from_u128(42);
    const EMAIL: &str = "clerk@example.gov";
    const PASSWORD: &str = "Correct-Horse-9";

    fn fixture() -> (AuthService, Arc<MemoryUserStore>) {
        let config = AppConfig::default();
        let policy = PasswordPolicy::new(config.bcrypt_cost);
        let store = Arc::new(MemoryUserStore::new());
        store.insert(UserRecord {
            id: SUB,
            email: EMAIL.to_string(),
            password_hash: policy.hash_blocking(PASSWORD).unwrap(),
            role: "editor".to_string(),
        });
        let cache: CacheState = Arc::new(MemoryCache::new());
        let service = AuthService::new(store.clone(), cache, &config).unwrap();
        (service, store)
    }

    #[tokio::test]
    async fn login_issues_verifiable_pair() {
        let (service, _) = fixture();
        let pair = service.login("10.0.0.1", EMAIL, PASSWORD).await.unwrap();

        let access = service.tokens().verify_access_token(&pair.access_token).unwrap();
        assert_eq!(access.sub, SUB);
        let refresh = service
            .tokens()
            .verify_refresh_token(&pair.refresh_token)
            .unwrap();
        assert_eq!(refresh.sub, SUB);
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_are_indistinguishable() {
        let (service, _) = fixture();

        let missing = service
            .login("10.0.0.1", "ghost@example.gov", PASSWORD)
            .await
            .unwrap_err();
        let mismatch = service
            .login("10.0.0.1", EMAIL, "Wrong-Horse-9")
            .await
            .unwrap_err();

        assert!(matches!(missing, AuthError::CredentialInvalid));
        assert!(matches!(mismatch, AuthError::CredentialInvalid));
    }

    #[tokio::test]
    async fn exhausted_window_blocks_even_correct_password() {
        let (service, _) = fixture();

        for _ in 0..5 {
            let _ = service.login("10.0.0.9", EMAIL, "Wrong-Horse-9").await;
        }
        let err = service.login("10.0.0.9", EMAIL, PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn refresh_rotates_pair() {
        let (service, _) = fixture();
        let pair = service.login("10.0.0.1", EMAIL, PASSWORD).await.unwrap();

        let rotated = service.refresh(&pair.refresh_token).await.unwrap();
        let claims = service
            .tokens()
            .verify_access_token(&rotated.access_token)
            .unwrap();
        assert_eq!(claims.sub, SUB);
    }

    #[tokio::test]
    async fn refresh_rejects_access_token() {
        let (service, _) = fixture();
        let pair = service.login("10.0.0.1", EMAIL, PASSWORD).await.unwrap();

        let err = service.refresh(&pair.access_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature));
    }

    #[tokio::test]
    async fn password_change_invalidates_outstanding_refresh_tokens() {
        let (service, _) = fixture();
        let pair = service.login("10.0.0.1", EMAIL, PASSWORD).await.unwrap();

        service
            .change_password(EMAIL, PASSWORD, "New-Secret-77!")
            .await
            .unwrap();

        // The pre-change refresh token is now superseded.
        let err = service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));

        // The new credential works and yields a live pair.
        let fresh = service
            .login("10.0.0.2", EMAIL, "New-Secret-77!")
            .await
            .unwrap();
        assert!(service.refresh(&fresh.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn weak_replacement_password_reports_all_violations() {
        let (service, _) = fixture();
        let err = service
            .change_password(EMAIL, PASSWORD, "abc")
            .await
            .unwrap_err();
        match err {
            AuthError::WeakPassword(rules) => assert_eq!(rules.len(), 4),
            other => panic!("expected WeakPassword, got {other:?}"),
        }
    }
}
