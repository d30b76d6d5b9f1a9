use crate::{cache::CacheState, config::AppConfig};

/// RouteClass
///
/// The three throttling categories the platform distinguishes. Windows and limits
/// are configuration-driven per class; the class itself only decides which policy
/// applies and how outages are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Login,
    PasswordReset,
    Api,
}

impl RouteClass {
    /// Stable namespace segment used in the backing counter key.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Login => "login",
            RouteClass::PasswordReset => "password-reset",
            RouteClass::Api => "api",
        }
    }
}

/// WindowPolicy
///
/// One route class's window configuration. `critical` selects the outage policy:
/// critical classes (login, password-reset) fail CLOSED when the cache is down,
/// because unlimited brute-force is worse than a temporarily unavailable login;
/// the general API class fails OPEN, favoring availability over strict throttling.
#[derive(Debug, Clone)]
pub struct WindowPolicy {
    pub window_secs: u64,
    pub max_attempts: i64,
    pub critical: bool,
}

/// RateLimitDecision
///
/// The outcome of consuming one attempt from a window. `retry_after_secs` is only
/// meaningful when `allowed` is false and reflects the remaining TTL of the window.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: i64,
    pub retry_after_secs: u64,
}

/// RateLimiter
///
/// A fixed-window request gate built on the cache's atomic `increment`. Counters
/// are keyed `ratelimit:{class}:{client}` and window boundaries are enforced purely
/// by the backing entry's TTL: the window resets when the key expires, with no
/// explicit timestamp arithmetic on this side. Concurrent hits from one client are
/// serialized by the backend's atomic increment, so simultaneous logins never
/// under-count.
#[derive(Clone)]
pub struct RateLimiter {
    cache: CacheState,
    login: WindowPolicy,
    password_reset: WindowPolicy,
    api: WindowPolicy,
}

impl RateLimiter {
    pub fn new(cache: CacheState, config: &AppConfig) -> Self {
        Self {
            cache,
            login: WindowPolicy {
                window_secs: config.login_window_secs,
                max_attempts: config.login_max_attempts,
                critical: true,
            },
            password_reset: WindowPolicy {
                window_secs: config.password_reset_window_secs,
                max_attempts: config.password_reset_max_attempts,
                critical: true,
            },
            api: WindowPolicy {
                window_secs: config.api_window_secs,
                max_attempts: config.api_max_attempts,
                critical: false,
            },
        }
    }

    fn policy(&self, class: RouteClass) -> &WindowPolicy {
        match class {
            RouteClass::Login => &self.login,
            RouteClass::PasswordReset => &self.password_reset,
            RouteClass::Api => &self.api,
        }
    }

    /// check_and_consume
    ///
    /// Consumes one attempt from the client's window for the given class and reports
    /// whether the request may proceed. The attempt is counted even when the request
    /// later succeeds: a correct password does not reopen an exhausted login window.
    pub async fn check_and_consume(&self, client_key: &str, class: RouteClass) -> RateLimitDecision {
        let policy = self.policy(class);
        let key = format!("ratelimit:{}:{}", class.as_str(), client_key);

        match self.cache.increment(&key, policy.window_secs).await {
            Ok(count) if count > policy.max_attempts => {
                let retry_after_secs = self.cache.ttl(&key).await.unwrap_or(policy.window_secs);
                tracing::warn!(
                    client = client_key,
                    class = class.as_str(),
                    count,
                    "rate limit exceeded"
                );
                RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    retry_after_secs,
                }
            }
            Ok(count) => RateLimitDecision {
                allowed: true,
                remaining: policy.max_attempts - count,
                retry_after_secs: 0,
            },
            Err(_) if policy.critical => {
                // Cache outage on a credential-sensitive route: deny rather than
                // allow unlimited brute force.
                tracing::error!(
                    class = class.as_str(),
                    "cache unavailable, failing CLOSED for critical route class"
                );
                RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    retry_after_secs: policy.window_secs,
                }
            }
            Err(_) => {
                tracing::warn!(
                    class = class.as_str(),
                    "cache unavailable, failing OPEN for general route class"
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: policy.max_attempts,
                    retry_after_secs: 0,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, MemoryCache};
    use crate::errors::AuthError;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    fn limiter_with(cache: CacheState) -> RateLimiter {
        let mut config = AppConfig::default();
        config.login_window_secs = 900;
        config.login_max_attempts = 5;
        config.api_max_attempts = 100;
        RateLimiter::new(cache, &config)
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_attempt_is_denied_and_window_expiry_resets() {
        let limiter = limiter_with(Arc::new(MemoryCache::new()));

        for attempt in 1..=5 {
            let decision = limiter.check_and_consume("10.0.0.1", RouteClass::Login).await;
            assert!(decision.allowed, "attempt {attempt} should pass");
            assert_eq!(decision.remaining, 5 - attempt);
        }

        let denied = limiter.check_and_consume("10.0.0.1", RouteClass::Login).await;
        assert!(!denied.allowed);
        assert!(denied.retry_after_secs > 0);
        assert!(denied.retry_after_secs <= 900);

        // Window TTL elapses; the next attempt starts a fresh counter.
        tokio::time::sleep(Duration::from_secs(901)).await;
        let fresh = limiter.check_and_consume("10.0.0.1", RouteClass::Login).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 4);
    }

    #[tokio::test]
    async fn clients_and_classes_are_isolated() {
        let limiter = limiter_with(Arc::new(MemoryCache::new()));

        for _ in 0..6 {
            limiter.check_and_consume("10.0.0.1", RouteClass::Login).await;
        }
        // Another client on the same class is unaffected.
        assert!(
            limiter
                .check_and_consume("10.0.0.2", RouteClass::Login)
                .await
                .allowed
        );
        // The same client on a different class is unaffected.
        assert!(
            limiter
                .check_and_consume("10.0.0.1", RouteClass::Api)
                .await
                .allowed
        );
    }

    /// Cache stub whose increment always reports an outage.
    struct DownCache;

    #[async_trait]
    impl Cache for DownCache {
        async fn get(&self, _key: &str) -> Option<String> {
            None
        }
        async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> bool {
            false
        }
        async fn delete(&self, _key: &str) -> bool {
            false
        }
        async fn exists(&self, _key: &str) -> bool {
            false
        }
        async fn increment(&self, _key: &str, _ttl_secs: u64) -> Result<i64, AuthError> {
            Err(AuthError::CacheUnavailable)
        }
        async fn ttl(&self, _key: &str) -> Option<u64> {
            None
        }
        async fn delete_by_pattern(&self, _pattern: &str) -> u64 {
            0
        }
    }

    #[tokio::test]
    async fn outage_fails_closed_for_login_and_open_for_api() {
        let limiter = limiter_with(Arc::new(DownCache));

        let login = limiter.check_and_consume("10.0.0.1", RouteClass::Login).await;
        assert!(!login.allowed);
        assert!(login.retry_after_secs > 0);

        let reset = limiter
            .check_and_consume("10.0.0.1", RouteClass::PasswordReset)
            .await;
        assert!(!reset.allowed);

        let api = limiter.check_and_consume("10.0.0.1", RouteClass::Api).await;
        assert!(api.allowed);
    }
}
