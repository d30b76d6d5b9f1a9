use std::env;

/// AppConfig
///
/// Holds the application's entire configuration state. This struct is designed to be
/// immutable once loaded, ensuring consistency across all threads and services (tokens,
/// cache, rate limiter). It is pulled into the application state via FromRef, embodying
/// the "immutable AppConfig" part of the Unified State Pattern.
///
/// The signing secrets are read exactly once here at startup; nothing in the core
/// mutates configuration at runtime.
#[derive(Clone)]
pub struct AppConfig {
    // Runtime environment marker. Controls logging format and local fallbacks.
    pub env: Env,
    // Secret used to sign and verify ACCESS tokens.
    pub access_token_secret: String,
    // Secret used to sign and verify REFRESH tokens. Deliberately separate from the
    // access secret: the two token kinds must not be interchangeable even under key
    // confusion.
    pub refresh_token_secret: String,
    // Access token lifetime in seconds (short-lived).
    pub access_token_ttl_secs: u64,
    // Refresh token lifetime in seconds (long-lived).
    pub refresh_token_ttl_secs: u64,
    // Issuer and audience stamped into, and validated on, every token.
    pub token_issuer: String,
    pub token_audience: String,
    // Work factor for the password hash. Higher is slower and stronger.
    pub bcrypt_cost: u32,
    // Connection string for the Redis-compatible cache backend.
    pub redis_url: String,
    // Default TTL applied to cache writes that do not specify their own.
    pub default_cache_ttl_secs: u64,
    // Per-route-class rate-limit windows.
    pub login_window_secs: u64,
    pub login_max_attempts: i64,
    pub password_reset_window_secs: u64,
    pub password_reset_max_attempts: i64,
    pub api_window_secs: u64,
    pub api_max_attempts: i64,
}

/// Env
///
/// Defines the runtime context, used to switch between development conveniences
/// (pretty logs, in-memory cache fallback, seeded user store) and hardened
/// production behavior (JSON logs, mandatory secrets, mandatory Redis).
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// default
    ///
    /// Provides a safe, non-panicking AppConfig instance primarily used for test setup.
    /// This allows us to instantiate the configuration without needing to set environment
    /// variables for lightweight unit or integration testing state scaffolding.
    fn default() -> Self {
        Self {
            env: Env::Local,
            access_token_secret: "test-access-secret-value-local".to_string(),
            refresh_token_secret: "test-refresh-secret-value-local".to_string(),
            access_token_ttl_secs: 15 * 60,
            refresh_token_ttl_secs: 7 * 24 * 60 * 60,
            token_issuer: "gov-portal".to_string(),
            token_audience: "gov-portal-clients".to_string(),
            // Minimum bcrypt cost: keeps test suites fast. Production loads 12.
            bcrypt_cost: 4,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            default_cache_ttl_secs: 300,
            login_window_secs: 15 * 60,
            login_max_attempts: 5,
            password_reset_window_secs: 60 * 60,
            password_reset_max_attempts: 3,
            api_window_secs: 15 * 60,
            api_max_attempts: 100,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// The canonical function for initializing the application configuration at startup.
    /// It reads all parameters from environment variables and implements the **fail-fast**
    /// principle.
    ///
    /// # Panics
    /// Panics if a critical environment variable required for the current runtime
    /// environment (especially Production) is not found. This prevents the application
    /// from starting with an incomplete or insecure configuration: in particular, both
    /// signing secrets are mandatory in production and must differ.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        // Secret Resolution
        // Production secrets are mandatory and must be explicitly set. Local falls back
        // to fixed development values so the service starts without any setup.
        let (access_token_secret, refresh_token_secret) = match env {
            Env::Production => {
                let access = env::var("ACCESS_TOKEN_SECRET")
                    .expect("FATAL: ACCESS_TOKEN_SECRET must be set in production.");
                let refresh = env::var("REFRESH_TOKEN_SECRET")
                    .expect("FATAL: REFRESH_TOKEN_SECRET must be set in production.");
                // A shared secret would collapse the access/refresh defense-in-depth split.
                assert_ne!(
                    access, refresh,
                    "FATAL: ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ."
                );
                (access, refresh)
            }
            Env::Local => (
                env::var("ACCESS_TOKEN_SECRET")
                    .unwrap_or_else(|_| "test-access-secret-value-local".to_string()),
                env::var("REFRESH_TOKEN_SECRET")
                    .unwrap_or_else(|_| "test-refresh-secret-value-local".to_string()),
            ),
        };

        let redis_url = match env {
            Env::Production => {
                env::var("REDIS_URL").expect("FATAL: REDIS_URL must be set in production.")
            }
            Env::Local => {
                env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
            }
        };

        Self {
            env,
            access_token_secret,
            refresh_token_secret,
            access_token_ttl_secs: env_u64("ACCESS_TOKEN_TTL_SECS", 15 * 60),
            refresh_token_ttl_secs: env_u64("REFRESH_TOKEN_TTL_SECS", 7 * 24 * 60 * 60),
            token_issuer: env::var("TOKEN_ISSUER").unwrap_or_else(|_| "gov-portal".to_string()),
            token_audience: env::var("TOKEN_AUDIENCE")
                .unwrap_or_else(|_| "gov-portal-clients".to_string()),
            bcrypt_cost: env_u64("BCRYPT_COST", 12) as u32,
            redis_url,
            default_cache_ttl_secs: env_u64("DEFAULT_CACHE_TTL_SECS", 300),
            login_window_secs: env_u64("LOGIN_WINDOW_SECS", 15 * 60),
            login_max_attempts: env_u64("LOGIN_MAX_ATTEMPTS", 5) as i64,
            password_reset_window_secs: env_u64("PASSWORD_RESET_WINDOW_SECS", 60 * 60),
            password_reset_max_attempts: env_u64("PASSWORD_RESET_MAX_ATTEMPTS", 3) as i64,
            api_window_secs: env_u64("API_WINDOW_SECS", 15 * 60),
            api_max_attempts: env_u64("API_MAX_ATTEMPTS", 100) as i64,
        }
    }
}

/// Reads a numeric tuning knob from the environment, falling back to the documented
/// default when unset or unparseable.
fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
