use gov_portal::{
    AppConfig, AppState, CacheState, MemoryCache, RedisCache, create_router,
    config::Env,
    service::{AuthService, MemoryUserStore, UserRecord, UserStoreState},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// main
///
/// The asynchronous entry point for the application, responsible for initializing
/// all core components: Configuration, Logging, Cache, the Auth orchestrator, and
/// the HTTP Server. Every shared client is constructed exactly once here and passed
/// down through AppState; nothing in the core reaches for a global.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    // Loads .env file settings before configuration can be read.
    dotenv::dotenv().ok();
    // AppConfig::load() implements the fail-fast principle for missing Production secrets.
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // Sets the default log level. It prioritizes the RUST_LOG environment variable,
    // falling back to sensible defaults for local development.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gov_portal=debug,tower_http=info,axum=trace".into());

    // 3. Initialize Logging based on Environment (Production Observability)
    // The structured logging format is dynamically selected based on the APP_ENV.
    match config.env {
        Env::Local => {
            // LOCAL: Pretty print output for human readability during local debugging.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // PROD: JSON format output for ingestion by centralized log aggregators.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Cache Initialization (Redis)
    // Production fails fast without its cache backend; local falls back to the
    // in-process implementation so the service starts without any infrastructure.
    let cache: CacheState = match RedisCache::connect(&config.redis_url).await {
        Ok(redis) => Arc::new(redis),
        Err(e) if config.env == Env::Local => {
            tracing::warn!(error = %e, "Redis unreachable, falling back to in-memory cache");
            Arc::new(MemoryCache::new())
        }
        Err(e) => panic!("FATAL: Failed to connect to Redis. Check REDIS_URL: {e}"),
    };

    // 5. User Store Initialization
    // The platform's persistence layer owns the real user records; this binary wires
    // a seeded in-process store for standalone operation and local development.
    let users = seed_user_store(&config);

    // 6. Auth Orchestrator Assembly
    let auth = Arc::new(
        AuthService::new(users, cache.clone(), &config)
            .expect("FATAL: password hashing backend unavailable."),
    );

    // 7. Unified State Assembly
    let app_state = AppState {
        auth,
        cache,
        config,
    };

    // 8. Router and Server Startup
    let app = create_router(app_state);

    // Binds the TCP listener and initiates the HTTP server.
    let listener = TcpListener::bind("0.0.0.0:3000").await.unwrap();

    tracing::info!("HTTP server bound successfully.");
    tracing::info!("Listening on 0.0.0.0:3000");
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:3000/swagger-ui");

    // The long-running Axum server process. Ctrl-C drains in-flight requests before
    // the process (and with it the cache connection) shuts down.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    tracing::info!("HTTP server stopped, cache connection released.");
}

/// seed_user_store
///
/// Builds the bootstrap user store from SEED_ADMIN_EMAIL / SEED_ADMIN_PASSWORD.
/// When no password is supplied, a random policy-compliant one is generated and
/// printed once so a fresh deployment is never reachable with a known default.
fn seed_user_store(config: &AppConfig) -> UserStoreState {
    use gov_portal::password::PasswordPolicy;

    let store = MemoryUserStore::new();
    let policy = PasswordPolicy::new(config.bcrypt_cost);

    let email =
        std::env::var("SEED_ADMIN_EMAIL").unwrap_or_else(|_| "admin@localhost".to_string());
    let password = std::env::var("SEED_ADMIN_PASSWORD").unwrap_or_else(|_| {
        let generated = policy.generate_random(16);
        tracing::warn!(email = %email, password = %generated, "generated bootstrap admin password");
        generated
    });

    let hash = policy
        .hash_blocking(&password)
        .expect("FATAL: could not hash bootstrap credentials.");
    store.insert(UserRecord {
        id: Uuid::new_v4(),
        email,
        password_hash: hash,
        role: "admin".to_string(),
    });

    Arc::new(store)
}

/// Resolves when the process receives Ctrl-C, triggering the graceful-shutdown path.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown signal handler");
    }
}
