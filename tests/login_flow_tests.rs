use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use gov_portal::{
    AppConfig, AppState, AuthService, MemoryCache, create_router,
    cache::CacheState,
    models::{ProfileResponse, TokenPairResponse},
    password::PasswordPolicy,
    service::{MemoryUserStore, UserRecord, UserStoreState},
    token::{Claims, TokenKind},
};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

// --- Test App Scaffolding ---

const USER_ID: Uuid = Uuid::from_u128(9);
const EMAIL: &str = "clerk@example.gov";
const PASSWORD: &str = "Correct-Horse-9";

fn spawn_app(config: AppConfig) -> Router {
    let policy = PasswordPolicy::new(config.bcrypt_cost);
    let store = MemoryUserStore::new();
    store.insert(UserRecord {
        id: USER_ID,
        email: EMAIL.to_string(),
        password_hash: policy.hash_blocking(PASSWORD).unwrap(),
        role: "editor".to_string(),
    });
    let users: UserStoreState = Arc::new(store);
    let cache: CacheState = Arc::new(MemoryCache::new());

    let auth = Arc::new(AuthService::new(users, cache.clone(), &config).unwrap());

    create_router(AppState {
        auth,
        cache,
        config,
    })
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    json_request_from(uri, body, "198.51.100.10")
}

fn json_request_from(uri: &str, body: Value, client_ip: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client_ip)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login_pair(app: &Router, client_ip: &str) -> TokenPairResponse {
    let response = app
        .clone()
        .oneshot(json_request_from(
            "/auth/login",
            json!({ "email": EMAIL, "password": PASSWORD }),
            client_ip,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_value(body_json(response).await).unwrap()
}

// --- Tests ---

#[tokio::test]
async fn login_issues_pair_and_access_token_opens_protected_route() {
    let app = spawn_app(AppConfig::default());
    let pair = login_pair(&app, "198.51.100.10").await;
    assert_eq!(pair.token_type, "Bearer");
    assert_eq!(pair.expires_in_secs, 15 * 60);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/me")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", pair.access_token),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let profile: ProfileResponse = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(profile.id, USER_ID);
    assert_eq!(profile.email, EMAIL);
}

#[tokio::test]
async fn protected_route_rejects_expired_access_token() {
    let config = AppConfig::default();
    let app = spawn_app(config.clone());

    // Correctly signed claim-set whose expiry is an hour in the past.
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: USER_ID,
        email: EMAIL.to_string(),
        role: "editor".to_string(),
        kind: TokenKind::Access,
        sv: 0,
        iat: now - 7200,
        exp: now - 3600,
        iss: config.token_issuer.clone(),
        aud: config.token_audience.clone(),
    };
    let key = EncodingKey::from_secret(config.access_token_secret.as_bytes());
    let stale = encode(&Header::default(), &claims, &key).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {stale}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_token_mints_new_access_token() {
    let app = spawn_app(AppConfig::default());
    let pair = login_pair(&app, "198.51.100.11").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "/auth/refresh",
            json!({ "refresh_token": pair.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let rotated: TokenPairResponse = serde_json::from_value(body_json(response).await).unwrap();

    // The rotated access token opens protected routes like the original.
    let me = app
        .oneshot(
            Request::builder()
                .uri("/auth/me")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", rotated.access_token),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_endpoint_rejects_access_token() {
    let app = spawn_app(AppConfig::default());
    let pair = login_pair(&app, "198.51.100.12").await;

    let response = app
        .oneshot(json_request(
            "/auth/refresh",
            json!({ "refresh_token": pair.access_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_user_and_wrong_password_responses_are_identical() {
    let app = spawn_app(AppConfig::default());

    let missing = app
        .clone()
        .oneshot(json_request(
            "/auth/login",
            json!({ "email": "ghost@example.gov", "password": PASSWORD }),
        ))
        .await
        .unwrap();
    let mismatch = app
        .oneshot(json_request(
            "/auth/login",
            json!({ "email": EMAIL, "password": "Wrong-Horse-9" }),
        ))
        .await
        .unwrap();

    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(mismatch.status(), StatusCode::UNAUTHORIZED);

    // Same body bytes: no user-enumeration signal in the payload either.
    let missing_body = body_json(missing).await;
    let mismatch_body = body_json(mismatch).await;
    assert_eq!(missing_body, mismatch_body);
}

#[tokio::test(start_paused = true)]
async fn brute_force_is_throttled_even_with_correct_credentials() {
    let app = spawn_app(AppConfig::default());
    let attacker = "203.0.113.66";

    // Five failed attempts exhaust the window (limit 5).
    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(json_request_from(
                "/auth/login",
                json!({ "email": EMAIL, "password": "Wrong-Horse-9" }),
                attacker,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Sixth attempt: 429 with a concrete retry hint.
    let sixth = app
        .clone()
        .oneshot(json_request_from(
            "/auth/login",
            json!({ "email": EMAIL, "password": "Wrong-Horse-9" }),
            attacker,
        ))
        .await
        .unwrap();
    assert_eq!(sixth.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = sixth
        .headers()
        .get(header::RETRY_AFTER)
        .expect("Retry-After header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0);

    // Seventh attempt with the CORRECT password: still blocked.
    let seventh = app
        .clone()
        .oneshot(json_request_from(
            "/auth/login",
            json!({ "email": EMAIL, "password": PASSWORD }),
            attacker,
        ))
        .await
        .unwrap();
    assert_eq!(seventh.status(), StatusCode::TOO_MANY_REQUESTS);

    // Once the window TTL elapses, a fresh counter admits the client again.
    tokio::time::sleep(Duration::from_secs(15 * 60 + 1)).await;
    let after_window = app
        .oneshot(json_request_from(
            "/auth/login",
            json!({ "email": EMAIL, "password": PASSWORD }),
            attacker,
        ))
        .await
        .unwrap();
    assert_eq!(after_window.status(), StatusCode::OK);
}

#[tokio::test]
async fn throttle_buckets_are_per_client() {
    let app = spawn_app(AppConfig::default());

    for _ in 0..6 {
        let _ = app
            .clone()
            .oneshot(json_request_from(
                "/auth/login",
                json!({ "email": EMAIL, "password": "Wrong-Horse-9" }),
                "203.0.113.66",
            ))
            .await
            .unwrap();
    }

    // A different client is unaffected by the attacker's exhausted window.
    let other = login_pair(&app, "198.51.100.20").await;
    assert!(!other.access_token.is_empty());
}

#[tokio::test]
async fn password_change_revokes_old_refresh_tokens() {
    let app = spawn_app(AppConfig::default());
    let pair = login_pair(&app, "198.51.100.30").await;

    let change = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/change-password")
                .header(header::CONTENT_TYPE, "application/json")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", pair.access_token),
                )
                .header("x-forwarded-for", "198.51.100.30")
                .body(Body::from(
                    json!({
                        "current_password": PASSWORD,
                        "new_password": "Fresh-Secret-42!"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(change.status(), StatusCode::NO_CONTENT);

    // The pre-change refresh token is revoked.
    let revoked = app
        .clone()
        .oneshot(json_request(
            "/auth/refresh",
            json!({ "refresh_token": pair.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(revoked.status(), StatusCode::UNAUTHORIZED);

    // The old password no longer authenticates; the new one does.
    let stale_login = app
        .clone()
        .oneshot(json_request_from(
            "/auth/login",
            json!({ "email": EMAIL, "password": PASSWORD }),
            "198.51.100.31",
        ))
        .await
        .unwrap();
    assert_eq!(stale_login.status(), StatusCode::UNAUTHORIZED);

    let fresh_login = app
        .oneshot(json_request_from(
            "/auth/login",
            json!({ "email": EMAIL, "password": "Fresh-Secret-42!" }),
            "198.51.100.32",
        ))
        .await
        .unwrap();
    assert_eq!(fresh_login.status(), StatusCode::OK);
}

#[tokio::test]
async fn weak_replacement_password_lists_every_violation() {
    let app = spawn_app(AppConfig::default());
    let pair = login_pair(&app, "198.51.100.40").await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/change-password")
                .header(header::CONTENT_TYPE, "application/json")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", pair.access_token),
                )
                .header("x-forwarded-for", "198.51.100.40")
                .body(Body::from(
                    json!({
                        "current_password": PASSWORD,
                        "new_password": "abc"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    let violations = body["violations"].as_array().expect("violations array");
    // "abc" misses length, uppercase, digit, and special: all four reported.
    assert_eq!(violations.len(), 4);
}

#[tokio::test]
async fn health_check_is_open() {
    let app = spawn_app(AppConfig::default());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
