mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{new_log, test_config, RecordingDirectory, ScriptedProvider};
use identity_service::{build_router, services::JwksVerifier, AppState};
use jsonwebtoken::{encode, jwk::JwkSet, EncodingKey, Header};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;
use uuid::Uuid;

const SIGNING_SECRET: &[u8] = b"jwks-test-signing-secret-for-verifier";

struct TestApp {
    router: Router,
    directory: Arc<RecordingDirectory>,
}

fn setup() -> TestApp {
    let config = test_config();
    let log = new_log();
    let provider = Arc::new(
        ScriptedProvider::new(log.clone()).with_account("kc-1", "alice", "alice@example.com", "alice-password"),
    );
    let directory = Arc::new(RecordingDirectory::new(log));

    let keys: JwkSet = serde_json::from_value(json!({
        "keys": [{
            "kty": "oct",
            "kid": "k1",
            "alg": "HS256",
            "k": "andrcy10ZXN0LXNpZ25pbmctc2VjcmV0LWZvci12ZXJpZmllcg"
        }]
    }))
    .unwrap();
    let verifier = JwksVerifier::new(&config).unwrap().with_key_set(keys);

    let state = AppState::new(&config, provider, directory.clone(), Arc::new(verifier));

    TestApp {
        router: build_router(state),
        directory,
    }
}

fn bearer(username: Option<&str>, roles: &[&str]) -> String {
    let mut claims = json!({
        "iss": "http://localhost:8180/realms/shop",
        "exp": chrono::Utc::now().timestamp() + 300,
        "resource_access": { "shop-api": { "roles": roles } }
    });
    if let Some(username) = username {
        claims["preferred_username"] = json!(username);
    }

    let mut header = Header::default();
    header.kid = Some("k1".to_string());
    let token = encode(&header, &claims, &EncodingKey::from_secret(SIGNING_SECRET)).unwrap();
    format!("Bearer {}", token)
}

async fn get(router: &Router, uri: &str, authorization: Option<String>) -> (StatusCode, Value) {
    let mut request = Request::builder().uri(uri);
    if let Some(value) = authorization {
        request = request.header("Authorization", value);
    }

    let response = router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn post_json(router: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_is_public() {
    let app = setup();
    let (status, body) = get(&app.router, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["directory"], "memory");
}

#[tokio::test]
async fn test_health_reports_unreachable_database() {
    let config = test_config();
    let log = new_log();
    let verifier = JwksVerifier::new(&config).unwrap();
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy("postgres://identity@127.0.0.1:9/identity")
        .unwrap();

    let state = AppState::new(
        &config,
        Arc::new(ScriptedProvider::new(log.clone())),
        Arc::new(RecordingDirectory::new(log)),
        Arc::new(verifier),
    )
    .with_database(pool);

    let (status, body) = get(&build_router(state), "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_register_then_read_own_profile() {
    let app = setup();

    let (status, session) = post_json(
        &app.router,
        "/auth/register",
        r#"{"username":"bob","email":"bob@example.com","first_name":"Bob","password":"bob-password"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["username"], "bob");
    assert!(session["access_token"].is_string());

    let (status, profile) = get(
        &app.router,
        "/auth/profile",
        Some(bearer(Some("bob"), &["user"])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["username"], "bob");
    assert_eq!(profile["email"], "bob@example.com");
    assert_eq!(profile["id"], session["user_id"]);
    assert!(profile.get("external_id").is_none());
}

#[tokio::test]
async fn test_mixed_case_registration_then_profile() {
    let app = setup();

    let (status, session) = post_json(
        &app.router,
        "/auth/register",
        r#"{"username":"Dave","email":"Dave@Example.com","password":"dave-password"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["username"], "dave");

    // The provider issues the lowercase form as the principal.
    let (status, profile) = get(
        &app.router,
        "/auth/profile",
        Some(bearer(Some("dave"), &["user"])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["id"], session["user_id"]);
    assert_eq!(profile["email"], "dave@example.com");
}

#[tokio::test]
async fn test_bearer_scheme_is_case_insensitive() {
    let app = setup();
    app.directory
        .seed("kc-1", "alice", "alice@example.com")
        .await;

    let token = bearer(Some("alice"), &["user"]);
    let lowercase = token.replacen("Bearer", "bearer", 1);

    let (status, profile) = get(&app.router, "/auth/profile", Some(lowercase)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["username"], "alice");
}

#[tokio::test]
async fn test_duplicate_registration_is_conflict() {
    let app = setup();

    let (status, body) = post_json(
        &app.router,
        "/auth/register",
        r#"{"username":"alice","email":"new@example.com","password":"alice-password"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "username already exists");
}

#[tokio::test]
async fn test_invalid_registration_body() {
    let app = setup();

    let (status, _) = post_json(
        &app.router,
        "/auth/register",
        r#"{"username":"bob","email":"not-an-email","password":"bob-password"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = post_json(&app.router, "/auth/register", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_failure_is_generic_unauthorized() {
    let app = setup();
    app.directory
        .seed("kc-1", "alice", "alice@example.com")
        .await;

    let (status, body) = post_json(
        &app.router,
        "/auth/login",
        r#"{"username":"alice","password":"wrong-password"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");

    let (status, session) = post_json(
        &app.router,
        "/auth/login",
        r#"{"username":"alice","password":"alice-password"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let refresh = json!({ "refresh_token": session["refresh_token"] }).to_string();
    let (status, refreshed) = post_json(&app.router, "/auth/refresh", &refresh).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["user_id"], session["user_id"]);
}

#[tokio::test]
async fn test_profile_requires_bearer_token() {
    let app = setup();

    let (status, _) = get(&app.router, "/auth/profile", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(
        &app.router,
        "/auth/profile",
        Some("Bearer not-a-token".to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Verified token without the principal claim.
    let (status, _) = get(&app.router, "/auth/profile", Some(bearer(None, &["user"]))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_requires_user_role() {
    let app = setup();
    app.directory
        .seed("kc-1", "alice", "alice@example.com")
        .await;

    let (status, _) = get(&app.router, "/auth/profile", Some(bearer(Some("alice"), &[]))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_profile_lookup() {
    let app = setup();
    let user_id = app
        .directory
        .seed("kc-1", "alice", "alice@example.com")
        .await;
    let uri = format!("/auth/profile/{}", user_id);

    let (status, _) = get(&app.router, &uri, Some(bearer(Some("carol"), &["user"]))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = bearer(Some("carol"), &["user", "admin"]);

    let (status, profile) = get(&app.router, &uri, Some(admin.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["username"], "alice");

    let (status, _) = get(
        &app.router,
        &format!("/auth/profile/{}", Uuid::new_v4()),
        Some(admin.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app.router, "/auth/profile/not-a-uuid", Some(admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
