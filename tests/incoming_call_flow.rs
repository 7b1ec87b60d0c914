//! End-to-end exercise of the rendezvous engine's six scenarios (spec §8):
//! happy ack, device declines, device times out, late response, unknown
//! call id, no registered device.
//!
//! These need a live Postgres the way the teacher's own `server/tests/`
//! suite does - set `TEST_DATABASE_URL` and run migrations first:
//!
//! ```bash
//! export TEST_DATABASE_URL="postgres://localhost/callwake_test"
//! sqlx migrate run --source ./migrations --database-url "$TEST_DATABASE_URL"
//! cargo test --test incoming_call_flow
//! ```
//!
//! Tests skip themselves (printing why) when `TEST_DATABASE_URL` isn't set,
//! matching the teacher's federation test suite.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::Router;
use callwake_middleware::coordinator::Coordinator;
use callwake_middleware::db::DbConfig;
use callwake_middleware::device::DeviceRepository;
use callwake_middleware::handlers;
use callwake_middleware::intake::ResponseIntake;
use callwake_middleware::middleware::upstream_auth::AllowAllVerifier;
use callwake_middleware::push::PushDispatcher;
use callwake_middleware::response_log::ResponseLogWriter;
use callwake_middleware::state::AppState;
use callwake_middleware::store::{MemoryStore, RendezvousStore};
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("Skipping test: TEST_DATABASE_URL not set");
        return None;
    };

    let config = DbConfig {
        database_url,
        max_connections: 5,
        min_connections: 1,
        acquire_timeout: Duration::from_secs(10),
        idle_timeout: Duration::from_secs(60),
    };

    Some(
        callwake_middleware::db::init_db(config)
            .await
            .expect("failed to init test database"),
    )
}

async fn cleanup_device(pool: &PgPool, sip_user_id: &str) {
    let _ = sqlx::query("DELETE FROM devices WHERE sip_user_id = $1")
        .bind(sip_user_id)
        .execute(pool)
        .await;
}

fn test_config(wait_ms: u64, resend_ms: u64) -> callwake_middleware::config::Config {
    callwake_middleware::config::Config {
        push_roundtrip_wait: Duration::from_millis(wait_ms),
        push_resend_interval: Duration::from_millis(resend_ms),
        app_api_url: "http://localhost:8080/".to_string(),
        cert_dir: String::new(),
        redis_server_list: vec![],
        apns2_sip_user_ids: HashSet::new(),
        server_port: 8080,
        database_url: String::new(),
        // Left unset on purpose: FCM/APNs transports fail fast with
        // `AuthFail` rather than reaching a real network, per `push/fcm.rs`.
        apns_key_path: None,
        apns_key_id: None,
        apns_team_id: None,
        apns_topic: None,
        apns_production: false,
        fcm_api_key: None,
        gcm_api_key: None,
        enable_metrics: false,
        upstream_auth_url: None,
    }
}

fn build_router(pool: PgPool, config: callwake_middleware::config::Config) -> Router {
    let store: Arc<dyn RendezvousStore> = Arc::new(MemoryStore::new());
    let devices = DeviceRepository::new(pool.clone());
    let dispatcher = Arc::new(PushDispatcher::new(&config));
    let response_log = ResponseLogWriter::new(pool.clone());

    let coordinator = Arc::new(Coordinator::new(
        devices.clone(),
        store.clone(),
        dispatcher,
        config.clone(),
    ));
    let intake = Arc::new(ResponseIntake::new(store, response_log, config.clone()));

    let state = AppState {
        coordinator,
        intake,
        devices,
        db_pool: pool,
    };

    let verifier: Arc<dyn callwake_middleware::middleware::upstream_auth::UpstreamVerifier> =
        Arc::new(AllowAllVerifier);
    let hangup_router = Router::new()
        .route("/hangup-reason", post(handlers::hangup_reason::hangup_reason))
        .route_layer(axum::middleware::from_fn_with_state(
            verifier,
            callwake_middleware::middleware::upstream_auth::upstream_auth_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .route("/incoming-call", post(handlers::incoming_call::incoming_call))
        .route("/call-response", post(handlers::response::call_response))
        .route("/devices", post(handlers::device::register_device))
        .with_state(state)
        .merge(hangup_router)
}

async fn post_form(app: &Router, path: &str, body: String) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("failed to build request");

    let response = app.clone().oneshot(request).await.expect("request failed");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    (status, String::from_utf8_lossy(&bytes).to_string())
}

async fn register_fcm_device(app: &Router, sip_user_id: &str) {
    let (status, _) = post_form(
        app,
        "/devices",
        format!("sip_user_id={sip_user_id}&token=test-token-{sip_user_id}&platform=fcm"),
    )
    .await;
    assert!(status == StatusCode::CREATED || status == StatusCode::OK);
}

fn now_as_secs_f64() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

#[tokio::test]
async fn happy_path_device_acks_before_deadline() {
    let Some(pool) = test_pool().await else { return };
    let sip_user_id = "100000101";
    cleanup_device(&pool, sip_user_id).await;

    let app = build_router(pool.clone(), test_config(400, 100));
    register_fcm_device(&app, sip_user_id).await;

    let call_id = "test-call-ack".to_string();
    let responder_app = app.clone();
    let responder_call_id = call_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let body = format!(
            "unique_key={responder_call_id}&message_start_time={}&available=true",
            now_as_secs_f64()
        );
        post_form(&responder_app, "/call-response", body).await;
    });

    let (status, body) = post_form(
        &app,
        "/incoming-call",
        format!("sip_user_id={sip_user_id}&caller_id=0611111111&phonenumber=0622222222&call_id={call_id}"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "status=ACK");

    cleanup_device(&pool, sip_user_id).await;
}

#[tokio::test]
async fn device_declines_before_deadline() {
    let Some(pool) = test_pool().await else { return };
    let sip_user_id = "100000102";
    cleanup_device(&pool, sip_user_id).await;

    let app = build_router(pool.clone(), test_config(400, 100));
    register_fcm_device(&app, sip_user_id).await;

    let call_id = "test-call-decline".to_string();
    let responder_app = app.clone();
    let responder_call_id = call_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let body = format!(
            "unique_key={responder_call_id}&message_start_time={}&available=false",
            now_as_secs_f64()
        );
        post_form(&responder_app, "/call-response", body).await;
    });

    let (status, body) = post_form(
        &app,
        "/incoming-call",
        format!("sip_user_id={sip_user_id}&caller_id=0611111111&phonenumber=0622222222&call_id={call_id}"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "status=NAK");

    cleanup_device(&pool, sip_user_id).await;
}

#[tokio::test]
async fn device_never_responds_times_out() {
    let Some(pool) = test_pool().await else { return };
    let sip_user_id = "100000103";
    cleanup_device(&pool, sip_user_id).await;

    let app = build_router(pool.clone(), test_config(150, 50));
    register_fcm_device(&app, sip_user_id).await;

    let (status, body) = post_form(
        &app,
        "/incoming-call",
        format!("sip_user_id={sip_user_id}&caller_id=0611111111&phonenumber=0622222222&call_id=test-call-timeout"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "status=NAK");

    cleanup_device(&pool, sip_user_id).await;
}

#[tokio::test]
async fn response_after_store_expiry_is_rejected() {
    let Some(pool) = test_pool().await else { return };
    let sip_user_id = "100000104";
    cleanup_device(&pool, sip_user_id).await;

    let app = build_router(pool.clone(), test_config(80, 40));
    register_fcm_device(&app, sip_user_id).await;

    let call_id = "test-call-late".to_string();
    let (status, body) = post_form(
        &app,
        "/incoming-call",
        format!("sip_user_id={sip_user_id}&caller_id=0611111111&phonenumber=0622222222&call_id={call_id}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "status=NAK");

    // Let the rendezvous slot's TTL lapse before the device finally answers.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let (status, _) = post_form(
        &app,
        "/call-response",
        format!("unique_key={call_id}&message_start_time={}&available=true", now_as_secs_f64()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    cleanup_device(&pool, sip_user_id).await;
}

#[tokio::test]
async fn unknown_call_id_is_rejected() {
    let Some(pool) = test_pool().await else { return };

    let app = build_router(pool, test_config(400, 100));

    let (status, _) = post_form(
        &app,
        "/call-response",
        format!("unique_key=never-existed&message_start_time={}&available=true", now_as_secs_f64()),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn call_to_unregistered_device_returns_nak_immediately() {
    let Some(pool) = test_pool().await else { return };
    let sip_user_id = "100000105";
    cleanup_device(&pool, sip_user_id).await;

    // A generous deadline that the assertion below would time out on if the
    // Coordinator mistakenly entered its wait loop instead of NAK-ing early.
    let app = build_router(pool.clone(), test_config(5000, 1000));

    let start = std::time::Instant::now();
    let (status, body) = post_form(
        &app,
        "/incoming-call",
        format!("sip_user_id={sip_user_id}&caller_id=0611111111&phonenumber=0622222222&call_id=test-call-no-device"),
    )
    .await;
    let elapsed = start.elapsed();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "status=NAK");
    assert!(elapsed < Duration::from_millis(500), "no-device path must not enter the wait loop");
}

#[tokio::test]
async fn hangup_reason_requires_bearer_token() {
    let Some(pool) = test_pool().await else { return };
    let sip_user_id = "100000106";
    cleanup_device(&pool, sip_user_id).await;

    let app = build_router(pool.clone(), test_config(400, 100));
    register_fcm_device(&app, sip_user_id).await;

    let request = Request::builder()
        .method("POST")
        .uri("/hangup-reason")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(format!(
            "sip_user_id={sip_user_id}&unique_key=test-call-hangup&reason=busy"
        )))
        .expect("failed to build request");
    let response = app.clone().oneshot(request).await.expect("request failed");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/hangup-reason")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("authorization", "Bearer any-non-empty-token")
        .body(Body::from(format!(
            "sip_user_id={sip_user_id}&unique_key=test-call-hangup&reason=busy"
        )))
        .expect("failed to build request");
    let response = app.clone().oneshot(request).await.expect("request failed");
    assert_eq!(response.status(), StatusCode::OK);

    cleanup_device(&pool, sip_user_id).await;
}
