use axum::{
    routing::{get, post},
    Router,
};
use callwake_middleware::{
    config::Config,
    coordinator::Coordinator,
    db,
    device::DeviceRepository,
    handlers, health,
    intake::ResponseIntake,
    metrics, middleware,
    middleware::upstream_auth::{AllowAllVerifier, HttpUpstreamVerifier, UpstreamVerifier},
    push::PushDispatcher,
    response_log::ResponseLogWriter,
    state::AppState,
    store::{MemoryStore, RedisStore, RendezvousStore},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::time::{interval, Duration};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            "debug".to_string()
        }
        #[cfg(not(debug_assertions))]
        {
            "warn".to_string()
        }
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_level))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("starting call-wakeup middleware");

    let config = Config::from_env();
    tracing::info!(
        push_roundtrip_wait_ms = config.push_roundtrip_wait.as_millis() as u64,
        push_resend_interval_ms = config.push_resend_interval.as_millis() as u64,
        max_attempts = config.max_attempts(),
        "rendezvous timing configured"
    );

    let metrics_recorder = metrics::MetricsRecorder::new();
    let metrics_handle = metrics_recorder.handle().clone();

    let db_pool = db::init_db(db::DbConfig {
        database_url: config.database_url.clone(),
        ..db::DbConfig::default()
    })
    .await?;
    tracing::info!("database initialized");

    // The rendezvous store is local-process unless a Redis cluster is
    // configured for a horizontally scaled deployment.
    let store: Arc<dyn RendezvousStore> = if config.redis_server_list.is_empty() {
        tracing::info!("using in-process rendezvous store");
        Arc::new(MemoryStore::new())
    } else {
        tracing::info!(hosts = ?config.redis_server_list, "using Redis-backed rendezvous store");
        Arc::new(RedisStore::connect(&config.redis_server_list).await?)
    };

    let devices = DeviceRepository::new(db_pool.clone());
    let dispatcher = Arc::new(PushDispatcher::new(&config));
    let response_log = ResponseLogWriter::new(db_pool.clone());

    let coordinator = Arc::new(Coordinator::new(
        devices.clone(),
        store.clone(),
        dispatcher,
        config.clone(),
    ));
    let intake = Arc::new(ResponseIntake::new(store.clone(), response_log, config.clone()));

    let app_state = AppState {
        coordinator,
        intake,
        devices,
        db_pool: db_pool.clone(),
    };

    // Rate-limiter bucket cleanup, mirrored from the teacher's periodic
    // worker - stale per-IP buckets would otherwise grow unbounded.
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(300));
        loop {
            ticker.tick().await;
            middleware::rate_limit::IP_LIMITER
                .cleanup_old_buckets(Duration::from_secs(600))
                .await;
            tracing::debug!("rate limiter cleanup completed");
        }
    });

    let metrics_router = if config.enable_metrics {
        Router::new()
            .route("/metrics", get(metrics::metrics_handler))
            .with_state(metrics_handle)
    } else {
        Router::new()
    };

    // `/hangup-reason` is the only bearer-authenticated route - gated by its
    // own `route_layer` so the check never touches the other, unauthenticated
    // endpoints.
    let verifier: Arc<dyn UpstreamVerifier> = match &config.upstream_auth_url {
        Some(url) => Arc::new(HttpUpstreamVerifier::new(url.clone())),
        None => Arc::new(AllowAllVerifier),
    };
    let hangup_router = Router::new()
        .route("/hangup-reason", post(handlers::hangup_reason::hangup_reason))
        .route_layer(axum::middleware::from_fn_with_state(
            verifier,
            middleware::upstream_auth::upstream_auth_middleware,
        ))
        .with_state(app_state.clone());

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/incoming-call", post(handlers::incoming_call::incoming_call))
        .route("/call-response", post(handlers::response::call_response))
        .route("/devices", post(handlers::device::register_device))
        .route("/devices/delete", post(handlers::device::unregister_device))
        .with_state(app_state)
        .merge(hangup_router)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(middleware::logging::log_headers_middleware))
        .layer(axum::middleware::from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(axum::middleware::from_fn(metrics::track_request_metrics));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
