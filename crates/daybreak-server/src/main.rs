use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use daybreak_api::alarms;
use daybreak_api::auth::{self, AppState, AppStateInner};
use daybreak_api::middleware::require_auth;
use daybreak_engine::AlarmEngine;
use daybreak_engine::storage::SelfieVault;
use daybreak_light::{LumaAnalyzer, MAX_IMAGE_BYTES};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daybreak=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("DAYBREAK_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("DAYBREAK_DB_PATH").unwrap_or_else(|_| "daybreak.db".into());
    let upload_dir =
        std::env::var("DAYBREAK_UPLOAD_DIR").unwrap_or_else(|_| "uploads/selfies".into());
    let host = std::env::var("DAYBREAK_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("DAYBREAK_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init persistence and the lifecycle engine
    let db = Arc::new(daybreak_db::Database::open(&PathBuf::from(&db_path))?);
    let vault = Arc::new(SelfieVault::new(PathBuf::from(upload_dir)).await?);
    let engine = AlarmEngine::new(db.clone(), vault, Arc::new(LumaAnalyzer));

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        engine,
        jwt_secret,
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/alarms", post(alarms::create_alarm).get(alarms::list_alarms))
        .route("/alarms/active", get(alarms::list_active_alarms))
        .route(
            "/alarms/{alarm_id}",
            put(alarms::update_alarm).delete(alarms::delete_alarm),
        )
        .route(
            "/alarms/{alarm_id}/selfie",
            post(alarms::submit_selfie)
                // Multipart framing overhead on top of the image cap
                .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 16 * 1024)),
        )
        .route("/alarms/{alarm_id}/selfies", get(alarms::list_selfies))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Daybreak server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// GET /health — liveness check (no auth).
async fn health() -> &'static str {
    "ok"
}
