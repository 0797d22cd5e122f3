use axum::{
    http::{header, Method},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::mysql::MySqlPoolOptions;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oauth2_server::config::{AppState, Config};
use oauth2_server::handlers::oauth::{
    authorize_decision_handler, authorize_handler, callback_handler, dialog_handler,
    inspect_handler, purge_handler, token_handler,
};

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check - verifies database connection
async fn ready_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthResponse>, axum::http::StatusCode> {
    sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .map_err(|_| axum::http::StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(HealthResponse {
        status: "ready",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Create the application router with all routes configured
///
/// # Routes
///
/// ## OAuth routes (no session required; client authentication per request)
/// - GET  /oauth/authorize - Front-channel authorization request
/// - GET  /oauth/dialog    - Login dialog for a pending authorization
/// - POST /oauth/authorize - Dialog form submission
/// - POST /oauth/token     - Token issuance
/// - GET  /oauth/callback  - Diagnostic echo
/// - POST /oauth/inspect   - Stub (501)
/// - POST /oauth/purge     - Stub (501)
///
/// ## Operational routes
/// - GET /health - Liveness probe
/// - GET /ready  - Readiness probe (database ping)
pub fn create_router(state: AppState) -> Router {
    let oauth_routes = Router::new()
        .route("/authorize", get(authorize_handler).post(authorize_decision_handler))
        .route("/dialog", get(dialog_handler))
        .route("/token", post(token_handler))
        .route("/callback", get(callback_handler))
        .route("/inspect", post(inspect_handler))
        .route("/purge", post(purge_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .nest("/oauth", oauth_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                ])
                .max_age(Duration::from_secs(3600)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oauth2_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Create database pool with production settings
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Get socket address before moving config
    let addr = config.socket_addr();

    // Create app state
    let state = AppState::new(pool, config);

    // Build router
    let app = create_router(state);

    // Start server with graceful shutdown
    tracing::info!(
        "OAuth2 server v{} listening on {}",
        env!("CARGO_PKG_VERSION"),
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
