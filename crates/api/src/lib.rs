//! REST API for the emotion-aware companion.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check (never requires authentication)
//! - `POST /chat` - Chat turn with emotion tracking
//! - `POST /analyze_emotion` - Classify and record a text
//! - `GET /emotions/{user_name}` - Recent emotion records
//! - `POST /coach` - Coaching message for a text
//! - `GET /memory/{user_name}` - Stored conversation
//! - `DELETE /memory/{user_name}` - Forget the conversation
//!
//! # Security
//!
//! - Optional bearer token authentication
//! - Request body size limit (default 64 KiB)
//! - Configurable CORS origins

pub mod auth;
pub mod routes;
pub mod state;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use companion_coordinator::ServerConfig;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use auth::ApiKeyConfig;
pub use state::AppState;

/// Create the API router with all routes and middleware configured.
pub fn create_router(state: Arc<AppState>, server: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(routes::health))
        .route("/chat", post(routes::chat))
        .route("/analyze_emotion", post(routes::analyze_emotion))
        .route("/emotions/{user_name}", get(routes::recent_emotions))
        .route("/coach", post(routes::coach))
        .route(
            "/memory/{user_name}",
            get(routes::get_memory).delete(routes::delete_memory),
        )
        .with_state(state);

    if let Some(ref key) = server.api_key {
        router = router.layer(middleware::from_fn_with_state(
            ApiKeyConfig::new(key.clone()),
            auth::api_key_auth,
        ));
    }

    router
        .layer(RequestBodyLimitLayer::new(server.body_limit_bytes))
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Any origin when the list is empty or contains `*`.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Start the API server and run until Ctrl+C or SIGTERM.
pub async fn serve(state: Arc<AppState>, server: &ServerConfig) -> anyhow::Result<()> {
    let router = create_router(state, server);
    let addr = server.bind_addr();

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "Starting companion API server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
