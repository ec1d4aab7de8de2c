//! Read-only status API
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - Reads the registry, the health store, the queue and the dispatch
//!   counters directly; it never mutates pipeline state
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Liveness (never requires auth)
//! - `GET /api/v1/stats` - Dispatch counters, queue depth, store health
//! - `GET /api/v1/monitors` - Every monitor with its current record
//! - `GET /api/v1/monitors/:id` - One monitor
//! - `GET /api/v1/monitors/:id/history?limit=N` - Recent checks, newest first

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{HealthResponse, HistoryResponse, MonitorStatus, MonitorsResponse, StatsResponse};

pub use crate::config::ApiConfig;

use std::net::SocketAddr;

use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the router without binding it
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    let mut protected = Router::new()
        .route("/api/v1/stats", get(routes::stats::get_stats))
        .route("/api/v1/monitors", get(routes::monitors::list_monitors))
        .route("/api/v1/monitors/:id", get(routes::monitors::get_monitor))
        .route(
            "/api/v1/monitors/:id/history",
            get(routes::monitors::get_history),
        );

    if let Some(token) = config.auth_token.clone() {
        protected = protected.route_layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// Starts an Axum HTTP server in a background task and returns the bound
/// address (useful with port 0).
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
