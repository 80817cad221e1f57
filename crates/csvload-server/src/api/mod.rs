//! HTTP surface: router assembly and the serve loop

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::{future::IntoFuture, net::SocketAddr, time::Duration};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::error::ServerResult;
use crate::features::{self, FeatureState};
use crate::middleware;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub features: FeatureState,
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState, config: &Config) -> Router {
    let feature_routes = features::router(state.features.clone());

    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
        .merge(feature_routes)
        // Apply layers from innermost to outermost
        .layer(DefaultBodyLimit::max(config.upload.max_body_bytes))
        .layer(middleware::timeout_layer(config.server.request_timeout_secs))
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

pub async fn serve(config: Config, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("running on port {}", addr.port());

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn(
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future(),
    );

    tokio::select! {
        joined = &mut server => return Ok(joined??),
        _ = shutdown_signal() => shutdown.cancel(),
    }

    let grace = Duration::from_secs(config.server.shutdown_timeout_secs);
    info!("Waiting up to {} seconds for connections to close", grace.as_secs());

    if drain(&mut server, grace).await? {
        info!("Server shut down gracefully");
    }
    Ok(())
}

/// Give the server `grace` to finish open connections. `false` when it had to be aborted.
async fn drain(server: &mut JoinHandle<std::io::Result<()>>, grace: Duration) -> anyhow::Result<bool> {
    match tokio::time::timeout(grace, &mut *server).await {
        Ok(joined) => {
            joined??;
            Ok(true)
        },
        Err(_) => {
            warn!("Connections still open after {} seconds, closing", grace.as_secs());
            server.abort();
            Ok(false)
        },
    }
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> ServerResult<Response> {
    db::health_check(&state.db).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "database": "connected"
        })),
    )
        .into_response())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received terminate signal, starting graceful shutdown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_drain_returns_once_server_stops() {
        let mut server = tokio::spawn(async { Ok(()) });
        assert!(drain(&mut server, Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_aborts_after_grace_period() {
        let mut server = tokio::spawn(std::future::pending::<std::io::Result<()>>());
        let started = tokio::time::Instant::now();

        assert!(!drain(&mut server, Duration::from_secs(30)).await.unwrap());
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(server.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_drain_reports_server_error() {
        let mut server = tokio::spawn(async { Err(std::io::Error::other("accept failed")) });
        assert!(drain(&mut server, Duration::from_secs(1)).await.is_err());
    }
}
