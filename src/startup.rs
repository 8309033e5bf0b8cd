use crate::config::ConfigError;
use crate::db::connection::{DbPool, pool_stats};
use crate::polls::{create_poll, delete_poll, get_poll, list_polls, update_poll, vote_on_poll};
use crate::service::PollService;
use crate::ws::ConnectionRegistry;
use axum::{
    Json, Router,
    extract::Extension,
    http::{
        StatusCode,
        header::{ACCEPT, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use thiserror::Error;
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("database unavailable: {0}")]
    Database(#[from] sqlx::Error),
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub polls: PollService,
    pub registry: ConnectionRegistry,
}

pub fn api_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/polls", post(create_poll).get(list_polls))
        .route(
            "/polls/:id",
            get(get_poll).put(update_poll).delete(delete_poll),
        )
        .route("/polls/:id/vote", post(vote_on_poll))
        .layer(Extension(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_credentials(true)
                .allow_methods([
                    axum::http::Method::POST,
                    axum::http::Method::GET,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([CONTENT_TYPE, ACCEPT]),
        )
        .layer(TraceLayer::new_for_http())
        .fallback(handler_404)
}

async fn health(Extension(app_state): Extension<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "observers": app_state.registry.len().await,
    }))
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}

/// Periodically checks out a pooled connection so a dead database shows up
/// in the logs before the next vote hits it.
pub fn spawn_db_health_check(db: DbPool, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.cancelled() => break,
            }
            match db.acquire().await {
                Ok(conn) => {
                    drop(conn);
                    debug!("{}", pool_stats(&db));
                }
                Err(e) => {
                    error!("Database connection health check failed: {}", e);
                }
            }
        }
    });
}

/// Cancels `shutdown` on Ctrl-C or SIGTERM.
pub async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => return,
    }

    info!("shutdown requested");
    shutdown.cancel();
}
