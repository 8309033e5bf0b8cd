use crate::config::Config;
use crate::db::{MemoryPollStore, PgPollStore, PollStore, init_db};
use crate::service::PollService;
use crate::startup::{AppState, StartupError, api_router, shutdown_signal, spawn_db_health_check};
use crate::ws::{Broadcaster, ConnectionRegistry, LiveState, live_router, results_channel};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[macro_use]
extern crate tracing;

mod config;
mod db;
mod error;
mod polls;
mod service;
mod startup;
mod ws;

#[tokio::main]
async fn main() {
    // a missing .env is fine, the process environment still applies
    let _ = dotenvy::dotenv();

    // initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = Config::from_env()?;
    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let store: Arc<dyn PollStore> = match &config.database_url {
        Some(url) => {
            let pool = init_db(url, config.database_max_connections).await?;
            spawn_db_health_check(pool.clone(), shutdown.clone());
            Arc::new(PgPollStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, polls are kept in memory only");
            Arc::new(MemoryPollStore::new())
        }
    };

    // Create the live results pipeline
    let (results_tx, results_rx) = results_channel();
    let registry = ConnectionRegistry::new();
    let broadcaster = tokio::spawn(
        Broadcaster::new(registry.clone(), results_rx, config.broadcast_write_timeout).run(),
    );

    let polls = PollService::new(
        store,
        results_tx,
        config.store_timeout,
        config.serialize_votes,
    );
    if config.serialize_votes {
        info!("votes on the same poll are serialized");
    }

    let api = api_router(AppState {
        polls,
        registry: registry.clone(),
    });
    let live = live_router(LiveState {
        registry: registry.clone(),
        shutdown: shutdown.clone(),
    });

    let api_listener = TcpListener::bind(config.api_addr()).await?;
    info!("API listening on {}", config.api_addr());
    let live_listener = TcpListener::bind(config.websocket_addr()).await?;
    info!("websocket server listening on {}", config.websocket_addr());

    let api_server = tokio::spawn(serve_until_shutdown(
        "API",
        api_listener,
        api,
        shutdown.clone(),
    ));
    let live_server = tokio::spawn(serve_until_shutdown(
        "websocket",
        live_listener,
        live,
        shutdown.clone(),
    ));

    // The API server owns the last results sender, so once it has drained the
    // results channel closes and the broadcaster runs to completion.
    let api_result = join_server(api_server).await;
    if let Err(e) = broadcaster.await {
        error!("broadcaster task failed: {}", e);
    }
    let live_result = join_server(live_server).await;

    registry.close_all().await;
    info!("shutdown complete");

    api_result.and(live_result)
}

/// Serves `router` until `shutdown` fires. A listener that fails cancels
/// `shutdown` so the other one stops too.
async fn serve_until_shutdown(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let signal = shutdown.clone();
    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await;

    if let Err(e) = &result {
        error!("{} server failed: {}", name, e);
        shutdown.cancel();
    }
    info!("{} server stopped", name);

    result
}

async fn join_server(server: JoinHandle<std::io::Result<()>>) -> Result<(), StartupError> {
    match server.await {
        Ok(result) => Ok(result?),
        Err(e) => Err(StartupError::Io(std::io::Error::other(e))),
    }
}
