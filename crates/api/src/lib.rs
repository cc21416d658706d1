mod auth;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::{broadcast, watch};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use common::{BarStore, Result, SignalUpdate};
use strategy::StrategySet;

/// Shared application state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BarStore>,
    pub strategies: Arc<StrategySet>,
    pub dashboard_token: String,
    /// Latest signals published by the streaming loop.
    pub update_tx: broadcast::Sender<SignalUpdate>,
    /// Default history window for the signal endpoints.
    pub lookback_mins: i64,
}

/// The full dashboard router with CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .merge(routes::signals_router(state.clone()))
        .merge(routes::ws_router())
        .merge(routes::health_router())
        .with_state(state)
        .layer(cors)
}

/// Bind and serve until `shutdown` turns `true`.
pub async fn serve(state: AppState, port: u16, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Dashboard API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("Dashboard API stopped");
    Ok(())
}
