use crate::api;
use crate::config::WidgetConfig;
use axum::Router;
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<WidgetConfig>,
}

impl AppState {
    pub fn new(config: WidgetConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let enable_cors = state.config.enable_cors;
    let router = Router::new()
        .route("/", get(api::serve_page))
        .route("/ping", get(api::ping))
        .route("/api/widget/config", get(api::get_widget_config))
        .route("/widget/globals.js", get(api::serve_globals))
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

pub async fn run(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "page host listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
