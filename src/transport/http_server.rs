use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{
    configs::ServerConfig,
    server::AppState,
    transport::{
        middleware::add_response_headers,
        routes::{get_health, get_version, root},
    },
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(get_health))
        .route("/version", get(get_version))
        .layer(middleware::from_fn(add_response_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the configured port, or the fallback port when it is taken.
pub async fn bind(config: &ServerConfig) -> std::io::Result<TcpListener> {
    let primary = format!("{}:{}", config.host, config.port);
    match TcpListener::bind(&primary).await {
        Ok(listener) => Ok(listener),
        Err(e) if config.fallback_port != config.port => {
            warn!(
                "could not bind {} ({}), trying port {}",
                primary, e, config.fallback_port
            );
            TcpListener::bind(format!("{}:{}", config.host, config.fallback_port)).await
        }
        Err(e) => Err(e),
    }
}
