use std::{path::Path, sync::Arc};

use axum::{
    extract::{
        Query, State,
        ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;

use crate::{server::AppState, transport::websocket_server::handle_socket};

/// Served when the static directory has no control surface.
const BUILTIN_SURFACE: &str = include_str!("../../../static/overlay.html");

#[derive(Debug, Default, Deserialize)]
pub struct SurfaceQuery {
    pub view: Option<String>,
}

/// GET /
///
/// Websocket upgrades become viewer connections; plain requests get the
/// control surface document.
pub async fn root(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Query(query): Query<SurfaceQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state)),
        Err(_) => serve_surface(&state.config.server.static_dir, query.view.as_deref())
            .await
            .into_response(),
    }
}

/// Tries `<view>.html`, then `overlay.html`, then the built-in document.
async fn serve_surface(static_dir: &str, view: Option<&str>) -> Html<String> {
    for name in surface_candidates(view) {
        let path = Path::new(static_dir).join(&name);
        if let Ok(body) = tokio::fs::read_to_string(&path).await {
            debug!("serving control surface {}", path.display());
            return Html(body);
        }
    }
    Html(BUILTIN_SURFACE.to_string())
}

/// File names to look for, most specific first. View names are restricted
/// to `[A-Za-z0-9_-]` so they cannot leave the static directory.
pub fn surface_candidates(view: Option<&str>) -> Vec<String> {
    let mut names = Vec::with_capacity(2);
    if let Some(view) = view.map(str::trim).filter(|v| is_safe_view(v)) {
        if view != "overlay" {
            names.push(format!("{}.html", view));
        }
    }
    names.push("overlay.html".to_string());
    names
}

fn is_safe_view(view: &str) -> bool {
    !view.is_empty()
        && view
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_candidates() {
        assert_eq!(surface_candidates(Some("remote")), vec!["remote.html", "overlay.html"]);
        assert_eq!(surface_candidates(None), vec!["overlay.html"]);
        assert_eq!(surface_candidates(Some("overlay")), vec!["overlay.html"]);
    }

    #[test]
    fn test_view_cannot_escape_static_dir() {
        assert_eq!(surface_candidates(Some("../secrets")), vec!["overlay.html"]);
        assert_eq!(surface_candidates(Some("a/b")), vec!["overlay.html"]);
        assert_eq!(surface_candidates(Some("")), vec!["overlay.html"]);
    }

    #[tokio::test]
    async fn test_missing_static_dir_serves_builtin() {
        let Html(body) = serve_surface("/nonexistent/groovelink-static", Some("remote")).await;
        assert_eq!(body, BUILTIN_SURFACE);
    }
}
