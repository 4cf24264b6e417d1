//! HTTP Surface: axum routes over the Session Store, Configuration, Deployment Store,
//! and Conversation Store. Plain HTTP + SSE routes behind one shared state handle, a router
//! builder, and a `run_serve`/`run_serve_on_listener` split so tests can bind an ephemeral
//! port; CORS, request-tracing middleware, and a fatal frontend-directory-missing startup
//! check round out the surface.

mod client;
pub mod error;
mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use okcvm_config::Configuration;
use okcvm_conversation::Store as ConversationStore;
use okcvm_core::SessionStore;
use okcvm_deploy::Store as DeployStore;

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("frontend directory not found: {0}")]
    FrontendMissing(PathBuf),
    #[error("bind error: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state handed to every route. Cheaply cloneable: every field is already an `Arc`/
/// internally-guarded handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Configuration,
    pub sessions: Arc<SessionStore>,
    pub deployments: DeployStore,
    pub conversations: Arc<ConversationStore>,
    pub ui_dir: PathBuf,
}

/// Fatal startup check. Callers abort the process on `Err`.
pub fn ensure_frontend_dir(ui_dir: &std::path::Path) -> Result<(), ServerError> {
    if !ui_dir.exists() {
        return Err(ServerError::FrontendMissing(ui_dir.to_path_buf()));
    }
    Ok(())
}

/// Builds the full router: every route family, CORS (allow-all), and a per-request tracing
/// span.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::ui::redirect_to_ui))
        .merge(routes::config::router())
        .merge(routes::session::router())
        .merge(routes::chat::router())
        .merge(routes::workspace::router())
        .merge(routes::conversations::router())
        .merge(routes::deploy::router())
        .merge(routes::ui::router())
        .with_state(Arc::new(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Runs the server on `addr` until the process is killed.
pub async fn run_serve(addr: SocketAddr, state: AppState) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, state).await
}

pub async fn run_serve_on_listener(listener: TcpListener, state: AppState) -> Result<(), ServerError> {
    let local_addr = listener.local_addr()?;
    info!("HTTP server listening on http://{local_addr}");
    let app = router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_frontend_dir_rejects_missing_path() {
        let err = ensure_frontend_dir(std::path::Path::new("/nonexistent/okcvm-ui-dir"));
        assert!(matches!(err, Err(ServerError::FrontendMissing(_))));
    }

    #[test]
    fn ensure_frontend_dir_accepts_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_frontend_dir(dir.path()).is_ok());
    }
}
