//! Deployment asset-serving routes: `GET /{id}`, `GET /{id}/`,
//! `GET /{id}/{path}`. The query-string form `GET /?s=<id>&path=<path>` is handled by
//! `crate::routes::ui::redirect_to_ui` (it shares the root route with the `/ui/` redirect) via
//! [`serve_deployment_asset`]. All funnel into [`okcvm_deploy::Store::resolve_asset`], which
//! already applies the path-escape rejection and `index.html` defaulting.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:id", get(serve_root))
        .route("/:id/", get(serve_root))
        .route("/:id/*path", get(serve_path))
}

pub(crate) fn serve_deployment_asset(state: &AppState, id: &str, relative_path: &str) -> Result<Response, ApiError> {
    let real_path = state.deployments.resolve_asset(id, relative_path)?;
    let bytes = std::fs::read(&real_path).map_err(|e| ApiError::Internal(e.to_string()))?;
    let mime = mime_guess::from_path(&real_path).first_or_octet_stream();
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime.essence_str().to_string())],
        bytes,
    )
        .into_response())
}

async fn serve_root(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Response, ApiError> {
    serve_deployment_asset(&state, &id, "")
}

async fn serve_path(
    State(state): State<Arc<AppState>>,
    Path((id, path)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    serve_deployment_asset(&state, &id, &path)
}
