//! `GET /` (redirect to `/ui/`, or serve a deployment when `?s=` is present) and
//! `GET /ui/<path>` static asset serving via `tower_http::services::ServeDir`, plus explicit
//! MIME-type/`Cache-Control` handling for local dev ergonomics.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::deploy::serve_deployment_asset;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ui/*path", get(serve_ui_asset))
}

#[derive(Deserialize)]
struct RootQuery {
    s: Option<String>,
    path: Option<String>,
}

/// `GET /`: when `?s=<id>` is present this is actually a deployment preview request; otherwise redirect to the UI.
pub async fn redirect_to_ui(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RootQuery>,
) -> Result<Response, ApiError> {
    match query.s {
        Some(id) => serve_deployment_asset(&state, &id, query.path.as_deref().unwrap_or("")),
        None => Ok(Redirect::to("/ui/").into_response()),
    }
}

async fn serve_ui_asset(
    State(state): State<Arc<AppState>>,
    axum::extract::Path(path): axum::extract::Path<String>,
) -> Result<Response, ApiError> {
    let requested = if path.is_empty() || path.ends_with('/') {
        format!("{path}index.html")
    } else {
        path
    };
    let real_path = state.ui_dir.join(&requested);
    let real_path = real_path
        .canonicalize()
        .map_err(|_| ApiError::NotFound(format!("asset not found: {requested}")))?;
    if !real_path.starts_with(&state.ui_dir) {
        return Err(ApiError::BadRequest("path escapes UI directory".to_string()));
    }

    let bytes = std::fs::read(&real_path).map_err(|_| ApiError::NotFound(format!("asset not found: {requested}")))?;
    let mime = mime_guess::from_path(&real_path).first_or_octet_stream();

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.essence_str().to_string()),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        bytes,
    )
        .into_response())
}
