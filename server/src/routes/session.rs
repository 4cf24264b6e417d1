//! Session routes: info, a single history entry, boot, upload
//! management, and full history deletion.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::{Json, Router};
use axum::routing::{delete, get};
use serde_json::{json, Value};

use okcvm_core::{format_size, UploadedFileRecord, MAX_UPLOADS_PER_SESSION, MAX_UPLOAD_SIZE_BYTES};

use crate::client::ClientId;
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/session/info", get(info))
        .route("/api/session/history/:id", get(history_entry))
        .route("/api/session/boot", get(boot))
        .route("/api/session/files", get(list_files).post(upload_files))
        .route("/api/session/history", delete(delete_history))
}

async fn info(State(state): State<Arc<AppState>>, client_id: ClientId) -> Result<Json<Value>, ApiError> {
    let session = state.sessions.get_or_create(&client_id).await?;
    Ok(Json(session.info().await))
}

async fn history_entry(
    State(state): State<Arc<AppState>>,
    client_id: ClientId,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.sessions.get_or_create(&client_id).await?;
    match session.history_entry(&id).await {
        Some(entry) => Ok(Json(serde_json::to_value(entry).unwrap_or(Value::Null))),
        None => Err(ApiError::NotFound(format!("history entry {id} not found"))),
    }
}

async fn boot(State(state): State<Arc<AppState>>, client_id: ClientId) -> Result<Json<Value>, ApiError> {
    let session = state.sessions.get_or_create(&client_id).await?;
    Ok(Json(session.boot().await))
}

async fn list_files(State(state): State<Arc<AppState>>, client_id: ClientId) -> Result<Json<Vec<UploadedFileRecord>>, ApiError> {
    let session = state.sessions.get_or_create(&client_id).await?;
    Ok(Json(session.uploads().await))
}

/// `multipart/form-data`, field `files[]`. Enforces per-file ≤ 100 MiB and ≤ 100 files per
/// session; aborts and deletes the partial file on either violation.
async fn upload_files(
    State(state): State<Arc<AppState>>,
    client_id: ClientId,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let session = state.sessions.get_or_create(&client_id).await?;
    let workspace = session.workspace_handle().await;

    let existing = session.uploads().await;
    let mut count = existing.len();
    let mut uploaded = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };

        if count >= MAX_UPLOADS_PER_SESSION {
            return Err(ApiError::BadRequest(format!(
                "upload limit reached: at most {MAX_UPLOADS_PER_SESSION} files per session"
            )));
        }

        let relative_path = format!("uploads/{name}");
        let dest = workspace
            .resolve(&relative_path)
            .map_err(ApiError::from)?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload body: {e}")))?;

        if bytes.len() as u64 > MAX_UPLOAD_SIZE_BYTES {
            return Err(ApiError::BadRequest(format!(
                "file '{name}' exceeds the per-file limit of {}",
                format_size(MAX_UPLOAD_SIZE_BYTES)
            )));
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ApiError::Internal(e.to_string()))?;
        }
        if let Err(e) = std::fs::write(&dest, &bytes) {
            let _ = std::fs::remove_file(&dest);
            return Err(ApiError::Internal(e.to_string()));
        }

        count += 1;
        uploaded.push(UploadedFileRecord {
            name,
            relative_path,
            size_bytes: bytes.len() as u64,
        });
    }

    session.register_uploaded_files(uploaded.clone()).await;

    Ok(Json(json!({
        "uploaded": uploaded,
        "uploads": session.uploads().await,
    })))
}

async fn delete_history(State(state): State<Arc<AppState>>, client_id: ClientId) -> Result<Json<Value>, ApiError> {
    let session = state.sessions.get_or_create(&client_id).await?;
    Ok(Json(session.delete_history().await))
}
