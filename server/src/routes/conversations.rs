//! Conversation CRUD routes, backed by
//! [`okcvm_conversation::Store`]. On delete, cascades into deployment cleanup for the
//! conversation's tagged session id — the same cascade `SessionState::delete_history` performs.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::ClientId;
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/conversations", get(list).post(save_new))
        .route("/api/conversations/:id", get(get_one).put(save_existing).delete(remove))
}

#[derive(Deserialize)]
struct SavePayload {
    title: Option<String>,
    payload: Value,
}

async fn list(State(state): State<Arc<AppState>>, client_id: ClientId) -> Result<Json<Value>, ApiError> {
    let summaries = state.conversations.list(&client_id).await?;
    Ok(Json(json!({
        "conversations": summaries
            .into_iter()
            .map(|s| json!({
                "id": s.id,
                "title": s.title,
                "created_at": s.created_at.to_rfc3339(),
                "updated_at": s.updated_at.to_rfc3339(),
            }))
            .collect::<Vec<_>>()
    })))
}

async fn get_one(
    State(state): State<Arc<AppState>>,
    client_id: ClientId,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state.conversations.get(&client_id, &id).await?;
    Ok(Json(record_to_json(&record)))
}

async fn save_new(
    State(state): State<Arc<AppState>>,
    client_id: ClientId,
    Json(body): Json<SavePayload>,
) -> Result<Json<Value>, ApiError> {
    let id = state.conversations.save(&client_id, None, body.title, body.payload).await?;
    let record = state.conversations.get(&client_id, &id).await?;
    Ok(Json(record_to_json(&record)))
}

async fn save_existing(
    State(state): State<Arc<AppState>>,
    client_id: ClientId,
    Path(id): Path<String>,
    Json(body): Json<SavePayload>,
) -> Result<Json<Value>, ApiError> {
    let id = state
        .conversations
        .save(&client_id, Some(id), body.title, body.payload)
        .await?;
    let record = state.conversations.get(&client_id, &id).await?;
    Ok(Json(record_to_json(&record)))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    client_id: ClientId,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let outcome = state.conversations.delete(&client_id, &id).await?;
    if let Some(session_id) = &outcome.session_id {
        let deployments = state.deployments.cleanup_session(session_id);
        return Ok(Json(json!({
            "id": outcome.id,
            "workspace_root_removed": outcome.workspace_root_removed,
            "errors": outcome.errors,
            "deployments": {
                "removed_ids": deployments.removed_ids,
                "errors": deployments.errors,
            },
        })));
    }
    Ok(Json(json!({
        "id": outcome.id,
        "workspace_root_removed": outcome.workspace_root_removed,
        "errors": outcome.errors,
    })))
}

fn record_to_json(record: &okcvm_conversation::ConversationRecord) -> Value {
    json!({
        "id": record.id,
        "client_id": record.client_id,
        "payload": record.payload,
        "title": record.title,
        "created_at": record.created_at.to_rfc3339(),
        "updated_at": record.updated_at.to_rfc3339(),
    })
}
