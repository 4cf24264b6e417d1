//! Workspace snapshot routes: list/create/restore/branch,
//! mirroring the Session State's own snapshot API.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::ClientId;
use crate::error::ApiError;
use crate::AppState;

const DEFAULT_REPORTED_SNAPSHOTS: usize = 50;

#[derive(Deserialize)]
struct ListSnapshotsQuery {
    limit: Option<usize>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/session/workspace/snapshots", get(list_snapshots).post(create_snapshot))
        .route("/api/session/workspace/restore", post(restore_snapshot))
        .route("/api/session/workspace/branch", post(ensure_branch))
        .route("/api/session/workspace/head", get(describe_head))
}

#[derive(Deserialize, Default)]
struct CreateSnapshotBody {
    label: Option<String>,
}

#[derive(Deserialize, Default)]
struct RestoreBody {
    #[serde(alias = "snapshot_id")]
    commit_id: Option<String>,
    branch: Option<String>,
    #[serde(default)]
    checkout: bool,
}

#[derive(Deserialize)]
struct BranchBody {
    name: String,
    commit_id: Option<String>,
    #[serde(default)]
    checkout: bool,
}

async fn list_snapshots(
    State(state): State<Arc<AppState>>,
    client_id: ClientId,
    Query(query): Query<ListSnapshotsQuery>,
) -> Result<Json<Value>, ApiError> {
    let session = state.sessions.get_or_create(&client_id).await?;
    let limit = query.limit.unwrap_or(DEFAULT_REPORTED_SNAPSHOTS);
    let snapshots = session.list_snapshots(limit).await?;
    Ok(Json(json!({ "snapshots": snapshots_to_json(&snapshots) })))
}

async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    client_id: ClientId,
    Json(body): Json<CreateSnapshotBody>,
) -> Result<Json<Value>, ApiError> {
    let session = state.sessions.get_or_create(&client_id).await?;
    let commit_id = session.create_snapshot(body.label.as_deref()).await?;
    Ok(Json(json!({ "commit_id": commit_id })))
}

async fn restore_snapshot(
    State(state): State<Arc<AppState>>,
    client_id: ClientId,
    Json(body): Json<RestoreBody>,
) -> Result<Json<Value>, ApiError> {
    let session = state.sessions.get_or_create(&client_id).await?;
    let restored = session
        .restore_snapshot(body.commit_id.as_deref(), body.branch.as_deref(), body.checkout)
        .await?;
    Ok(Json(json!({ "restored": restored })))
}

async fn ensure_branch(
    State(state): State<Arc<AppState>>,
    client_id: ClientId,
    Json(body): Json<BranchBody>,
) -> Result<Json<Value>, ApiError> {
    let session = state.sessions.get_or_create(&client_id).await?;
    session
        .ensure_branch(&body.name, body.commit_id.as_deref(), body.checkout)
        .await?;
    Ok(Json(json!({ "branch": body.name })))
}

async fn describe_head(State(state): State<Arc<AppState>>, client_id: ClientId) -> Result<Json<Value>, ApiError> {
    let session = state.sessions.get_or_create(&client_id).await?;
    let head = session.describe_head().await?;
    Ok(Json(json!({
        "commit": head.commit,
        "branch": head.branch,
        "is_dirty": head.is_dirty,
    })))
}

fn snapshots_to_json(snapshots: &[okcvm_workspace::SnapshotInfo]) -> Vec<Value> {
    snapshots
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "label": s.label,
                "timestamp": s.timestamp.to_rfc3339(),
            })
        })
        .collect()
}
