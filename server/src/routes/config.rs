//! Configuration routes: redacted read, partial merge-update.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use okcvm_config::{ConfigurationSnapshot, ConfigurationUpdate};

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/config", get(read_config).post(update_config))
}

async fn read_config(State(state): State<Arc<AppState>>) -> Json<ConfigurationSnapshot> {
    Json(state.config.snapshot())
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ConfigurationUpdate>,
) -> Json<ConfigurationSnapshot> {
    state.config.update(update);
    Json(state.config.snapshot())
}
