//! Chat route: JSON when the client doesn't ask for a stream, SSE when
//! it sends `Accept: text/event-stream` *and* the configured chat endpoint advertises streaming
//! support. The SSE frame contract is rendered through
//! [`okcvm_core::StreamingBus`]/[`okcvm_core::BusReceiver`] exactly as the Session State already
//! produces them.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::stream;
use serde::Deserialize;
use serde_json::Value;

use okcvm_core::{StreamingBus, EVENT_QUEUE_CAPACITY};

use crate::client::ClientId;
use crate::error::ApiError;
use crate::AppState;

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    replace_last: bool,
    /// Explicit client override: `Some(false)` suppresses SSE even if `Accept` would trigger it.
    #[serde(default)]
    stream: Option<bool>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/chat", post(chat))
}

fn wants_stream(headers: &axum::http::HeaderMap, requested: Option<bool>) -> bool {
    if requested == Some(false) {
        return false;
    }
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    client_id: ClientId,
    headers: axum::http::HeaderMap,
    Json(body): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let session = state.sessions.get_or_create(&client_id).await?;

    if !wants_stream(&headers, body.stream) || !state.config.chat_supports_streaming() {
        let payload: Value = session.respond(&body.message, body.replace_last, None).await;
        return Ok(Json(payload).into_response());
    }

    let (bus, receiver) = StreamingBus::channel(client_id.0.clone(), EVENT_QUEUE_CAPACITY);
    tokio::spawn(async move {
        session.respond(&body.message, body.replace_last, Some(&bus)).await;
    });

    let frames = stream::unfold(receiver, |mut rx| async move {
        rx.next_frame().await.map(|frame| (Ok::<_, std::io::Error>(frame), rx))
    });

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(frames))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(response)
}
