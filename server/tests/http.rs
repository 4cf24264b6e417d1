//! End-to-end HTTP surface tests: drives the router with `tower::ServiceExt::oneshot`
//! against a temp-dir-backed stack, exercising boot, deployment serving, snapshots, chat
//! previews, and cascading deletes.

use std::sync::Arc;

use http_body_util::BodyExt;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use okcvm_agent::{ChatTurn, RequestedToolCall, StubChatEndpoint};
use okcvm_config::{ChatEndpointUpdate, Configuration, ConfigurationUpdate, WorkspaceConfig};
use okcvm_conversation::Store as ConversationStore;
use okcvm_core::SessionStore;
use okcvm_deploy::{DeployRequest, Store as DeployStore};
use okcvm_server::{router, AppState};
use okcvm_workspace::{WorkspaceManager, WorkspaceManagerConfig};

struct Harness {
    _dir: TempDir,
    state: AppState,
}

fn build_harness(chat: StubChatEndpoint, snapshots_enabled: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let ui_dir = dir.path().join("ui");
    std::fs::create_dir_all(&ui_dir).unwrap();
    std::fs::write(ui_dir.join("index.html"), "<html>ui</html>").unwrap();

    let config = Configuration::new();
    config.update(ConfigurationUpdate {
        chat: Some(ChatEndpointUpdate {
            supports_streaming: Some(true),
            ..Default::default()
        }),
        workspace: Some(WorkspaceConfig {
            preview_base_url: Some("https://preview.invalid".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    });

    let workspace_manager = Arc::new(WorkspaceManager::new(WorkspaceManagerConfig {
        base_dir: dir.path().join("workspaces"),
        mount_root: "/mnt".to_string(),
        snapshots_enabled,
        max_reported_snapshots: 20,
    }));
    let deploy_store = DeployStore::new(dir.path().join("deployments"));
    let conversations = Arc::new(
        ConversationStore::new(dir.path().join("conversations.sqlite"), dir.path().join("workspaces")).unwrap(),
    );
    let sessions = Arc::new(SessionStore::new(
        config.clone(),
        workspace_manager,
        deploy_store.clone(),
        Arc::new(chat),
    ));

    let state = AppState {
        config,
        sessions,
        deployments: deploy_store,
        conversations,
        ui_dir,
    };
    Harness { _dir: dir, state }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn boot_returns_welcome_and_single_history_entry() {
    let harness = build_harness(StubChatEndpoint::fixed_reply("hi"), false);
    let app = router(harness.state.clone());

    let req = Request::builder()
        .uri("/api/session/boot")
        .header("x-okc-client-id", "alice")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert!(payload["vm"]["history_length"].as_u64().unwrap() >= 1);
    assert!(payload["web_preview"]["html"].is_string() || payload["web_preview"]["html"].is_null());

    // Second call for the same client returns the same booted state, not a fresh boot.
    let req2 = Request::builder()
        .uri("/api/session/boot")
        .header("x-okc-client-id", "alice")
        .body(Body::empty())
        .unwrap();
    let response2 = app.oneshot(req2).await.unwrap();
    assert_eq!(response2.status(), StatusCode::OK);
    let payload2 = body_json(response2).await;
    assert_eq!(payload["reply"], payload2["reply"]);
}

#[tokio::test]
async fn deployment_asset_is_reachable_by_id_path_and_query_and_rejects_escape() {
    let harness = build_harness(StubChatEndpoint::fixed_reply("hi"), false);

    let source = harness._dir.path().join("site");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("index.html"), "<html>site</html>").unwrap();

    let record = harness
        .state
        .deployments
        .deploy(DeployRequest {
            source_dir: source,
            name: Some("demo".to_string()),
            entry_file: None,
            force: false,
            start_server: false,
            session_id: "sess-1".to_string(),
            existing_id: None,
        })
        .await
        .unwrap();
    let id = record.id.clone();

    let app = router(harness.state.clone());
    let by_dir = app
        .clone()
        .oneshot(Request::builder().uri(format!("/{id}/")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(by_dir.status(), StatusCode::OK);
    assert_eq!(by_dir.headers().get("content-type").unwrap(), "text/html");
    let by_dir_body = by_dir.into_body().collect().await.unwrap().to_bytes();

    let by_path = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/{id}/index.html"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(by_path.status(), StatusCode::OK);
    let by_path_body = by_path.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(by_dir_body, by_path_body);

    let by_query = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/?s={id}&path=index.html"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(by_query.status(), StatusCode::OK);
    let by_query_body = by_query.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(by_dir_body, by_query_body);

    let escape = app
        .oneshot(
            Request::builder()
                .uri(format!("/{id}/../etc/passwd"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(escape.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn snapshot_create_and_restore_round_trip() {
    let harness = build_harness(StubChatEndpoint::fixed_reply("hi"), true);
    let app = router(harness.state.clone());

    // Boot first so a workspace exists for this client.
    app.clone()
        .oneshot(
            Request::builder()
                .uri("/api/session/boot")
                .header("x-okc-client-id", "bob")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let session = harness.state.sessions.get_or_create("bob").await.unwrap();
    let workspace = session.workspace_handle().await;
    std::fs::write(workspace.resolve("notes.txt").unwrap(), "v1").unwrap();

    let snap_a = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/session/workspace/snapshots")
                .header("x-okc-client-id", "bob")
                .header("content-type", "application/json")
                .body(Body::from(json!({"label": "A"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(snap_a.status(), StatusCode::OK);
    let snap_a = body_json(snap_a).await;
    let commit_a = snap_a["commit_id"].as_str().unwrap().to_string();

    std::fs::write(workspace.resolve("notes.txt").unwrap(), "v2").unwrap();
    let snap_b = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/session/workspace/snapshots")
                .header("x-okc-client-id", "bob")
                .header("content-type", "application/json")
                .body(Body::from(json!({"label": "B"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let snap_b = body_json(snap_b).await;
    let commit_b = snap_b["commit_id"].as_str().unwrap().to_string();
    assert_ne!(commit_a, commit_b);

    let restore = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/session/workspace/restore")
                .header("x-okc-client-id", "bob")
                .header("content-type", "application/json")
                .body(Body::from(json!({"snapshot_id": commit_a}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(restore.status(), StatusCode::OK);

    let content = std::fs::read_to_string(workspace.resolve("notes.txt").unwrap()).unwrap();
    assert_eq!(content, "v1");
}

#[tokio::test]
async fn chat_json_response_carries_deployment_preview() {
    let deploy_turn = ChatTurn {
        content: String::new(),
        tool_calls: vec![RequestedToolCall {
            id: "call-1".to_string(),
            name: "mshtools-deploy_website".to_string(),
            arguments: json!({"source_dir": ".", "start_server": false}),
        }],
    };
    let chat = StubChatEndpoint::new([deploy_turn], "done");
    let harness = build_harness(chat, false);

    let app = router(harness.state.clone());
    let session = harness.state.sessions.get_or_create("carol").await.unwrap();
    let workspace = session.workspace_handle().await;
    std::fs::write(workspace.resolve("index.html").unwrap(), "<html>hi</html>").unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("x-okc-client-id", "carol")
                .header("content-type", "application/json")
                .body(Body::from(json!({"message": "create site", "stream": false}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload["reply"], "done");
    assert!(payload["web_preview"]["deployment_id"].is_string());
}

#[tokio::test]
async fn delete_history_cascades_to_deployments() {
    let harness = build_harness(StubChatEndpoint::fixed_reply("hi"), false);
    let app = router(harness.state.clone());

    app.clone()
        .oneshot(
            Request::builder()
                .uri("/api/session/boot")
                .header("x-okc-client-id", "dana")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let session = harness.state.sessions.get_or_create("dana").await.unwrap();
    let token = session.workspace_handle().await.token.clone();

    let source = harness._dir.path().join("dana-site");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("index.html"), "<html>dana</html>").unwrap();
    let record = harness
        .state
        .deployments
        .deploy(DeployRequest {
            source_dir: source,
            name: Some("dana-site".to_string()),
            entry_file: None,
            force: false,
            start_server: false,
            session_id: token,
            existing_id: None,
        })
        .await
        .unwrap();
    let deployed_id = record.id.clone();

    let asset = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/{deployed_id}/index.html"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(asset.status(), StatusCode::OK);

    let deleted = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/session/history")
                .header("x-okc-client-id", "dana")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);

    let after = app
        .oneshot(
            Request::builder()
                .uri(format!("/{deployed_id}/index.html"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ui_static_asset_is_served_with_no_store() {
    let harness = build_harness(StubChatEndpoint::fixed_reply("hi"), false);
    let app = router(harness.state.clone());

    let response = app
        .oneshot(Request::builder().uri("/ui/index.html").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
}

#[tokio::test]
async fn config_snapshot_never_exposes_api_key() {
    let harness = build_harness(StubChatEndpoint::fixed_reply("hi"), false);
    let app = router(harness.state.clone());

    let update = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/config")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"chat": {"api_key": "sk-secret", "model": "gpt-test"}}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(update.status(), StatusCode::OK);
    let payload = body_json(update).await;
    assert_eq!(payload["chat_api_key_present"], true);
    assert!(payload["chat"].get("api_key").is_none());

    let read = app
        .oneshot(Request::builder().uri("/api/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let payload = body_json(read).await;
    assert_eq!(payload["chat"]["model"], "gpt-test");
}
