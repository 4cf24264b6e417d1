//! Session Store & Client Resolution: a thread-safe `client_id -> SessionState` map, plus
//! the client-id resolution order every request applies before touching the store. One shared,
//! lock-guarded handle per kind of per-connection state, same as the rest of this layer.

use std::collections::HashMap;
use std::sync::Arc;

use okcvm_agent::ChatEndpoint;
use okcvm_config::Configuration;
use okcvm_deploy::Store as DeployStore;
use okcvm_workspace::WorkspaceManager;
use tokio::sync::RwLock;

use crate::session::{SessionError, SessionState};

pub const DEFAULT_CLIENT_ID: &str = "default";

/// Resolves the client id for one request from the sources named in, in priority order: an
/// explicit parameter, the `x-okc-client-id` header, the `okc_client_id` cookie, the `client_id`
/// query parameter, falling back to [`DEFAULT_CLIENT_ID`]. Callers extract each source from their
/// own transport (HTTP headers/cookies/query) and pass them in; this function knows nothing
/// about HTTP.
pub fn resolve_client_id(
    explicit: Option<&str>,
    header: Option<&str>,
    cookie: Option<&str>,
    query: Option<&str>,
) -> String {
    [explicit, header, cookie, query]
        .into_iter()
        .flatten()
        .find(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CLIENT_ID)
        .to_string()
}

/// A thread-safe `client_id -> SessionState` map.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionState>>>,
    config: Configuration,
    workspace_manager: Arc<WorkspaceManager>,
    deploy_store: DeployStore,
    chat_endpoint: Arc<dyn ChatEndpoint>,
}

impl SessionStore {
    pub fn new(
        config: Configuration,
        workspace_manager: Arc<WorkspaceManager>,
        deploy_store: DeployStore,
        chat_endpoint: Arc<dyn ChatEndpoint>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            workspace_manager,
            deploy_store,
            chat_endpoint,
        }
    }

    /// Returns the session for `client_id`, creating it on demand under the write lock if it
    /// doesn't exist yet. The racing double-check under the write lock avoids building two
    /// sessions for the same client when two requests arrive concurrently for a brand-new id.
    pub async fn get_or_create(&self, client_id: &str) -> Result<Arc<SessionState>, SessionError> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(client_id) {
                return Ok(session.clone());
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(client_id) {
            return Ok(session.clone());
        }

        let session = Arc::new(
            SessionState::new(
                client_id.to_string(),
                self.config.clone(),
                self.workspace_manager.clone(),
                self.deploy_store.clone(),
                self.chat_endpoint.clone(),
            )
            .await?,
        );
        sessions.insert(client_id.to_string(), session.clone());
        Ok(session)
    }

    pub async fn get(&self, client_id: &str) -> Option<Arc<SessionState>> {
        self.sessions.read().await.get(client_id).cloned()
    }

    pub async fn client_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use okcvm_agent::StubChatEndpoint;
    use okcvm_workspace::WorkspaceManagerConfig;

    fn store(base: &std::path::Path) -> SessionStore {
        let workspace_manager = Arc::new(WorkspaceManager::new(WorkspaceManagerConfig {
            base_dir: base.join("workspaces"),
            mount_root: "/mnt".to_string(),
            snapshots_enabled: false,
            max_reported_snapshots: 20,
        }));
        let deploy_store = DeployStore::new(base.join("deployments"));
        SessionStore::new(
            Configuration::new(),
            workspace_manager,
            deploy_store,
            Arc::new(StubChatEndpoint::fixed_reply("ok")),
        )
    }

    #[test]
    fn resolution_order_prefers_explicit_then_header_then_cookie_then_query() {
        assert_eq!(resolve_client_id(Some("e"), Some("h"), Some("c"), Some("q")), "e");
        assert_eq!(resolve_client_id(None, Some("h"), Some("c"), Some("q")), "h");
        assert_eq!(resolve_client_id(None, None, Some("c"), Some("q")), "c");
        assert_eq!(resolve_client_id(None, None, None, Some("q")), "q");
        assert_eq!(resolve_client_id(None, None, None, None), "default");
    }

    #[test]
    fn empty_strings_are_skipped_in_favour_of_the_next_source() {
        assert_eq!(resolve_client_id(Some(""), None, Some("c"), None), "c");
    }

    #[tokio::test]
    async fn get_or_create_creates_once_and_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let a = store.get_or_create("alice").await.unwrap();
        let b = store.get_or_create("alice").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.client_ids().await, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn distinct_client_ids_get_distinct_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let a = store.get_or_create("alice").await.unwrap();
        let b = store.get_or_create("bob").await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
