//! SQLite-backed conversation store.
//!
//! Primary key is the conversation id; the `client_id` column is a secondary index used for
//! listing and for rejecting cross-client access. `payload` is stored verbatim as JSON text —
//! this store never interprets its structure except to read the optional `workspace` object
//! for side-column back-fill.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conversation {0} belongs to a different client")]
    ClientMismatch(String),
    #[error("payload is not a JSON object")]
    InvalidPayload,
}

/// Listing-only metadata for a conversation (no payload body).
#[derive(Clone, Debug)]
pub struct ConversationSummary {
    pub id: String,
    pub client_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A full conversation record: the opaque payload plus its cached side columns.
#[derive(Clone, Debug)]
pub struct ConversationRecord {
    pub id: String,
    pub client_id: String,
    pub payload: Value,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub workspace_internal_root: Option<String>,
    pub workspace_mount_path: Option<String>,
    pub session_id: Option<String>,
    pub last_git_commit: Option<String>,
    pub dirty: bool,
}

/// Result of [`Store::delete`]: what was actually removed, so a caller can cascade into
/// deployment cleanup keyed by `session_id` and report
/// partial failures rather than erroring the whole request.
#[derive(Clone, Debug, Default)]
pub struct DeleteOutcome {
    pub id: String,
    pub session_id: Option<String>,
    pub workspace_root_removed: bool,
    pub errors: Vec<String>,
}

fn side_columns_from_payload(payload: &Value) -> (Option<String>, Option<String>, Option<String>, Option<String>, bool) {
    let Some(ws) = payload.get("workspace").and_then(|v| v.as_object()) else {
        return (None, None, None, None, false);
    };
    let s = |k: &str| ws.get(k).and_then(|v| v.as_str()).map(String::from);
    let dirty = ws.get("dirty").and_then(|v| v.as_bool()).unwrap_or(false);
    (
        s("internal_root"),
        s("mount_path"),
        s("session_id"),
        s("last_git_commit"),
        dirty,
    )
}

/// SQLite-backed conversation store.
pub struct Store {
    db: Arc<Mutex<rusqlite::Connection>>,
    /// Configured workspace base directory; `delete` refuses to remove anything outside it.
    workspace_base: PathBuf,
}

impl Store {
    /// Opens or creates the database and tables.
    pub fn new(path: impl AsRef<Path>, workspace_base: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn =
            rusqlite::Connection::open(&path).map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                title TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                workspace_internal_root TEXT,
                workspace_mount_path TEXT,
                session_id TEXT,
                last_git_commit TEXT,
                dirty INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_conversations_client_updated
                ON conversations(client_id, updated_at);
            "#,
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            workspace_base: workspace_base.into(),
        })
    }

    /// In-memory store, for tests.
    pub fn open_in_memory(workspace_base: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::new(":memory:", workspace_base)
    }

    /// Lists conversation summaries for one client, most recently updated first.
    pub async fn list(&self, client_id: &str) -> Result<Vec<ConversationSummary>, StoreError> {
        let db = self.db.clone();
        let client_id = client_id.to_string();
        tokio::task::block_in_place(|| {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, client_id, title, created_at, updated_at FROM conversations
                     WHERE client_id = ?1 ORDER BY updated_at DESC",
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![client_id], |row| {
                    let created_at: String = row.get(3)?;
                    let updated_at: String = row.get(4)?;
                    Ok(ConversationSummary {
                        id: row.get(0)?,
                        client_id: row.get(1)?,
                        title: row.get(2)?,
                        created_at: parse_rfc3339(&created_at),
                        updated_at: parse_rfc3339(&updated_at),
                    })
                })
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Storage(e.to_string()))
        })
    }

    /// Fetches one conversation. Rejects with [`StoreError::ClientMismatch`] when `conv_id`
    /// exists but belongs to a different client.
    pub async fn get(&self, client_id: &str, conv_id: &str) -> Result<ConversationRecord, StoreError> {
        let db = self.db.clone();
        let client_id = client_id.to_string();
        let conv_id = conv_id.to_string();
        tokio::task::block_in_place(|| {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;
            let record = load_record(&conn, &conv_id)?;
            if record.client_id != client_id {
                return Err(StoreError::ClientMismatch(conv_id));
            }
            Ok(record)
        })
    }

    /// Upserts a conversation payload.
    ///
    /// `conv_id = None` allocates a new conversation id. `conv_id = Some(existing)` updates in
    /// place, rejecting with [`StoreError::ClientMismatch`] if the row exists under a different
    /// client. Timestamps are normalised to UTC; side columns are back-filled from
    /// `payload.workspace` when present, otherwise the previous values (if any) are kept.
    pub async fn save(
        &self,
        client_id: &str,
        conv_id: Option<String>,
        title: Option<String>,
        payload: Value,
    ) -> Result<String, StoreError> {
        if !payload.is_object() {
            return Err(StoreError::InvalidPayload);
        }
        let id = conv_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let client_id = client_id.to_string();
        let now = Utc::now();
        let payload_json =
            serde_json::to_string(&payload).map_err(|e| StoreError::Storage(e.to_string()))?;
        let (internal_root, mount_path, session_id, last_git_commit, dirty) =
            side_columns_from_payload(&payload);

        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;

            if let Ok(existing) = load_record(&conn, &id) {
                if existing.client_id != client_id {
                    return Err(StoreError::ClientMismatch(id));
                }
            }

            let created_at = conn
                .query_row(
                    "SELECT created_at FROM conversations WHERE id = ?1",
                    rusqlite::params![id],
                    |row| row.get::<_, String>(0),
                )
                .unwrap_or_else(|_| now.to_rfc3339());

            conn.execute(
                "INSERT INTO conversations
                    (id, client_id, payload, title, created_at, updated_at,
                     workspace_internal_root, workspace_mount_path, session_id, last_git_commit, dirty)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                    payload = excluded.payload,
                    title = excluded.title,
                    updated_at = excluded.updated_at,
                    workspace_internal_root = COALESCE(excluded.workspace_internal_root, conversations.workspace_internal_root),
                    workspace_mount_path = COALESCE(excluded.workspace_mount_path, conversations.workspace_mount_path),
                    session_id = COALESCE(excluded.session_id, conversations.session_id),
                    last_git_commit = COALESCE(excluded.last_git_commit, conversations.last_git_commit),
                    dirty = excluded.dirty",
                rusqlite::params![
                    id,
                    client_id,
                    payload_json,
                    title,
                    created_at,
                    now.to_rfc3339(),
                    internal_root,
                    mount_path,
                    session_id,
                    last_git_commit,
                    dirty as i64,
                ],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })?;
        Ok(id)
    }

    /// Removes a conversation's row, then attempts to remove its workspace's real root.
    /// Deployment cleanup keyed by `session_id` is the caller's responsibility — the returned
    /// [`DeleteOutcome::session_id`] carries what's needed for that cascade.
    pub async fn delete(&self, client_id: &str, conv_id: &str) -> Result<DeleteOutcome, StoreError> {
        let db = self.db.clone();
        let client_id = client_id.to_string();
        let conv_id = conv_id.to_string();
        let workspace_base = self.workspace_base.clone();

        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;
            let record = load_record(&conn, &conv_id)?;
            if record.client_id != client_id {
                return Err(StoreError::ClientMismatch(conv_id));
            }

            conn.execute(
                "DELETE FROM conversations WHERE id = ?1",
                rusqlite::params![conv_id],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;

            let mut outcome = DeleteOutcome {
                id: conv_id.clone(),
                session_id: record.session_id.clone(),
                workspace_root_removed: false,
                errors: Vec::new(),
            };

            if let Some(root) = record.workspace_internal_root.as_ref() {
                match is_under_base(Path::new(root), &workspace_base) {
                    Ok(true) => match std::fs::remove_dir_all(root) {
                        Ok(()) => outcome.workspace_root_removed = true,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                            outcome.workspace_root_removed = true;
                        }
                        Err(e) => outcome.errors.push(format!("remove workspace root: {e}")),
                    },
                    Ok(false) => outcome
                        .errors
                        .push(format!("refusing to delete outside workspace base: {root}")),
                    Err(e) => outcome.errors.push(format!("resolve workspace root: {e}")),
                }
            }

            Ok(outcome)
        })
    }
}

fn load_record(conn: &rusqlite::Connection, conv_id: &str) -> Result<ConversationRecord, StoreError> {
    conn.query_row(
        "SELECT id, client_id, payload, title, created_at, updated_at,
                workspace_internal_root, workspace_mount_path, session_id, last_git_commit, dirty
         FROM conversations WHERE id = ?1",
        rusqlite::params![conv_id],
        |row| {
            let payload_json: String = row.get(2)?;
            let created_at: String = row.get(4)?;
            let updated_at: String = row.get(5)?;
            let dirty: i64 = row.get(10)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                payload_json,
                row.get::<_, Option<String>>(3)?,
                created_at,
                updated_at,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, Option<String>>(9)?,
                dirty,
            ))
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(conv_id.to_string()),
        e => StoreError::Storage(e.to_string()),
    })
    .and_then(
        |(id, client_id, payload_json, title, created_at, updated_at, internal_root, mount_path, session_id, last_git_commit, dirty)| {
            let payload: Value = serde_json::from_str(&payload_json)
                .map_err(|e| StoreError::Storage(format!("corrupt payload: {e}")))?;
            Ok(ConversationRecord {
                id,
                client_id,
                payload,
                title,
                created_at: parse_rfc3339(&created_at),
                updated_at: parse_rfc3339(&updated_at),
                workspace_internal_root: internal_root,
                workspace_mount_path: mount_path,
                session_id,
                last_git_commit,
                dirty: dirty != 0,
            })
        },
    )
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// True if `path` (once normalised) lies under `base` (once canonicalized). `path` need not
/// exist; `base` must.
fn is_under_base(path: &Path, base: &Path) -> std::io::Result<bool> {
    let base = base.canonicalize()?;
    let candidate = if path.exists() {
        path.canonicalize()?
    } else {
        path.to_path_buf()
    };
    Ok(candidate.starts_with(&base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_then_get_round_trips_payload() {
        let base = tempdir().unwrap();
        let store = Store::open_in_memory(base.path()).unwrap();
        let payload = serde_json::json!({"graph": {"nodes": []}});
        let id = store
            .save("alice", None, Some("first".to_string()), payload.clone())
            .await
            .unwrap();

        let loaded = store.get("alice", &id).await.unwrap();
        assert_eq!(loaded.payload, payload);
        assert_eq!(loaded.title.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn get_rejects_mismatched_client() {
        let base = tempdir().unwrap();
        let store = Store::open_in_memory(base.path()).unwrap();
        let id = store
            .save("alice", None, None, serde_json::json!({}))
            .await
            .unwrap();
        let err = store.get("bob", &id).await.unwrap_err();
        assert!(matches!(err, StoreError::ClientMismatch(_)));
    }

    #[tokio::test]
    async fn save_rejects_client_conflict_on_existing_row() {
        let base = tempdir().unwrap();
        let store = Store::open_in_memory(base.path()).unwrap();
        let id = store
            .save("alice", None, None, serde_json::json!({}))
            .await
            .unwrap();
        let err = store
            .save("bob", Some(id), None, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ClientMismatch(_)));
    }

    #[tokio::test]
    async fn list_orders_most_recently_updated_first_per_client() {
        let base = tempdir().unwrap();
        let store = Store::open_in_memory(base.path()).unwrap();
        let first = store
            .save("alice", None, Some("a".to_string()), serde_json::json!({}))
            .await
            .unwrap();
        store
            .save("alice", None, Some("b".to_string()), serde_json::json!({}))
            .await
            .unwrap();
        store
            .save("bob", None, Some("c".to_string()), serde_json::json!({}))
            .await
            .unwrap();
        store
            .save(
                "alice",
                Some(first.clone()),
                Some("a-renamed".to_string()),
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let alice_list = store.list("alice").await.unwrap();
        assert_eq!(alice_list.len(), 2);
        assert_eq!(alice_list[0].id, first);
    }

    #[tokio::test]
    async fn save_backfills_side_columns_from_workspace_object() {
        let base = tempdir().unwrap();
        let root = base.path().join("okcvm-token1");
        std::fs::create_dir_all(&root).unwrap();
        let store = Store::open_in_memory(base.path()).unwrap();
        let payload = serde_json::json!({
            "workspace": {
                "internal_root": root.to_str().unwrap(),
                "session_id": "sess-1",
                "dirty": true,
            }
        });
        let id = store.save("alice", None, None, payload).await.unwrap();
        let loaded = store.get("alice", &id).await.unwrap();
        assert_eq!(loaded.session_id.as_deref(), Some("sess-1"));
        assert!(loaded.dirty);
    }

    #[tokio::test]
    async fn delete_removes_row_and_workspace_root_under_base() {
        let base = tempdir().unwrap();
        let root = base.path().join("okcvm-token2");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("notes.txt"), "v1").unwrap();
        let store = Store::open_in_memory(base.path()).unwrap();
        let payload = serde_json::json!({
            "workspace": {"internal_root": root.to_str().unwrap(), "session_id": "sess-2"}
        });
        let id = store.save("alice", None, None, payload).await.unwrap();

        let outcome = store.delete("alice", &id).await.unwrap();
        assert!(outcome.workspace_root_removed);
        assert_eq!(outcome.session_id.as_deref(), Some("sess-2"));
        assert!(!root.exists());
        assert!(matches!(
            store.get("alice", &id).await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn delete_refuses_to_remove_workspace_outside_base() {
        let base = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("sentinel.txt"), "keep").unwrap();
        let store = Store::open_in_memory(base.path()).unwrap();
        let payload = serde_json::json!({
            "workspace": {"internal_root": outside.path().to_str().unwrap()}
        });
        let id = store.save("alice", None, None, payload).await.unwrap();

        let outcome = store.delete("alice", &id).await.unwrap();
        assert!(!outcome.workspace_root_removed);
        assert!(!outcome.errors.is_empty());
        assert!(outside.path().join("sentinel.txt").exists());
    }
}
