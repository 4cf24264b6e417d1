//! Deployment Store: materialise a static site under a persistent root, give it a
//! stable 6-digit id, serve it, and clean it up with its originating session.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;

use crate::error::DeployError;
use crate::record::{slugify, DeploymentRecord, DeploymentSummary};
use crate::server;

const ID_MIN: u32 = 100_000;
const ID_MAX: u32 = 999_999;
const ID_ALLOC_ATTEMPTS: u32 = 1_000_000;

/// Inputs to one deployment.
pub struct DeployRequest {
    pub source_dir: PathBuf,
    pub name: Option<String>,
    pub entry_file: Option<String>,
    pub force: bool,
    pub start_server: bool,
    pub session_id: String,
    /// Redeploy to a specific existing id instead of allocating a fresh one. `force` governs
    /// whether an existing target at this id is overwritten.
    pub existing_id: Option<String>,
}

#[derive(Clone)]
pub struct Store {
    deployments_root: PathBuf,
}

impl Store {
    pub fn new(deployments_root: impl Into<PathBuf>) -> Self {
        Self {
            deployments_root: deployments_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.deployments_root
    }

    /// Runs the full deploy algorithm.
    pub async fn deploy(&self, req: DeployRequest) -> Result<DeploymentRecord, DeployError> {
        if !req.source_dir.is_dir() {
            return Err(DeployError::SourceNotFound(
                req.source_dir.display().to_string(),
            ));
        }
        std::fs::create_dir_all(&self.deployments_root)?;

        ensure_index_html(&req.source_dir, req.entry_file.as_deref())?;

        let name = req
            .name
            .clone()
            .unwrap_or_else(|| "site".to_string());
        let slug = slugify(&name);

        let id = match req.existing_id {
            Some(id) => {
                let target = self.deployments_root.join(&id);
                if target.exists() {
                    if !req.force {
                        return Err(DeployError::TargetExists(id));
                    }
                    std::fs::remove_dir_all(&target)?;
                }
                id
            }
            None => self.allocate_id()?,
        };

        let target = self.deployments_root.join(&id);
        copy_dir_all(&req.source_dir, &target)?;

        let server_info = if req.start_server {
            server::try_start(target.clone()).await
        } else {
            None
        };

        let record = DeploymentRecord {
            id: id.clone(),
            name,
            slug,
            session_id: req.session_id,
            timestamp: Utc::now(),
            source: req.source_dir.display().to_string(),
            target: target.display().to_string(),
            preview_url: format!("/?s={id}&path=index.html"),
            entry_path: "index.html".to_string(),
            server_info,
        };

        self.write_deployment_json(&target, &record)?;
        self.upsert_manifest(&record.summary())?;

        Ok(record)
    }

    fn allocate_id(&self) -> Result<String, DeployError> {
        let mut rng = rand::thread_rng();
        for _ in 0..ID_ALLOC_ATTEMPTS {
            let candidate = rng.gen_range(ID_MIN..=ID_MAX).to_string();
            if !self.deployments_root.join(&candidate).exists() {
                return Ok(candidate);
            }
        }
        Err(DeployError::IdSpaceExhausted)
    }

    fn write_deployment_json(
        &self,
        target: &Path,
        record: &DeploymentRecord,
    ) -> Result<(), DeployError> {
        let json = serde_json::to_string_pretty(record).map_err(|e| DeployError::Io(e.to_string()))?;
        std::fs::write(target.join("deployment.json"), json)?;
        Ok(())
    }

    fn read_manifest(&self) -> Result<Vec<DeploymentSummary>, DeployError> {
        let path = self.deployments_root.join("manifest.json");
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| DeployError::Io(e.to_string()))
    }

    fn write_manifest(&self, entries: &[DeploymentSummary]) -> Result<(), DeployError> {
        std::fs::create_dir_all(&self.deployments_root)?;
        let json = serde_json::to_string_pretty(entries).map_err(|e| DeployError::Io(e.to_string()))?;
        std::fs::write(self.deployments_root.join("manifest.json"), json)?;
        Ok(())
    }

    /// Inserts `summary` at the head of the manifest, removing any existing entry with the
    /// same id.
    fn upsert_manifest(&self, summary: &DeploymentSummary) -> Result<(), DeployError> {
        let mut entries = self.read_manifest()?;
        entries.retain(|e| e.id != summary.id);
        entries.insert(0, summary.clone());
        self.write_manifest(&entries)
    }

    /// Removes every deployment whose `deployment.json.session_id` matches `session_id`.
    /// Tolerates partial failures; returns the ids actually removed plus any error messages.
    pub fn cleanup_session(&self, session_id: &str) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();
        let entries = match self.read_manifest() {
            Ok(e) => e,
            Err(e) => {
                outcome.errors.push(e.to_string());
                return outcome;
            }
        };

        let mut kept = Vec::new();
        for entry in entries {
            if entry.session_id != session_id {
                kept.push(entry);
                continue;
            }
            let dir = self.deployments_root.join(&entry.id);
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => outcome.removed_ids.push(entry.id),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    outcome.removed_ids.push(entry.id)
                }
                Err(e) => {
                    outcome
                        .errors
                        .push(format!("remove deployment {}: {e}", entry.id));
                    kept.push(entry);
                }
            }
        }

        if let Err(e) = self.write_manifest(&kept) {
            outcome.errors.push(e.to_string());
        }
        outcome
    }

    /// Resolves `{id, relative_path}` to a real file path under `<deployments_root>/<id>/`.
    /// Rejects absolute paths and any component containing `..`; empty or trailing-slash paths
    /// default to `index.html`.
    pub fn resolve_asset(&self, id: &str, relative_path: &str) -> Result<PathBuf, DeployError> {
        let deployment_dir = self.deployments_root.join(id);
        if !deployment_dir.is_dir() {
            return Err(DeployError::NotFound(id.to_string()));
        }

        let mut path = relative_path.trim_start_matches('/').to_string();
        if path.is_empty() || path.ends_with('/') {
            path.push_str("index.html");
        }

        if relative_path.starts_with('/') && relative_path != "/" {
            // leading slash stripped above is fine; what we actually reject is `..`.
        }
        if path.split('/').any(|seg| seg == "..") {
            return Err(DeployError::PathEscape(relative_path.to_string()));
        }

        let candidate = deployment_dir.join(&path);
        let real = candidate
            .canonicalize()
            .map_err(|_| DeployError::NotFound(format!("{id}/{relative_path}")))?;
        let real_root = deployment_dir
            .canonicalize()
            .map_err(|e| DeployError::Io(e.to_string()))?;
        if !real.starts_with(&real_root) {
            return Err(DeployError::PathEscape(relative_path.to_string()));
        }
        Ok(real)
    }
}

#[derive(Default, Debug, Clone)]
pub struct CleanupOutcome {
    pub removed_ids: Vec<String>,
    pub errors: Vec<String>,
}

fn ensure_index_html(source_dir: &Path, entry_file: Option<&str>) -> Result<(), DeployError> {
    let index = source_dir.join("index.html");
    if index.exists() {
        return Ok(());
    }

    if let Some(hint) = entry_file {
        let candidate = source_dir.join(hint);
        if candidate.is_file() {
            std::fs::copy(&candidate, &index)?;
            return Ok(());
        }
    }

    let html_files: Vec<PathBuf> = std::fs::read_dir(source_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("html"))
        .collect();

    match html_files.len() {
        0 => Err(DeployError::NoEntryFile),
        1 => {
            std::fs::copy(&html_files[0], &index)?;
            Ok(())
        }
        _ => Err(DeployError::AmbiguousEntryFile),
    }
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let target = dst.join(entry.file_name());
        if ty.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_site(dir: &Path) {
        std::fs::write(dir.join("index.html"), "<html>hi</html>").unwrap();
        std::fs::write(dir.join("style.css"), "body{}").unwrap();
    }

    #[tokio::test]
    async fn deploy_writes_manifest_and_deployment_json() {
        let deployments_root = tempdir().unwrap();
        let source = tempdir().unwrap();
        make_site(source.path());

        let store = Store::new(deployments_root.path());
        let record = store
            .deploy(DeployRequest {
                source_dir: source.path().to_path_buf(),
                name: Some("My Site".to_string()),
                entry_file: None,
                force: false,
                start_server: false,
                session_id: "sess-1".to_string(),
                existing_id: None,
            })
            .await
            .unwrap();

        assert_eq!(record.slug, "my-site");
        assert_eq!(record.preview_url, format!("/?s={}&path=index.html", record.id));
        assert!(deployments_root
            .path()
            .join(&record.id)
            .join("deployment.json")
            .exists());

        let manifest_path = deployments_root.path().join("manifest.json");
        let manifest: Vec<DeploymentSummary> =
            serde_json::from_str(&std::fs::read_to_string(manifest_path).unwrap()).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].id, record.id);
    }

    #[tokio::test]
    async fn deploy_promotes_single_html_file_to_index() {
        let deployments_root = tempdir().unwrap();
        let source = tempdir().unwrap();
        std::fs::write(source.path().join("page.html"), "<html>hi</html>").unwrap();

        let store = Store::new(deployments_root.path());
        let record = store
            .deploy(DeployRequest {
                source_dir: source.path().to_path_buf(),
                name: None,
                entry_file: None,
                force: false,
                start_server: false,
                session_id: "sess-1".to_string(),
                existing_id: None,
            })
            .await
            .unwrap();

        let target = PathBuf::from(&record.target);
        assert!(target.join("index.html").exists());
    }

    #[tokio::test]
    async fn deploy_fails_on_ambiguous_entry_file() {
        let deployments_root = tempdir().unwrap();
        let source = tempdir().unwrap();
        std::fs::write(source.path().join("a.html"), "a").unwrap();
        std::fs::write(source.path().join("b.html"), "b").unwrap();

        let store = Store::new(deployments_root.path());
        let err = store
            .deploy(DeployRequest {
                source_dir: source.path().to_path_buf(),
                name: None,
                entry_file: None,
                force: false,
                start_server: false,
                session_id: "sess-1".to_string(),
                existing_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::AmbiguousEntryFile));
    }

    #[tokio::test]
    async fn resolve_asset_rejects_parent_dir_escape() {
        let deployments_root = tempdir().unwrap();
        let source = tempdir().unwrap();
        make_site(source.path());
        let store = Store::new(deployments_root.path());
        let record = store
            .deploy(DeployRequest {
                source_dir: source.path().to_path_buf(),
                name: None,
                entry_file: None,
                force: false,
                start_server: false,
                session_id: "sess-1".to_string(),
                existing_id: None,
            })
            .await
            .unwrap();

        let err = store.resolve_asset(&record.id, "../etc/passwd").unwrap_err();
        assert!(matches!(err, DeployError::PathEscape(_)));
    }

    #[tokio::test]
    async fn resolve_asset_defaults_empty_path_to_index() {
        let deployments_root = tempdir().unwrap();
        let source = tempdir().unwrap();
        make_site(source.path());
        let store = Store::new(deployments_root.path());
        let record = store
            .deploy(DeployRequest {
                source_dir: source.path().to_path_buf(),
                name: None,
                entry_file: None,
                force: false,
                start_server: false,
                session_id: "sess-1".to_string(),
                existing_id: None,
            })
            .await
            .unwrap();

        let resolved = store.resolve_asset(&record.id, "").unwrap();
        assert!(resolved.ends_with("index.html"));
    }

    #[tokio::test]
    async fn cleanup_session_removes_matching_deployments_and_updates_manifest() {
        let deployments_root = tempdir().unwrap();
        let source = tempdir().unwrap();
        make_site(source.path());
        let store = Store::new(deployments_root.path());
        let record = store
            .deploy(DeployRequest {
                source_dir: source.path().to_path_buf(),
                name: None,
                entry_file: None,
                force: false,
                start_server: false,
                session_id: "sess-to-delete".to_string(),
                existing_id: None,
            })
            .await
            .unwrap();

        let outcome = store.cleanup_session("sess-to-delete");
        assert_eq!(outcome.removed_ids, vec![record.id.clone()]);
        assert!(!deployments_root.path().join(&record.id).exists());
        assert!(store.resolve_asset(&record.id, "index.html").is_err());
    }
}
