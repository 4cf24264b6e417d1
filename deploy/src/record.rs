//! On-disk deployment record shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerInfo {
    pub pid: u32,
    pub port: u16,
    pub status: String,
}

/// `<deployments_root>/<id>/deployment.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub target: String,
    pub preview_url: String,
    pub entry_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
}

impl DeploymentRecord {
    pub fn summary(&self) -> DeploymentSummary {
        DeploymentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            slug: self.slug.clone(),
            session_id: self.session_id.clone(),
            timestamp: self.timestamp,
            preview_url: self.preview_url.clone(),
        }
    }
}

/// One entry in the root `manifest.json` list.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DeploymentSummary {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub preview_url: String,
}

/// Slugifies a site name: lowercase alphanumerics and dashes, collapsed.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_dash = false;
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "site".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_and_lowercases() {
        assert_eq!(slugify("My Cool  Site!!"), "my-cool-site");
        assert_eq!(slugify("___"), "site");
        assert_eq!(slugify("Already-Slug"), "already-slug");
    }
}
