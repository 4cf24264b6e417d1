//! Process-wide configuration singleton.
//!
//! Modeled as a service with two operations: [`Configuration::snapshot`] returns an immutable
//! copy, [`Configuration::update`] swaps in a partial update atomically under a single lock so
//! readers never observe a torn update. This replaces the source's module-level mutable struct
//! with a guarded value plus a deep-copied read path.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// One configured chat (language-model) endpoint.
///
/// `api_key` is never serialized back to a client; [`ConfigurationSnapshot`] exposes only
/// `api_key_present`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatEndpointConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub supports_streaming: bool,
}

impl ChatEndpointConfig {
    /// Resolves the effective API key: the literal `api_key` if set, else the value of the
    /// environment variable named by `api_key_env`.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| self.api_key_env.as_deref().and_then(|v| std::env::var(v).ok()))
    }
}

/// One configured media (image/speech/sound-effects/ASR) endpoint. Same redaction rule as chat.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MediaEndpointConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
}

impl MediaEndpointConfig {
    /// Same resolution rule as [`ChatEndpointConfig::resolved_api_key`].
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| self.api_key_env.as_deref().and_then(|v| std::env::var(v).ok()))
    }
}

/// The four independently-configurable media endpoints. `asr` carries configuration only — no tool in this system dispatches to it
/// (Non-goal: speech-to-text tool).
#[derive(Clone, Debug, Default)]
pub struct MediaConfig {
    pub image: Option<MediaEndpointConfig>,
    pub speech: Option<MediaEndpointConfig>,
    pub sound_effects: Option<MediaEndpointConfig>,
    pub asr: Option<MediaEndpointConfig>,
}

/// Workspace-related process configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub path: Option<String>,
    pub confirm_on_start: bool,
    pub preview_base_url: Option<String>,
}

/// Full configuration state held by the process.
#[derive(Clone, Debug, Default)]
struct ConfigState {
    chat: ChatEndpointConfig,
    media: MediaConfig,
    workspace: WorkspaceConfig,
}

/// Redacted view of one media endpoint: `api_key_present` only, never the key itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MediaEndpointSnapshot {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key_present: bool,
}

impl From<&MediaEndpointConfig> for MediaEndpointSnapshot {
    fn from(cfg: &MediaEndpointConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            base_url: cfg.base_url.clone(),
            api_key_present: cfg.api_key.is_some(),
        }
    }
}

/// Redacted view of [`MediaConfig`]; `None` per field iff that endpoint was never configured.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MediaConfigSnapshot {
    pub image: Option<MediaEndpointSnapshot>,
    pub speech: Option<MediaEndpointSnapshot>,
    pub sound_effects: Option<MediaEndpointSnapshot>,
    pub asr: Option<MediaEndpointSnapshot>,
}

/// Redacted, client-facing view of the configuration: `api_key_present` only, never the key
/// itself. This is what `GET /api/config` returns.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigurationSnapshot {
    pub chat: ChatEndpointConfig,
    pub chat_api_key_present: bool,
    pub media: MediaConfigSnapshot,
    pub workspace: WorkspaceConfig,
}

/// A partial update to the configuration. Fields left `None`/`false`-default in the nested
/// structs keep their previous values: unspecified fields keep prior values, and api keys are
/// inherited when omitted.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ConfigurationUpdate {
    pub chat: Option<ChatEndpointUpdate>,
    pub media: Option<MediaConfigUpdate>,
    pub workspace: Option<WorkspaceConfig>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChatEndpointUpdate {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub supports_streaming: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MediaEndpointUpdate {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
}

/// One update per media endpoint; an endpoint left `None` here is untouched, matching
/// `ConfigurationUpdate`'s "unspecified fields keep prior values" rule one level up.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MediaConfigUpdate {
    pub image: Option<MediaEndpointUpdate>,
    pub speech: Option<MediaEndpointUpdate>,
    pub sound_effects: Option<MediaEndpointUpdate>,
    pub asr: Option<MediaEndpointUpdate>,
}

fn apply_media_update(slot: &mut Option<MediaEndpointConfig>, update: MediaEndpointUpdate) {
    let cfg = slot.get_or_insert_with(MediaEndpointConfig::default);
    if let Some(v) = update.model {
        cfg.model = Some(v);
    }
    if let Some(v) = update.base_url {
        cfg.base_url = Some(v);
    }
    if let Some(v) = update.api_key {
        cfg.api_key = Some(v);
    }
    if let Some(v) = update.api_key_env {
        cfg.api_key_env = Some(v);
    }
}

/// Process-wide configuration service.
///
/// Guarded by a single `RwLock`: [`snapshot`](Self::snapshot) takes a read lock and clones out
/// (readers never see a torn update mid-write); [`update`](Self::update) takes a write lock and
/// merges the partial update in one critical section.
#[derive(Clone)]
pub struct Configuration {
    inner: Arc<RwLock<ConfigState>>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ConfigState::default())),
        }
    }

    /// Returns a redacted, deep-copied snapshot of the current configuration.
    pub fn snapshot(&self) -> ConfigurationSnapshot {
        let state = self.inner.read().expect("configuration lock poisoned");
        ConfigurationSnapshot {
            chat: ChatEndpointConfig {
                api_key: None,
                ..state.chat.clone()
            },
            chat_api_key_present: state.chat.api_key.is_some(),
            media: MediaConfigSnapshot {
                image: state.media.image.as_ref().map(MediaEndpointSnapshot::from),
                speech: state.media.speech.as_ref().map(MediaEndpointSnapshot::from),
                sound_effects: state.media.sound_effects.as_ref().map(MediaEndpointSnapshot::from),
                asr: state.media.asr.as_ref().map(MediaEndpointSnapshot::from),
            },
            workspace: state.workspace.clone(),
        }
    }

    /// Merges a partial update into the configuration. Unspecified fields are left untouched;
    /// an omitted `api_key` keeps the previously configured key.
    pub fn update(&self, update: ConfigurationUpdate) {
        let mut state = self.inner.write().expect("configuration lock poisoned");
        if let Some(c) = update.chat {
            if let Some(v) = c.model {
                state.chat.model = Some(v);
            }
            if let Some(v) = c.base_url {
                state.chat.base_url = Some(v);
            }
            if let Some(v) = c.api_key {
                state.chat.api_key = Some(v);
            }
            if let Some(v) = c.api_key_env {
                state.chat.api_key_env = Some(v);
            }
            if let Some(v) = c.supports_streaming {
                state.chat.supports_streaming = v;
            }
        }
        if let Some(m) = update.media {
            if let Some(v) = m.image {
                apply_media_update(&mut state.media.image, v);
            }
            if let Some(v) = m.speech {
                apply_media_update(&mut state.media.speech, v);
            }
            if let Some(v) = m.sound_effects {
                apply_media_update(&mut state.media.sound_effects, v);
            }
            if let Some(v) = m.asr {
                apply_media_update(&mut state.media.asr, v);
            }
        }
        if let Some(w) = update.workspace {
            state.workspace = w;
        }
    }

    /// Returns true iff the chat endpoint is configured to advertise streaming support.
    pub fn chat_supports_streaming(&self) -> bool {
        self.inner
            .read()
            .expect("configuration lock poisoned")
            .chat
            .supports_streaming
    }

    /// Unredacted chat endpoint config, `api_key` included. For internal use only (building the
    /// actual `ChatEndpoint` collaborator) — never exposed over HTTP; [`Configuration::snapshot`]
    /// is the client-facing view.
    pub fn chat_config(&self) -> ChatEndpointConfig {
        self.inner.read().expect("configuration lock poisoned").chat.clone()
    }

    /// Unredacted media config, same caveat as [`Configuration::chat_config`].
    pub fn media_config(&self) -> MediaConfig {
        self.inner.read().expect("configuration lock poisoned").media.clone()
    }

    /// Current workspace config (already unredacted — it carries no secret).
    pub fn workspace_config(&self) -> WorkspaceConfig {
        self.inner.read().expect("configuration lock poisoned").workspace.clone()
    }

    /// Applies the `OKCVM_<SERVICE>_{MODEL,BASE_URL,API_KEY}` / `OKCVM_WORKSPACE_*` environment
    /// convention into this configuration. Call once at process startup, after
    /// [`crate::load_and_apply`] has populated the process environment from `.env`/XDG sources.
    /// Unset variables leave the corresponding field untouched.
    pub fn load_from_env(&self) {
        let endpoint_update = |prefix: &str| -> Option<MediaEndpointUpdate> {
            let update = MediaEndpointUpdate {
                model: env_var(&format!("{prefix}_MODEL")),
                base_url: env_var(&format!("{prefix}_BASE_URL")),
                api_key: env_var(&format!("{prefix}_API_KEY")),
                api_key_env: env_var(&format!("{prefix}_API_KEY_ENV")),
            };
            let configured = update.model.is_some()
                || update.base_url.is_some()
                || update.api_key.is_some()
                || update.api_key_env.is_some();
            configured.then_some(update)
        };
        let chat = endpoint_update("OKCVM_CHAT").unwrap_or_default();
        self.update(ConfigurationUpdate {
            chat: Some(ChatEndpointUpdate {
                model: chat.model,
                base_url: chat.base_url,
                api_key: chat.api_key,
                api_key_env: chat.api_key_env,
                supports_streaming: env_var("OKCVM_CHAT_SUPPORTS_STREAMING")
                    .map(|v| matches!(v.as_str(), "1" | "true" | "yes")),
            }),
            media: Some(MediaConfigUpdate {
                image: endpoint_update("OKCVM_IMAGE"),
                speech: endpoint_update("OKCVM_SPEECH"),
                sound_effects: endpoint_update("OKCVM_SOUND_EFFECTS"),
                asr: endpoint_update("OKCVM_ASR"),
            }),
            workspace: Some(WorkspaceConfig {
                path: env_var("OKCVM_WORKSPACE_PATH"),
                confirm_on_start: env_var("OKCVM_WORKSPACE_CONFIRM_ON_START")
                    .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
                preview_base_url: env_var("OKCVM_PREVIEW_BASE_URL"),
            }),
        });
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_never_exposes_api_key() {
        let cfg = Configuration::new();
        cfg.update(ConfigurationUpdate {
            chat: Some(ChatEndpointUpdate {
                api_key: Some("sk-secret".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        let snap = cfg.snapshot();
        assert!(snap.chat_api_key_present);
        assert!(snap.chat.api_key.is_none());
        let json = serde_json::to_string(&snap).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn partial_update_preserves_unspecified_fields() {
        let cfg = Configuration::new();
        cfg.update(ConfigurationUpdate {
            chat: Some(ChatEndpointUpdate {
                model: Some("gpt-5".to_string()),
                api_key: Some("key-1".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        cfg.update(ConfigurationUpdate {
            chat: Some(ChatEndpointUpdate {
                base_url: Some("https://example.invalid".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        let snap = cfg.snapshot();
        assert_eq!(snap.chat.model.as_deref(), Some("gpt-5"));
        assert_eq!(
            snap.chat.base_url.as_deref(),
            Some("https://example.invalid")
        );
        assert!(snap.chat_api_key_present, "omitted api_key must be inherited");
    }

    #[test]
    fn chat_supports_streaming_reflects_update() {
        let cfg = Configuration::new();
        assert!(!cfg.chat_supports_streaming());
        cfg.update(ConfigurationUpdate {
            chat: Some(ChatEndpointUpdate {
                supports_streaming: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(cfg.chat_supports_streaming());
    }

    #[test]
    fn media_endpoints_are_independently_configured_and_redacted() {
        let cfg = Configuration::new();
        cfg.update(ConfigurationUpdate {
            media: Some(MediaConfigUpdate {
                image: Some(MediaEndpointUpdate {
                    model: Some("image-gen-1".to_string()),
                    api_key: Some("img-secret".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        let snap = cfg.snapshot();
        let image = snap.media.image.unwrap();
        assert_eq!(image.model.as_deref(), Some("image-gen-1"));
        assert!(image.api_key_present);
        assert!(snap.media.speech.is_none());

        cfg.update(ConfigurationUpdate {
            media: Some(MediaConfigUpdate {
                image: Some(MediaEndpointUpdate {
                    base_url: Some("https://images.invalid".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        let snap = cfg.snapshot();
        let image = snap.media.image.unwrap();
        assert_eq!(image.model.as_deref(), Some("image-gen-1"), "unspecified field kept");
        assert!(image.api_key_present, "omitted api_key inherited");
    }

    #[test]
    fn load_from_env_populates_chat_and_leaves_unset_media_endpoints_absent() {
        std::env::set_var("OKCVM_CHAT_MODEL", "gpt-test-env");
        std::env::set_var("OKCVM_CHAT_BASE_URL", "https://chat.invalid");
        std::env::set_var("OKCVM_SPEECH_MODEL", "speech-test-env");
        std::env::set_var("OKCVM_SPEECH_BASE_URL", "https://speech.invalid");
        std::env::remove_var("OKCVM_IMAGE_MODEL");
        std::env::remove_var("OKCVM_IMAGE_BASE_URL");
        std::env::remove_var("OKCVM_IMAGE_API_KEY");
        std::env::remove_var("OKCVM_IMAGE_API_KEY_ENV");

        let cfg = Configuration::new();
        cfg.load_from_env();
        let snap = cfg.snapshot();

        assert_eq!(snap.chat.model.as_deref(), Some("gpt-test-env"));
        assert_eq!(snap.chat.base_url.as_deref(), Some("https://chat.invalid"));
        assert_eq!(snap.media.speech.unwrap().model.as_deref(), Some("speech-test-env"));
        assert!(snap.media.image.is_none(), "unset service stays unconfigured, not empty");

        std::env::remove_var("OKCVM_CHAT_MODEL");
        std::env::remove_var("OKCVM_CHAT_BASE_URL");
        std::env::remove_var("OKCVM_SPEECH_MODEL");
        std::env::remove_var("OKCVM_SPEECH_BASE_URL");
    }
}
