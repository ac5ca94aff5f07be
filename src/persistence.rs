//! SessionPersistence: workdir resolution and the durable
//! `(conversationId, agentId) -> {sessionId?, workdir?}` mapping.
//!
//! The durable half of this mapping lives behind `ProviderConfig`, supplied
//! by the host application. `SessionPersistence` adds the resolution logic
//! and an in-process cache so repeated `resolveWorkdir` calls for the same
//! input are referentially transparent without re-touching the backing
//! store (§8.5 — workdir idempotence).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::types::PersistedSessionData;

/// Durable session/workdir mapping plus workdir resolution.
pub struct SessionPersistence {
    config: Arc<dyn ProviderConfig>,
    /// Application-chosen root for defaulted workdirs; layout is
    /// `<root>/<conversationId>/` (see `SPEC_FULL.md` §4.1).
    workspace_root: PathBuf,
    resolved_cache: Mutex<HashMap<String, PathBuf>>,
}

impl SessionPersistence {
    pub fn new(config: Arc<dyn ProviderConfig>, workspace_root: PathBuf) -> Self {
        Self {
            config,
            workspace_root,
            resolved_cache: Mutex::new(HashMap::new()),
        }
    }

    /// `getSessionData`. Read errors are treated as missing, not surfaced.
    pub async fn get_session_data(
        &self,
        conversation_id: &str,
        agent_id: &str,
    ) -> Option<PersistedSessionData> {
        self.config
            .session_data(conversation_id, agent_id)
            .await
            .unwrap_or(None)
    }

    /// `getWorkdir`. Returns the stored value resolved to an absolute path,
    /// generating and persisting a default when none is stored.
    pub async fn get_workdir(&self, conversation_id: &str, agent_id: &str) -> Result<PathBuf> {
        let stored = self
            .get_session_data(conversation_id, agent_id)
            .await
            .and_then(|d| d.workdir);

        match stored {
            Some(raw) => Ok(self.resolve_workdir(Some(&raw))),
            None => {
                let default = self.default_workdir(conversation_id);
                self.update_workdir(conversation_id, agent_id, Some(default.display().to_string()))
                    .await?;
                Ok(default)
            }
        }
    }

    /// `updateWorkdir`. Empty strings become `None`.
    pub async fn update_workdir(
        &self,
        conversation_id: &str,
        agent_id: &str,
        workdir: Option<String>,
    ) -> Result<()> {
        let trimmed = workdir.map(|w| w.trim().to_string()).filter(|w| !w.is_empty());
        self.config.update_workdir(conversation_id, agent_id, trimmed).await
    }

    /// `updateSessionId`.
    pub async fn update_session_id(
        &self,
        conversation_id: &str,
        agent_id: &str,
        session_id: Option<String>,
    ) -> Result<()> {
        self.config.update_session_id(conversation_id, agent_id, session_id).await
    }

    /// `resolveWorkdir(stored) -> absolutePath`. Idempotent and
    /// referentially transparent per process (property 5).
    ///
    /// - `None` -> the per-application default root.
    /// - `~/...` -> resolved against the user's home directory.
    /// - relative -> resolved against the workspace root.
    /// - absolute -> canonicalized if it exists, otherwise used as-is.
    pub fn resolve_workdir(&self, stored: Option<&str>) -> PathBuf {
        let key = stored.unwrap_or("").to_string();
        if let Some(cached) = self.resolved_cache.lock().unwrap().get(&key) {
            return cached.clone();
        }

        let resolved = match stored {
            None => self.workspace_root.clone(),
            Some(raw) if raw.starts_with('~') => {
                let home = dirs::home_dir().unwrap_or_else(|| self.workspace_root.clone());
                let rest = raw.trim_start_matches('~').trim_start_matches('/');
                home.join(rest)
            }
            Some(raw) => {
                let path = Path::new(raw);
                if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.workspace_root.join(path)
                }
            }
        };
        let resolved = resolved.canonicalize().unwrap_or(resolved);

        self.resolved_cache.lock().unwrap().insert(key, resolved.clone());
        resolved
    }

    /// Deterministic per-conversation subdirectory under the workspace
    /// root, used when no workdir has been persisted yet.
    fn default_workdir(&self, conversation_id: &str) -> PathBuf {
        self.workspace_root.join(conversation_id)
    }
}
