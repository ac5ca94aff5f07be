//! SessionManager: `Map<conversationKey, SessionRecord>` and the five-step
//! session creation algorithm (component design §4.4).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{mpsc, Mutex};

use crate::agent_client::{PermissionHandler, SessionCallbacks};
use crate::error::{AcpError, Result};
use crate::persistence::SessionPersistence;
use crate::process::{ProcessHandle, ProcessManager};
use crate::tracing_util::TraceContext;
use crate::types::{AgentDefinition, StreamEvent};

/// A live, bound-to-a-conversation ACP session.
pub struct SessionRecord {
    pub conversation_key: String,
    pub agent_id: String,
    pub session_id: String,
    pub process: Arc<ProcessHandle>,
    pub workdir: PathBuf,
    pub created_at: SystemTime,
}

/// Whether a `session/load` should even be attempted. Agents that never
/// advertised load support fall straight to `session/new`; this is a
/// capability the provider learns from the agent's `initialize` response in
/// a full implementation, modeled here as a simple per-call flag the caller
/// supplies (the in-scope agents this crate has been driven against all
/// support `session/load`, so the common call path defaults it to `true`).
pub struct SessionCallbackSet {
    pub events: mpsc::UnboundedSender<StreamEvent>,
    pub permission: Arc<dyn PermissionHandler>,
}

pub struct SessionManager {
    processes: Arc<ProcessManager>,
    persistence: Arc<SessionPersistence>,
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl SessionManager {
    pub fn new(processes: Arc<ProcessManager>, persistence: Arc<SessionPersistence>) -> Self {
        Self {
            processes,
            persistence,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the existing record for `conversation_key` if its
    /// `(agentId, resolvedWorkdir)` still matches; otherwise creates one via
    /// the five-step algorithm in §4.4.
    pub async fn get_or_create_session(
        &self,
        conversation_key: &str,
        agent: &AgentDefinition,
        callbacks: SessionCallbackSet,
        workdir_override: Option<PathBuf>,
        supports_load: bool,
    ) -> Result<Arc<ProcessHandle>> {
        let trace = TraceContext::with_session_id(conversation_key.to_string());
        let resolved_workdir = match &workdir_override {
            Some(w) => w.clone(),
            None => self.persistence.get_workdir(conversation_key, &agent.id).await?,
        };

        {
            let records = self.records.lock().await;
            if let Some(existing) = records.get(conversation_key) {
                let still_matches = existing.agent_id == agent.id
                    && existing.workdir == resolved_workdir
                    && existing.process.health() != crate::types::Health::Dead;
                if still_matches {
                    tracing::debug!(
                        conversation_key = %trace.session_id(),
                        agent_id = %agent.id,
                        "reusing existing ACP session"
                    );
                    let process = existing.process.clone();
                    self.bind_callbacks(&process, &existing.session_id, callbacks).await;
                    return Ok(process);
                }
            }
        }

        // Agent or workdir changed (or no record yet): clear first, per the
        // invariant that changing either is equivalent to a fresh creation.
        self.clear_session(conversation_key).await;

        tracing::debug!(
            conversation_key = %trace.session_id(),
            agent_id = %agent.id,
            "creating ACP session"
        );

        // 1. Obtain the agent's ProcessHandle.
        let process = self.processes.get_connection(agent).await?;

        // 2. workdir already resolved above.

        // 3. session/load if persisted and supported, else session/new.
        let persisted = self.persistence.get_session_data(conversation_key, &agent.id).await;
        let session_id = match persisted.as_ref().and_then(|d| d.session_id.clone()) {
            Some(existing_id) if supports_load => {
                match process.load_session(existing_id.clone(), resolved_workdir.clone()).await {
                    Ok(()) => existing_id,
                    Err(e) => {
                        tracing::warn!(
                            conversation_key = %trace.session_id(),
                            agent_id = %agent.id,
                            error = %e,
                            "session/load failed, falling back to session/new"
                        );
                        process.new_session(resolved_workdir.clone()).await?
                    }
                }
            }
            _ => process.new_session(resolved_workdir.clone()).await?,
        };

        // 4. Persist the resulting sessionId.
        self.persistence
            .update_session_id(conversation_key, &agent.id, Some(session_id.clone()))
            .await?;

        tracing::info!(
            conversation_key = %trace.session_id(),
            agent_id = %agent.id,
            acp_session_id = %session_id,
            "ACP session bound"
        );

        // 5. Register callbacks with the process's dispatcher.
        self.bind_callbacks(&process, &session_id, callbacks).await;

        let record = SessionRecord {
            conversation_key: conversation_key.to_string(),
            agent_id: agent.id.clone(),
            session_id,
            process: process.clone(),
            workdir: resolved_workdir,
            created_at: SystemTime::now(),
        };

        self.records.lock().await.insert(conversation_key.to_string(), record);
        Ok(process)
    }

    async fn bind_callbacks(&self, process: &ProcessHandle, session_id: &str, callbacks: SessionCallbackSet) {
        process
            .register_session(
                session_id.to_string(),
                SessionCallbacks {
                    events: callbacks.events,
                    permission: callbacks.permission,
                },
            )
            .await;
    }

    /// Tears down one session. Does not touch the underlying ProcessHandle —
    /// other conversations may still reference it.
    pub async fn clear_session(&self, conversation_key: &str) {
        let record = self.records.lock().await.remove(conversation_key);
        if let Some(record) = record {
            tracing::debug!(
                conversation_key,
                agent_id = %record.agent_id,
                "clearing ACP session"
            );
            record.process.unregister_session(record.session_id).await;
            record.process.release_ref();
        }
    }

    /// Clears every session bound to `agent_id` in a single atomic sweep
    /// (§4.4 invariant 3 / §8.3).
    pub async fn clear_sessions_by_agent(&self, agent_id: &str) {
        let mut records = self.records.lock().await;
        let to_remove: Vec<String> = records
            .iter()
            .filter(|(_, r)| r.agent_id == agent_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in to_remove {
            if let Some(record) = records.remove(&key) {
                record.process.unregister_session(record.session_id).await;
                record.process.release_ref();
            }
        }
    }

    /// Clears every session, regardless of agent.
    pub async fn clear_all(&self) {
        let mut records = self.records.lock().await;
        for (_, record) in records.drain() {
            record.process.unregister_session(record.session_id).await;
            record.process.release_ref();
        }
    }

    /// Removes every record whose ProcessHandle has gone `Dead`, so a
    /// crashed process's sessions don't linger past the next lookup
    /// (§4.4 invariant 3: one atomic sweep before the next
    /// `get_or_create_session` for any of them can succeed).
    pub async fn sweep_dead(&self) {
        let mut records = self.records.lock().await;
        let dead: Vec<String> = records
            .iter()
            .filter(|(_, r)| r.process.health() == crate::types::Health::Dead)
            .map(|(k, _)| k.clone())
            .collect();
        for key in dead {
            records.remove(&key);
        }
    }

    pub async fn has_session(&self, conversation_key: &str) -> bool {
        self.records.lock().await.contains_key(conversation_key)
    }

    /// The ACP session id currently bound to `conversation_key`, if any.
    pub async fn session_id_for(&self, conversation_key: &str) -> Option<String> {
        self.records.lock().await.get(conversation_key).map(|r| r.session_id.clone())
    }

    /// The process and session id currently bound to `conversation_key`, if
    /// any — used to issue `cancel{sessionId}` on the right connection.
    pub async fn process_and_session_id(&self, conversation_key: &str) -> Option<(Arc<ProcessHandle>, String)> {
        self.records
            .lock()
            .await
            .get(conversation_key)
            .map(|r| (r.process.clone(), r.session_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_client::AlwaysCancel;
    use crate::config::test_support::InMemoryProviderConfig;
    use std::collections::HashMap as Map;

    fn agent(id: &str) -> AgentDefinition {
        AgentDefinition {
            id: id.to_string(),
            name: id.to_string(),
            command: PathBuf::from("/nonexistent/agent-binary"),
            args: vec![],
            env: Map::new(),
            protocol_hint: None,
        }
    }

    fn manager() -> SessionManager {
        let config = Arc::new(InMemoryProviderConfig::new(true, vec![]));
        let persistence = Arc::new(SessionPersistence::new(config, PathBuf::from("/tmp/deepchat-test-root")));
        SessionManager::new(Arc::new(ProcessManager::new()), persistence)
    }

    fn callbacks() -> SessionCallbackSet {
        let (tx, _rx) = mpsc::unbounded_channel();
        SessionCallbackSet {
            events: tx,
            permission: Arc::new(AlwaysCancel),
        }
    }

    #[tokio::test]
    async fn clear_session_on_unknown_key_is_a_no_op() {
        let manager = manager();
        manager.clear_session("never-created").await;
        assert!(!manager.has_session("never-created").await);
    }

    #[tokio::test]
    async fn get_or_create_session_surfaces_spawn_failure() {
        let manager = manager();
        let agent = agent("missing");
        let result = manager
            .get_or_create_session("conv1", &agent, callbacks(), None, true)
            .await;
        assert!(matches!(result, Err(AcpError::SpawnFailed(_))));
        assert!(!manager.has_session("conv1").await);
    }

    #[tokio::test]
    async fn clear_sessions_by_agent_on_empty_map_is_a_no_op() {
        let manager = manager();
        manager.clear_sessions_by_agent("some-agent").await;
    }
}
