//! The configuration interface the core consumes but never implements.
//!
//! Persisted agent definitions, enable flags, and per-conversation workdir
//! state live in the host application's own configuration store. This
//! module only names the contract; production callers supply their own
//! `ProviderConfig` backed by that store.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AgentDefinition, PersistedSessionData};

/// External collaborator: the host application's persisted configuration.
#[async_trait]
pub trait ProviderConfig: Send + Sync {
    /// Whether the ACP provider is currently enabled.
    async fn acp_enabled(&self) -> Result<bool>;

    /// The full registry of configured agents.
    async fn acp_agents(&self) -> Result<Vec<AgentDefinition>>;

    /// Per-conversation, per-agent persisted session data, if any.
    async fn session_data(
        &self,
        conversation_id: &str,
        agent_id: &str,
    ) -> Result<Option<PersistedSessionData>>;

    /// Store the trimmed workdir (`None` clears it).
    async fn update_workdir(
        &self,
        conversation_id: &str,
        agent_id: &str,
        workdir: Option<String>,
    ) -> Result<()>;

    /// Store the ACP-assigned session id (`None` clears it).
    async fn update_session_id(
        &self,
        conversation_id: &str,
        agent_id: &str,
        session_id: Option<String>,
    ) -> Result<()>;

    /// Publish the model catalog for a provider id (one pseudo-model per
    /// configured agent).
    async fn set_provider_models(&self, provider_id: &str, models: Vec<String>) -> Result<()>;
}

/// In-memory `ProviderConfig` used by this crate's own test suite. Not
/// exported outside test builds — production callers always supply their
/// own implementation backed by real persisted storage.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryProviderConfig {
        enabled: Mutex<bool>,
        agents: Mutex<Vec<AgentDefinition>>,
        sessions: Mutex<HashMap<(String, String), PersistedSessionData>>,
        published_models: Mutex<HashMap<String, Vec<String>>>,
    }

    impl InMemoryProviderConfig {
        pub fn new(enabled: bool, agents: Vec<AgentDefinition>) -> Self {
            Self {
                enabled: Mutex::new(enabled),
                agents: Mutex::new(agents),
                sessions: Mutex::new(HashMap::new()),
                published_models: Mutex::new(HashMap::new()),
            }
        }

        pub fn set_enabled(&self, enabled: bool) {
            *self.enabled.lock().unwrap() = enabled;
        }

        pub fn published_models(&self, provider_id: &str) -> Option<Vec<String>> {
            self.published_models.lock().unwrap().get(provider_id).cloned()
        }
    }

    #[async_trait]
    impl ProviderConfig for InMemoryProviderConfig {
        async fn acp_enabled(&self) -> Result<bool> {
            Ok(*self.enabled.lock().unwrap())
        }

        async fn acp_agents(&self) -> Result<Vec<AgentDefinition>> {
            Ok(self.agents.lock().unwrap().clone())
        }

        async fn session_data(
            &self,
            conversation_id: &str,
            agent_id: &str,
        ) -> Result<Option<PersistedSessionData>> {
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .get(&(conversation_id.to_string(), agent_id.to_string()))
                .cloned())
        }

        async fn update_workdir(
            &self,
            conversation_id: &str,
            agent_id: &str,
            workdir: Option<String>,
        ) -> Result<()> {
            let key = (conversation_id.to_string(), agent_id.to_string());
            let mut sessions = self.sessions.lock().unwrap();
            let entry = sessions.entry(key).or_insert_with(|| PersistedSessionData {
                conversation_id: conversation_id.to_string(),
                agent_id: agent_id.to_string(),
                session_id: None,
                workdir: None,
            });
            entry.workdir = workdir;
            Ok(())
        }

        async fn update_session_id(
            &self,
            conversation_id: &str,
            agent_id: &str,
            session_id: Option<String>,
        ) -> Result<()> {
            let key = (conversation_id.to_string(), agent_id.to_string());
            let mut sessions = self.sessions.lock().unwrap();
            let entry = sessions.entry(key).or_insert_with(|| PersistedSessionData {
                conversation_id: conversation_id.to_string(),
                agent_id: agent_id.to_string(),
                session_id: None,
                workdir: None,
            });
            entry.session_id = session_id;
            Ok(())
        }

        async fn set_provider_models(&self, provider_id: &str, models: Vec<String>) -> Result<()> {
            self.published_models
                .lock()
                .unwrap()
                .insert(provider_id.to_string(), models);
            Ok(())
        }
    }
}
