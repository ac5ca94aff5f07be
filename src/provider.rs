//! Provider: the public entry point. Produces, per prompt invocation, a
//! finite lazy sequence of `StreamEvent`s, per the six-state machine in the
//! component design (§4.5).

use std::path::PathBuf;
use std::sync::Arc;

use agent_client_protocol::StopReason;
use tracing::Instrument;

use crate::agent_client::PermissionHandler;
use crate::config::ProviderConfig;
use crate::content::ContentMapper;
use crate::error::AcpError;
use crate::formatter::MessageFormatter;
use crate::persistence::SessionPersistence;
use crate::process::ProcessManager;
use crate::queue::{self, EventReceiver};
use crate::session_manager::{SessionCallbackSet, SessionManager};
use crate::tracing_util::TraceContext;
use crate::types::{ChatMessage, StreamEvent, StreamStopReason};

/// What the caller wants a stream produced for.
pub struct PromptRequest {
    pub model_id: String,
    pub conversation_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub workdir_override: Option<PathBuf>,
}

/// Owns the five components and orchestrates one stream per prompt.
pub struct Provider {
    provider_id: String,
    config: Arc<dyn ProviderConfig>,
    processes: Arc<ProcessManager>,
    persistence: Arc<SessionPersistence>,
    sessions: Arc<SessionManager>,
    permission_handler: Arc<dyn PermissionHandler>,
}

impl Provider {
    pub fn new(
        provider_id: impl Into<String>,
        config: Arc<dyn ProviderConfig>,
        workspace_root: PathBuf,
        permission_handler: Arc<dyn PermissionHandler>,
    ) -> Self {
        let persistence = Arc::new(SessionPersistence::new(config.clone(), workspace_root));
        let processes = Arc::new(ProcessManager::new());
        let sessions = Arc::new(SessionManager::new(processes.clone(), persistence.clone()));
        Self {
            provider_id: provider_id.into(),
            config,
            processes,
            persistence,
            sessions,
            permission_handler,
        }
    }

    /// `coreStream`. Never returns an `Err` — guard-check and session
    /// failures are represented as `error` + `stop{error}` events within the
    /// returned stream, per §4.5 step 1.
    pub async fn core_stream(&self, request: PromptRequest) -> EventReceiver {
        let (tx, mut rx) = queue::channel();

        // 1. Guard checks.
        let enabled = self.config.acp_enabled().await.unwrap_or(false);
        if !enabled {
            tx.push(StreamEvent::Error {
                error_message: "ACP provider is disabled".to_string(),
            });
            tx.push(StreamEvent::Stop { stop_reason: StreamStopReason::Error });
            return rx;
        }

        let agents = match self.config.acp_agents().await {
            Ok(agents) => agents,
            Err(e) => {
                tx.push(StreamEvent::Error { error_message: e.to_string() });
                tx.push(StreamEvent::Stop { stop_reason: StreamStopReason::Error });
                return rx;
            }
        };
        let Some(agent) = agents.into_iter().find(|a| a.id == request.model_id) else {
            tx.push(StreamEvent::Error {
                error_message: format!("unknown agent for model id {}", request.model_id),
            });
            tx.push(StreamEvent::Stop { stop_reason: StreamStopReason::Error });
            return rx;
        };

        // 3. Session acquisition.
        let conversation_key = request.conversation_id.clone().unwrap_or_else(|| request.model_id.clone());
        let trace = TraceContext::with_session_id(conversation_key.clone());
        let callbacks = SessionCallbackSet {
            events: tx.raw(),
            permission: self.permission_handler.clone(),
        };

        tracing::debug!(conversation_key = %trace.session_id(), agent_id = %agent.id, "acquiring ACP session");
        let process = match self
            .sessions
            .get_or_create_session(&conversation_key, &agent, callbacks, request.workdir_override.clone(), true)
            .await
        {
            Ok(process) => process,
            Err(e) => {
                tx.push(StreamEvent::Error { error_message: e.to_string() });
                tx.push(StreamEvent::Stop { stop_reason: StreamStopReason::Error });
                return rx;
            }
        };

        // Need the session id bound to this conversation to prompt/cancel.
        let session_id = match self.sessions.session_id_for(&conversation_key).await {
            Some(id) => id,
            None => {
                tx.push(StreamEvent::Error {
                    error_message: "session vanished immediately after creation".to_string(),
                });
                tx.push(StreamEvent::Stop { stop_reason: StreamStopReason::Error });
                return rx;
            }
        };

        // Cancellation trigger per the spec: the consumer abandons iteration
        // (drops the receiver) before it reaches a `Stop` event. `cancel()`
        // remains available as an explicit, caller-driven alternative.
        let cancel_process = process.clone();
        let cancel_session_id = session_id.clone();
        rx.cancel_on_drop(move || {
            tracing::info!(
                error = %AcpError::UserCancellation,
                session_id = %cancel_session_id,
                "stream abandoned by consumer, cancelling agent session"
            );
            cancel_process.cancel(cancel_session_id);
        });

        // 4. Prompt submission, run as a detached task so the caller gets a
        // stream back immediately.
        let blocks = MessageFormatter::format(&request.messages);
        let push_tx = tx.clone();
        let prompt_span = trace.new_request().request_span("session/prompt");
        tokio::spawn(
            async move {
                match process.prompt(session_id, blocks).await {
                    Ok(stop_reason) => {
                        tracing::debug!("prompt completed");
                        push_tx.push(StreamEvent::Stop {
                            stop_reason: ContentMapper::map_stop_reason(stop_reason),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "prompt failed");
                        push_tx.push(StreamEvent::Error { error_message: e.to_string() });
                        push_tx.push(StreamEvent::Stop { stop_reason: StreamStopReason::Error });
                    }
                }
            }
            .instrument(prompt_span),
        );

        rx
    }

    /// Issues `cancel{sessionId}` for the conversation's current prompt.
    /// Best-effort: the SessionRecord is not destroyed (§4.5 step 6).
    pub async fn cancel(&self, conversation_id: &str) {
        if let Some((process, session_id)) = self.sessions.process_and_session_id(conversation_id).await {
            process.cancel(session_id);
        }
    }

    /// Drains `core_stream` to exhaustion, concatenating `text` and
    /// `reasoning` fragments (the non-streaming entry points share this).
    pub async fn completions(&self, request: PromptRequest) -> (String, String) {
        let mut rx = self.core_stream(request).await;
        let mut content = String::new();
        let mut reasoning_content = String::new();
        while let Some(event) = rx.next().await {
            match event {
                StreamEvent::Text { content: chunk } => content.push_str(&chunk),
                StreamEvent::Reasoning { reasoning_content: chunk } => reasoning_content.push_str(&chunk),
                StreamEvent::Stop { .. } => break,
                _ => {}
            }
        }
        (content, reasoning_content)
    }

    pub async fn summaries(&self, request: PromptRequest) -> (String, String) {
        self.completions(request).await
    }

    pub async fn generate_text(&self, request: PromptRequest) -> (String, String) {
        self.completions(request).await
    }

    pub async fn summary_titles(&self, request: PromptRequest) -> (String, String) {
        self.completions(request).await
    }

    /// Enable-state transition: publishes one pseudo-model per configured
    /// agent and broadcasts `model-list-changed` (§4.5).
    pub async fn refresh_model_list(&self) -> crate::error::Result<()> {
        let agents = self.config.acp_agents().await?;
        let models = agents.into_iter().map(|a| a.id).collect();
        self.config.set_provider_models(&self.provider_id, models).await
    }

    /// Agent refresh: clears sessions bound to the changed agents and
    /// releases their processes so the next request respawns with the new
    /// configuration.
    pub async fn refresh_agents(&self, changed_agent_ids: &[String]) {
        for agent_id in changed_agent_ids {
            self.sessions.clear_sessions_by_agent(agent_id).await;
            self.processes.release(agent_id).await;
        }
    }

    pub fn persistence(&self) -> &SessionPersistence {
        &self.persistence
    }
}

/// Maps an ACP `StopReason` via `ContentMapper` into the consumer's
/// vocabulary. Exposed for callers that receive a raw `StopReason` outside
/// `core_stream` (e.g. a non-streaming shortcut in a future extension).
pub fn map_stop_reason(reason: Option<StopReason>) -> StreamStopReason {
    ContentMapper::map_stop_reason(reason)
}
