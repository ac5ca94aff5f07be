//! The `agent_client_protocol::Client` implementation.
//!
//! One `AcpClient` is shared by every session bound to a single agent
//! process. It does not itself decide what a session update means to the
//! rest of the application — it looks up the registered callbacks for the
//! notification's `sessionId` and forwards to them. This is the "dispatcher
//! demultiplexes by sessionId" requirement of the component design (§4.2
//! step 5).
//!
//! File read/write passthroughs mirror the teacher's plain `tokio::fs`
//! approach — no sandboxing beyond the inherited environment, matching the
//! explicit non-goal. Terminal operations are not implemented; ACP agents
//! that require them are out of scope for this core.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use agent_client_protocol::{
    Client, CreateTerminalRequest, CreateTerminalResponse, Error as AcpWireError, ExtNotification,
    ExtRequest, ExtResponse, KillTerminalCommandRequest, KillTerminalCommandResponse,
    ReadTextFileRequest, ReadTextFileResponse, ReleaseTerminalRequest, ReleaseTerminalResponse,
    RequestPermissionOutcome, RequestPermissionRequest, RequestPermissionResponse,
    Result as AcpWireResult, SelectedPermissionOutcome, SessionNotification,
    TerminalOutputRequest, TerminalOutputResponse, WaitForTerminalExitRequest,
    WaitForTerminalExitResponse, WriteTextFileRequest, WriteTextFileResponse,
};

use crate::content::ContentMapper;
use crate::types::{PermissionOption, PermissionOptionKind, PermissionOutcome, PermissionRequest, StreamEvent};

/// Routes a `requestPermission` call to whatever surface the host
/// application uses to ask a human. The core ships no implementation —
/// the consuming application supplies one (e.g. a modal dialog).
#[async_trait]
pub trait PermissionHandler: Send + Sync {
    async fn handle(&self, request: PermissionRequest) -> PermissionOutcome;
}

/// A `PermissionHandler` that always cancels; used for read-only agents
/// and as the default when no handler is configured.
pub struct AlwaysCancel;

#[async_trait]
impl PermissionHandler for AlwaysCancel {
    async fn handle(&self, _request: PermissionRequest) -> PermissionOutcome {
        PermissionOutcome::Cancelled
    }
}

/// Per-session routing target registered by `SessionManager` when it binds
/// a conversation to a freshly created or loaded ACP session.
pub struct SessionCallbacks {
    pub events: mpsc::UnboundedSender<StreamEvent>,
    pub permission: Arc<dyn PermissionHandler>,
}

/// Shared `Client` implementation for one `ProcessHandle`.
#[derive(Clone)]
pub struct AcpClient {
    registry: Arc<RwLock<HashMap<String, SessionCallbacks>>>,
}

impl AcpClient {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register callbacks for a freshly bound session id.
    pub async fn register(&self, session_id: String, callbacks: SessionCallbacks) {
        self.registry.write().await.insert(session_id, callbacks);
    }

    /// Unregister a session id, e.g. when its `SessionRecord` is cleared.
    pub async fn unregister(&self, session_id: &str) {
        self.registry.write().await.remove(session_id);
    }
}

impl Default for AcpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Client for AcpClient {
    async fn request_permission(
        &self,
        args: RequestPermissionRequest,
    ) -> AcpWireResult<RequestPermissionResponse> {
        let session_id = args.session_id.to_string();
        tracing::debug!(session_id = %session_id, "requestPermission received");

        let handler = {
            let registry = self.registry.read().await;
            registry.get(&session_id).map(|cb| cb.permission.clone())
        };

        let Some(handler) = handler else {
            tracing::warn!(session_id = %session_id, "requestPermission for unknown session");
            return Ok(RequestPermissionResponse::new(RequestPermissionOutcome::Cancelled));
        };

        let request = PermissionRequest {
            tool_call_id: args.tool_call.id.to_string(),
            title: args.tool_call.fields.title.clone(),
            options: args
                .options
                .iter()
                .map(|o| PermissionOption {
                    option_id: o.option_id.to_string(),
                    kind: map_permission_kind(o.kind),
                    label: Some(o.name.clone()),
                })
                .collect(),
        };

        // Surface the pending decision to the event stream before blocking
        // on the human's answer (§4.5 step 3).
        if let Some(cb) = self.registry.read().await.get(&session_id) {
            let _ = cb.events.send(StreamEvent::Reasoning {
                reasoning_content: describe_permission_request(&request),
            });
        }

        let outcome = match handler.handle(request).await {
            PermissionOutcome::Selected { option_id } => {
                RequestPermissionOutcome::Selected(SelectedPermissionOutcome::new(option_id))
            }
            PermissionOutcome::Cancelled => RequestPermissionOutcome::Cancelled,
        };

        Ok(RequestPermissionResponse::new(outcome))
    }

    async fn write_text_file(&self, args: WriteTextFileRequest) -> AcpWireResult<WriteTextFileResponse> {
        if let Some(parent) = args.path.parent() {
            if tokio::fs::create_dir_all(parent).await.is_err() {
                return Err(AcpWireError::internal_error());
            }
        }
        tokio::fs::write(&args.path, &args.content)
            .await
            .map_err(|_| AcpWireError::internal_error())?;
        Ok(WriteTextFileResponse::new())
    }

    async fn read_text_file(&self, args: ReadTextFileRequest) -> AcpWireResult<ReadTextFileResponse> {
        let content = tokio::fs::read_to_string(&args.path)
            .await
            .map_err(|_| AcpWireError::internal_error())?;
        Ok(ReadTextFileResponse::new(content))
    }

    async fn session_notification(&self, args: SessionNotification) -> AcpWireResult<()> {
        let session_id = args.session_id.to_string();
        let events = {
            let registry = self.registry.read().await;
            registry.get(&session_id).map(|cb| cb.events.clone())
        };

        let Some(sender) = events else {
            tracing::debug!(session_id = %session_id, "sessionUpdate for unknown session, dropping");
            return Ok(());
        };

        for event in ContentMapper::map(&args) {
            let _ = sender.send(event);
        }

        Ok(())
    }

    async fn create_terminal(&self, _args: CreateTerminalRequest) -> AcpWireResult<CreateTerminalResponse> {
        Err(AcpWireError::method_not_found())
    }

    async fn terminal_output(&self, _args: TerminalOutputRequest) -> AcpWireResult<TerminalOutputResponse> {
        Err(AcpWireError::method_not_found())
    }

    async fn kill_terminal_command(
        &self,
        _args: KillTerminalCommandRequest,
    ) -> AcpWireResult<KillTerminalCommandResponse> {
        Err(AcpWireError::method_not_found())
    }

    async fn release_terminal(&self, _args: ReleaseTerminalRequest) -> AcpWireResult<ReleaseTerminalResponse> {
        Err(AcpWireError::method_not_found())
    }

    async fn wait_for_terminal_exit(
        &self,
        _args: WaitForTerminalExitRequest,
    ) -> AcpWireResult<WaitForTerminalExitResponse> {
        Err(AcpWireError::method_not_found())
    }

    async fn ext_method(&self, _args: ExtRequest) -> AcpWireResult<ExtResponse> {
        Err(AcpWireError::method_not_found())
    }

    async fn ext_notification(&self, _args: ExtNotification) -> AcpWireResult<()> {
        Ok(())
    }
}

fn map_permission_kind(kind: agent_client_protocol::PermissionOptionKind) -> PermissionOptionKind {
    use agent_client_protocol::PermissionOptionKind as Wire;
    match kind {
        Wire::AllowOnce => PermissionOptionKind::AllowOnce,
        Wire::AllowAlways => PermissionOptionKind::AllowAlways,
        Wire::RejectOnce => PermissionOptionKind::RejectOnce,
        Wire::RejectAlways => PermissionOptionKind::RejectAlways,
    }
}

fn describe_permission_request(request: &PermissionRequest) -> String {
    let title = request.title.as_deref().unwrap_or("tool call");
    format!(
        "agent requests permission for {title} (tool_call_id={})",
        request.tool_call_id
    )
}

