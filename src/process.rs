//! ProcessManager: the pool of live agent subprocesses keyed by agent id.
//!
//! `ClientSideConnection` is built from futures that are not `Send` (the
//! `Client` trait is registered `?Send`), so each process gets its own OS
//! thread running a current-thread runtime and a `LocalSet` — the pattern
//! the teacher leaves for its caller to wire up in `acp_client::spawn_agent`.
//! Everything else talks to that thread through a command channel; the
//! connection itself never crosses a thread boundary.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agent_client_protocol::{
    CancelNotification, ClientCapabilities, ClientSideConnection, InitializeRequest,
    LoadSessionRequest, NewSessionRequest, PromptRequest, SessionId,
};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};
use tracing::Instrument;

use crate::agent_client::AcpClient;
use crate::error::{AcpError, Result};
use crate::tracing_util::TraceContext;
use crate::types::{AgentDefinition, Health};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const RELEASE_GRACE: Duration = Duration::from_secs(2);

/// One in-flight request against a live process's connection.
enum ProcessCommand {
    NewSession {
        cwd: PathBuf,
        reply: oneshot::Sender<Result<String>>,
    },
    LoadSession {
        session_id: String,
        cwd: PathBuf,
        reply: oneshot::Sender<Result<()>>,
    },
    Prompt {
        session_id: String,
        prompt: Vec<agent_client_protocol::ContentBlock>,
        reply: oneshot::Sender<Result<Option<agent_client_protocol::StopReason>>>,
    },
    Cancel {
        session_id: String,
    },
    Register {
        session_id: String,
        callbacks: crate::agent_client::SessionCallbacks,
    },
    Unregister {
        session_id: String,
    },
    Shutdown,
}

/// The client-side handle to one running agent subprocess.
pub struct ProcessHandle {
    agent_id: String,
    commands: mpsc::UnboundedSender<ProcessCommand>,
    health: watch::Receiver<Health>,
    ref_count: Arc<std::sync::atomic::AtomicUsize>,
}

impl ProcessHandle {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn health(&self) -> Health {
        *self.health.borrow()
    }

    pub fn acquire(&self) {
        self.ref_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn release_ref(&self) {
        self.ref_count.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
    }

    pub async fn new_session(&self, cwd: PathBuf) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(ProcessCommand::NewSession { cwd, reply })?;
        rx.await.map_err(|_| AcpError::ProtocolError("process thread gone".into()))?
    }

    pub async fn load_session(&self, session_id: String, cwd: PathBuf) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ProcessCommand::LoadSession { session_id, cwd, reply })?;
        rx.await.map_err(|_| AcpError::ProtocolError("process thread gone".into()))?
    }

    pub async fn prompt(
        &self,
        session_id: String,
        prompt: Vec<agent_client_protocol::ContentBlock>,
    ) -> Result<Option<agent_client_protocol::StopReason>> {
        let (reply, rx) = oneshot::channel();
        self.send(ProcessCommand::Prompt { session_id, prompt, reply })?;
        rx.await.map_err(|_| AcpError::ProtocolError("process thread gone".into()))?
    }

    pub fn cancel(&self, session_id: String) {
        let _ = self.send(ProcessCommand::Cancel { session_id });
    }

    pub async fn register_session(&self, session_id: String, callbacks: crate::agent_client::SessionCallbacks) {
        let _ = self.send(ProcessCommand::Register { session_id, callbacks });
    }

    pub async fn unregister_session(&self, session_id: String) {
        let _ = self.send(ProcessCommand::Unregister { session_id });
    }

    fn send(&self, cmd: ProcessCommand) -> Result<()> {
        self.commands
            .send(cmd)
            .map_err(|_| AcpError::ProtocolError("process thread gone".into()))
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(ProcessCommand::Shutdown);
    }
}

struct Slot {
    handle: Arc<ProcessHandle>,
}

/// Owns the pool of live agent subprocesses; spawns lazily, serializes spawn
/// attempts per agent id, and tears processes down on `release`.
pub struct ProcessManager {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a ready handle for `agent`, spawning it on demand. Serialized
    /// per agent id so concurrent callers for the same agent share one spawn
    /// attempt and one resulting handle (property 4).
    pub async fn get_connection(&self, agent: &AgentDefinition) -> Result<Arc<ProcessHandle>> {
        let mut slots = self.slots.lock().await;

        if let Some(slot) = slots.get(&agent.id) {
            if slot.handle.health() != Health::Dead {
                slot.handle.acquire();
                return Ok(slot.handle.clone());
            }
            slots.remove(&agent.id);
        }

        let handle = Arc::new(spawn_process(agent).await?);
        handle.acquire();
        slots.insert(agent.id.clone(), Slot { handle: handle.clone() });
        Ok(handle)
    }

    pub fn get_health(&self, handle: &ProcessHandle) -> Health {
        handle.health()
    }

    /// Tears down the agent's process, if any. The next `get_connection`
    /// spawns a fresh child (release invariant, §8 property 7).
    pub async fn release(&self, agent_id: &str) {
        let mut slots = self.slots.lock().await;
        slots.remove(agent_id);
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn spawn_process(agent: &AgentDefinition) -> Result<ProcessHandle> {
    let mut command = Command::new(&agent.command);
    command.args(&agent.args);
    command.envs(&agent.env);
    command.stdin(std::process::Stdio::piped());
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::inherit());

    let mut child = command
        .spawn()
        .map_err(|e| AcpError::SpawnFailed(format!("{}: {}", agent.command.display(), e)))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AcpError::SpawnFailed("failed to capture agent stdin".into()))?
        .compat_write();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AcpError::SpawnFailed("failed to capture agent stdout".into()))?
        .compat();

    let (commands_tx, commands_rx) = mpsc::unbounded_channel::<ProcessCommand>();
    let (health_tx, health_rx) = watch::channel(Health::Starting);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

    let protocol_hint = agent.protocol_hint;
    let agent_id = agent.id.clone();
    let trace = TraceContext::with_session_id(agent_id.clone());

    std::thread::Builder::new()
        .name(format!("acp-process-{}", agent_id))
        .spawn(move || run_process_thread(child, stdin, stdout, commands_rx, health_tx, ready_tx, protocol_hint, trace))
        .map_err(|e| AcpError::SpawnFailed(format!("failed to start process thread: {e}")))?;

    match tokio::time::timeout(HANDSHAKE_TIMEOUT, ready_rx).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => return Err(e),
        Ok(Err(_)) => return Err(AcpError::HandshakeFailed("process thread dropped before ready".into())),
        Err(_) => return Err(AcpError::HandshakeFailed("initialize did not complete in time".into())),
    }

    Ok(ProcessHandle {
        agent_id: agent.id.clone(),
        commands: commands_tx,
        health: health_rx,
        ref_count: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
    })
}

/// Runs on its own OS thread. Owns the child process and its
/// `ClientSideConnection` for their whole lifetime.
fn run_process_thread(
    mut child: tokio::process::Child,
    stdin: impl futures::io::AsyncWrite + Unpin + 'static,
    stdout: impl futures::io::AsyncRead + Unpin + 'static,
    mut commands: mpsc::UnboundedReceiver<ProcessCommand>,
    health: watch::Sender<Health>,
    ready: oneshot::Sender<Result<()>>,
    protocol_hint: Option<u16>,
    trace: TraceContext,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready.send(Err(AcpError::SpawnFailed(format!("failed to start runtime: {e}"))));
            return;
        }
    };

    let session_span = trace.session_span();
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, async move {
        let acp_client = AcpClient::new();
        let (connection, io_task) = ClientSideConnection::new(acp_client.clone(), stdin, stdout, |fut| {
            tokio::task::spawn_local(fut);
        });

        // `closed` flips once the I/O loop ends (agent exited, stdio closed,
        // or an unrecoverable protocol error) so an in-flight request racing
        // against it fails promptly instead of hanging on a dead pipe.
        let (closed_tx, closed_rx) = watch::channel(false);
        tokio::task::spawn_local(async move {
            let _ = io_task.await;
            let _ = closed_tx.send(true);
        });

        let protocol_version = protocol_hint.unwrap_or(1u16).into();
        let init_request = InitializeRequest::new(protocol_version)
            .client_capabilities(ClientCapabilities::default());

        tracing::debug!(agent_id = %trace.session_id(), "sending initialize handshake");
        let handshake = race_with_closed(connection.initialize(init_request), &closed_rx)
            .instrument(trace.request_span("initialize"))
            .await;
        if let Err(e) = handshake {
            tracing::warn!(agent_id = %trace.session_id(), error = %e, "handshake failed");
            let _ = health.send(Health::Dead);
            let _ = ready.send(Err(AcpError::HandshakeFailed(e.to_string())));
            let _ = child.start_kill();
            return;
        }
        tracing::info!(agent_id = %trace.session_id(), "agent process ready");
        let _ = health.send(Health::Ready);
        let _ = ready.send(Ok(()));

        while let Some(cmd) = commands.recv().await {
            if *closed_rx.borrow() {
                tracing::warn!(agent_id = %trace.session_id(), "agent process closed; failing pending command");
                let _ = health.send(Health::Dead);
                fail_pending(cmd);
                break;
            }
            match cmd {
                ProcessCommand::NewSession { cwd, reply } => {
                    let req = trace.new_request();
                    let result =
                        race_with_closed(connection.new_session(NewSessionRequest::new(cwd)), &closed_rx)
                            .instrument(req.request_span("session/new"))
                            .await
                            .map(|resp| resp.session_id.to_string())
                            .map_err(|e| AcpError::SessionCreationFailed(e.to_string()));
                    if let Err(ref e) = result {
                        tracing::warn!(agent_id = %trace.session_id(), error = %e, "session/new failed");
                    }
                    let _ = reply.send(result);
                }
                ProcessCommand::LoadSession { session_id, cwd, reply } => {
                    let req = trace.new_request();
                    let result = race_with_closed(
                        connection.load_session(LoadSessionRequest::new(SessionId::from(session_id), cwd)),
                        &closed_rx,
                    )
                    .instrument(req.request_span("session/load"))
                    .await
                    .map(|_| ())
                    .map_err(|e| AcpError::SessionCreationFailed(e.to_string()));
                    if let Err(ref e) = result {
                        tracing::warn!(agent_id = %trace.session_id(), error = %e, "session/load failed");
                    }
                    let _ = reply.send(result);
                }
                ProcessCommand::Prompt { session_id, prompt, reply } => {
                    let req = trace.new_request();
                    let result = race_with_closed(
                        connection.prompt(PromptRequest::new(SessionId::from(session_id), prompt)),
                        &closed_rx,
                    )
                    .instrument(req.request_span("session/prompt"))
                    .await
                    .map(|resp| resp.stop_reason)
                    .map_err(|e| AcpError::PromptFailed(e.to_string()));
                    if let Err(ref e) = result {
                        tracing::warn!(agent_id = %trace.session_id(), error = %e, "session/prompt failed");
                    }
                    let _ = reply.send(result);
                }
                ProcessCommand::Cancel { session_id } => {
                    tracing::debug!(agent_id = %trace.session_id(), session_id = %session_id, "cancel");
                    let _ = connection.cancel(CancelNotification::new(SessionId::from(session_id))).await;
                }
                ProcessCommand::Register { session_id, callbacks } => {
                    acp_client.register(session_id, callbacks).await;
                }
                ProcessCommand::Unregister { session_id } => {
                    acp_client.unregister(&session_id).await;
                }
                ProcessCommand::Shutdown => break,
            }
        }

        tracing::info!(agent_id = %trace.session_id(), "process thread shutting down");
        let _ = health.send(Health::Dead);
        let _ = tokio::time::timeout(RELEASE_GRACE, child.wait()).await;
        let _ = child.start_kill();
    }
    .instrument(session_span));
}

/// Races a connection call against the I/O loop closing, so a broken pipe
/// fails the in-flight request instead of hanging on it forever.
async fn race_with_closed<F, T>(fut: F, closed: &watch::Receiver<bool>) -> std::result::Result<T, agent_client_protocol::Error>
where
    F: std::future::Future<Output = std::result::Result<T, agent_client_protocol::Error>>,
{
    let mut closed = closed.clone();
    if *closed.borrow() {
        return Err(agent_client_protocol::Error::internal_error());
    }
    tokio::select! {
        result = fut => result,
        _ = closed.changed() => Err(agent_client_protocol::Error::internal_error()),
    }
}

/// Resolves a command's reply channel with a connection-closed error when
/// the agent process has already died before the command could run.
fn fail_pending(cmd: ProcessCommand) {
    match cmd {
        ProcessCommand::NewSession { reply, .. } => {
            let _ = reply.send(Err(AcpError::SessionCreationFailed("agent process exited".into())));
        }
        ProcessCommand::LoadSession { reply, .. } => {
            let _ = reply.send(Err(AcpError::SessionCreationFailed("agent process exited".into())));
        }
        ProcessCommand::Prompt { reply, .. } => {
            let _ = reply.send(Err(AcpError::PromptFailed("agent process exited".into())));
        }
        ProcessCommand::Cancel { .. }
        | ProcessCommand::Register { .. }
        | ProcessCommand::Unregister { .. }
        | ProcessCommand::Shutdown => {}
    }
}
