//! Shared data model: agent definitions, health, stream events, and the
//! minimal internal chat-message vocabulary the formatter accepts.

use std::collections::HashMap;
use std::path::PathBuf;

/// An agent an external config store has registered with the core.
///
/// Immutable per lifetime of a `ProcessManager` entry; changing any field
/// for an already-spawned agent requires releasing the old process first
/// (see `Provider::refresh_agents`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Some agents require a specific `initialize.protocolVersion` to behave
    /// (observed first with opencode); `None` uses the crate's default.
    pub protocol_hint: Option<u16>,
}

/// Health of a `ProcessHandle`. Transitions are owned exclusively by
/// `ProcessManager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Starting,
    Ready,
    Dead,
}

/// Durable `(conversationId, agentId) -> {sessionId?, workdir?}` record.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PersistedSessionData {
    pub conversation_id: String,
    pub agent_id: String,
    pub session_id: Option<String>,
    pub workdir: Option<String>,
}

/// The mapped reason a stream terminated, independent of ACP's own
/// `StopReason` wire enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStopReason {
    Complete,
    Error,
    MaxTokens,
    StopSequence,
    ToolUse,
}

/// The core's internal tagged-union event, delivered to the chat engine
/// consumer. `#[non_exhaustive]` because non-ACP providers (image/video
/// generation, RAG) add variants this crate never constructs itself.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Text {
        content: String,
    },
    Reasoning {
        reasoning_content: String,
    },
    ToolCallStart {
        tool_call_id: String,
        tool_call_name: String,
    },
    ToolCallChunk {
        tool_call_id: String,
        arguments_chunk: String,
    },
    ToolCallEnd {
        tool_call_id: String,
    },
    ImageData {
        data: String,
        mime_type: String,
    },
    VideoData {
        data: String,
        mime_type: String,
    },
    Error {
        error_message: String,
    },
    Stop {
        stop_reason: StreamStopReason,
    },
    RagFiles {
        files: Vec<String>,
    },
    RagReferences {
        references: Vec<String>,
    },
}

/// A human decision requested by the agent before a sensitive tool call
/// proceeds.
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    pub tool_call_id: String,
    pub title: Option<String>,
    pub options: Vec<PermissionOption>,
}

#[derive(Debug, Clone)]
pub struct PermissionOption {
    pub option_id: String,
    pub kind: PermissionOptionKind,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOptionKind {
    AllowOnce,
    AllowAlways,
    RejectOnce,
    RejectAlways,
}

/// The human's answer to a `PermissionRequest`.
#[derive(Debug, Clone)]
pub enum PermissionOutcome {
    Selected { option_id: String },
    Cancelled,
}

/// One turn of the internal chat-message history fed to `MessageFormatter`.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<ChatContentPart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single piece of a (possibly multi-part) chat message.
#[derive(Debug, Clone)]
pub enum ChatContentPart {
    Text(String),
    Image { data: String, mime_type: String },
    Audio { data: String, mime_type: String },
    ResourceLink { uri: String },
    /// A prior assistant tool call, represented as a text summary when the
    /// agent is not expected to replay it.
    ToolCallSummary { name: String, summary: String },
}
