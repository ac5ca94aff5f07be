//! # deepchat-acp
//!
//! Agent Client Protocol provider core for DeepChat: spawns and supervises
//! ACP agent subprocesses, binds logical sessions to conversations and
//! working directories, translates between DeepChat's chat message format
//! and ACP's typed content/tool-call notifications, mediates interactive
//! permission requests, and surfaces the result as a single cancellable
//! stream of typed events. The chat engine that consumes this stream, UI,
//! and persisted configuration storage live elsewhere in DeepChat.

pub mod agent_client;
pub mod config;
pub mod content;
pub mod formatter;
pub mod persistence;
pub mod process;
pub mod provider;
pub mod queue;
pub mod session_manager;
pub mod tracing_util;
pub mod types;

mod error;
pub use error::{AcpError, Result};

pub use agent_client::{AcpClient, AlwaysCancel, PermissionHandler, SessionCallbacks};
pub use config::ProviderConfig;
pub use content::ContentMapper;
pub use formatter::MessageFormatter;
pub use persistence::SessionPersistence;
pub use process::{ProcessHandle, ProcessManager};
pub use provider::{PromptRequest, Provider};
pub use queue::{channel, EventReceiver, EventSender};
pub use session_manager::{SessionCallbackSet, SessionManager, SessionRecord};
pub use tracing_util::{LogCapture, TraceContext};
pub use types::{
    AgentDefinition, ChatContentPart, ChatMessage, ChatRole, Health, PermissionOption,
    PermissionOptionKind, PermissionOutcome, PermissionRequest, PersistedSessionData, StreamEvent,
    StreamStopReason,
};

#[cfg(any(test, feature = "test-utils"))]
pub use tracing_util::test_subscriber::{create_test_subscriber, init_test_subscriber};
#[cfg(any(test, feature = "test-utils"))]
pub use tracing_util::CapturedLog;
