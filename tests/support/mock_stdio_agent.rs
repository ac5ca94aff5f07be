//! Mock stdio-based ACP agent for integration testing.
//!
//! Reads JSON-RPC frames from stdin on a background thread (so a prompt
//! handler can poll for an interleaved `cancel` notification without
//! blocking), and writes `session/update` notifications plus a
//! `session/request_permission` round trip to stdout, simulating the wire
//! behavior the integration scenarios exercise.

use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

use agent_client_protocol::{InitializeResponse, NewSessionResponse, PromptResponse};

/// Which scripted behavior the agent plays out on `session/prompt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// A handful of `agent_message_chunk` notifications, then `end_turn`.
    TextStream,
    /// Five "tick" chunks at 100ms intervals; honors an interleaved cancel.
    TickStream,
    /// Sends `session/request_permission` before responding.
    Permission,
    /// Exits the process mid-stream without completing the prompt.
    Crash,
}

#[derive(Debug, Clone)]
pub struct MockStdioAgentConfig {
    pub scenario: Scenario,
    pub protocol_version: u16,
}

impl Default for MockStdioAgentConfig {
    fn default() -> Self {
        Self {
            scenario: Scenario::TextStream,
            protocol_version: 1,
        }
    }
}

pub struct MockStdioAgent {
    config: MockStdioAgentConfig,
    session_id: Option<String>,
    incoming: Receiver<Value>,
}

impl MockStdioAgent {
    pub fn new(config: MockStdioAgentConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if let Ok(value) = serde_json::from_str::<Value>(&line) {
                    if tx.send(value).is_err() {
                        break;
                    }
                }
            }
        });
        Self {
            config,
            session_id: None,
            incoming: rx,
        }
    }

    pub fn run(&mut self) -> io::Result<()> {
        let mut stdout = io::stdout();
        loop {
            let request = match self.incoming.recv() {
                Ok(v) => v,
                Err(_) => break,
            };
            let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
            if method == "cancel" {
                // Outside an active prompt, a bare cancel has nothing to do.
                continue;
            }
            let response = self.handle_request(&request, &mut stdout)?;
            if let Some(response) = response {
                write_line(&mut stdout, &response)?;
            }
        }
        Ok(())
    }

    fn handle_request(&mut self, request: &Value, stdout: &mut impl Write) -> io::Result<Option<Value>> {
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("unknown");
        Ok(match method {
            "initialize" => Some(self.handle_initialize(request)),
            "session/new" => Some(self.handle_new_session(request)),
            "session/prompt" => Some(self.handle_prompt(request, stdout)?),
            _ => Some(self.error_response(request, -32601, "Method not found")),
        })
    }

    fn handle_initialize(&self, request: &Value) -> Value {
        let response: InitializeResponse = serde_json::from_value(json!({
            "protocolVersion": self.config.protocol_version,
            "agentCapabilities": {},
            "authMethods": [],
            "agentInfo": {"name": "mock-acp-agent", "version": "1.0.0", "title": null, "_meta": null},
            "_meta": null
        }))
        .expect("well-formed InitializeResponse fixture");

        json!({"jsonrpc": "2.0", "id": request.get("id"), "result": response})
    }

    fn handle_new_session(&mut self, request: &Value) -> Value {
        let session_id = format!("mock-session-{}", uuid::Uuid::new_v4());
        self.session_id = Some(session_id.clone());

        let response: NewSessionResponse = serde_json::from_value(json!({
            "sessionId": session_id,
            "modes": null,
            "_meta": null
        }))
        .expect("well-formed NewSessionResponse fixture");

        json!({"jsonrpc": "2.0", "id": request.get("id"), "result": response})
    }

    fn handle_prompt(&mut self, request: &Value, stdout: &mut impl Write) -> io::Result<Value> {
        let session_id = self.session_id.clone().unwrap_or_default();

        match self.config.scenario {
            Scenario::TextStream => {
                for chunk in ["Hello", ", world", "!"] {
                    self.send_update(stdout, &session_id, chunk)?;
                }
            }
            Scenario::TickStream => {
                for i in 0..5 {
                    if self.cancel_pending() {
                        return Ok(self.prompt_response(request, "cancelled"));
                    }
                    self.send_update(stdout, &session_id, &format!("tick-{i}"))?;
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
            Scenario::Permission => {
                self.send_permission_request(stdout, &session_id)?;
            }
            Scenario::Crash => {
                self.send_update(stdout, &session_id, "about to crash")?;
                // Simulate the child dying mid-stream: exit without ever
                // writing the final `session/prompt` response.
                stdout.flush()?;
                std::process::exit(1);
            }
        }

        Ok(self.prompt_response(request, "end_turn"))
    }

    fn cancel_pending(&self) -> bool {
        match self.incoming.try_recv() {
            Ok(value) => value.get("method").and_then(|m| m.as_str()) == Some("cancel"),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
        }
    }

    fn send_update(&self, stdout: &mut impl Write, session_id: &str, text: &str) -> io::Result<()> {
        write_line(
            stdout,
            &json!({
                "jsonrpc": "2.0",
                "method": "session/update",
                "params": {
                    "sessionId": session_id,
                    "update": {
                        "sessionUpdate": "agent_message_chunk",
                        "content": {"type": "text", "text": text}
                    }
                }
            }),
        )
    }

    fn send_permission_request(&mut self, stdout: &mut impl Write, session_id: &str) -> io::Result<()> {
        let request_id = 9000;
        write_line(
            stdout,
            &json!({
                "jsonrpc": "2.0",
                "id": request_id,
                "method": "session/request_permission",
                "params": {
                    "sessionId": session_id,
                    "toolCall": {"toolCallId": "tool-1", "title": "run a command", "status": "pending"},
                    "options": [
                        {"optionId": "allow", "name": "Allow", "kind": "allow_once"},
                        {"optionId": "deny", "name": "Deny", "kind": "reject_once"}
                    ]
                }
            }),
        )?;

        // Block until the matching reply arrives; other traffic in between
        // (there shouldn't be any in these scenarios) is dropped.
        loop {
            let Ok(reply) = self.incoming.recv() else { break };
            if reply.get("id").and_then(|i| i.as_i64()) == Some(request_id) {
                break;
            }
        }
        Ok(())
    }

    fn prompt_response(&self, request: &Value, stop_reason: &str) -> Value {
        let response: PromptResponse = serde_json::from_value(json!({
            "stopReason": stop_reason,
            "_meta": null
        }))
        .expect("well-formed PromptResponse fixture");

        json!({"jsonrpc": "2.0", "id": request.get("id"), "result": response})
    }

    fn error_response(&self, request: &Value, code: i32, message: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": request.get("id"),
            "error": {"code": code, "message": message}
        })
    }
}

fn write_line(stdout: &mut impl Write, value: &Value) -> io::Result<()> {
    writeln!(stdout, "{}", serde_json::to_string(value)?)?;
    stdout.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_text_stream() {
        let config = MockStdioAgentConfig::default();
        assert_eq!(config.scenario, Scenario::TextStream);
        assert_eq!(config.protocol_version, 1);
    }

    #[test]
    fn handle_initialize_returns_well_formed_response() {
        let config = MockStdioAgentConfig::default();
        let mut agent = MockStdioAgent::new(config);
        let mut sink = Vec::new();

        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});
        let response = agent.handle_request(&request, &mut sink).unwrap().unwrap();

        assert_eq!(response["id"], 1);
        assert!(response["result"]["agentInfo"]["name"].is_string());
    }

    #[test]
    fn handle_new_session_assigns_a_session_id() {
        let config = MockStdioAgentConfig::default();
        let mut agent = MockStdioAgent::new(config);
        let mut sink = Vec::new();

        let request = json!({"jsonrpc": "2.0", "id": 2, "method": "session/new", "params": {"cwd": "/tmp"}});
        let response = agent.handle_request(&request, &mut sink).unwrap().unwrap();

        assert!(response["result"]["sessionId"].as_str().unwrap().starts_with("mock-session-"));
        assert!(agent.session_id.is_some());
    }

    #[test]
    fn unknown_method_is_a_json_rpc_error() {
        let config = MockStdioAgentConfig::default();
        let mut agent = MockStdioAgent::new(config);
        let mut sink = Vec::new();

        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "unknown/method", "params": {}});
        let response = agent.handle_request(&request, &mut sink).unwrap().unwrap();
        assert_eq!(response["error"]["code"], -32601);
    }
}
