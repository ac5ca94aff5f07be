//! ContentMapper: pure, synchronous translation from one ACP `sessionUpdate`
//! notification into zero or more internal `StreamEvent`s. No I/O, never
//! panics on an unrecognized variant (forward compatibility is part of the
//! contract, not an afterthought).

use agent_client_protocol::{ContentBlock, SessionNotification, SessionUpdate, StopReason, ToolCallContent};

use crate::types::{StreamEvent, StreamStopReason};

pub struct ContentMapper;

impl ContentMapper {
    /// Maps one notification to the events it produces, per the table in
    /// the component design. `user_message_chunk` (echoes of the client's
    /// own input) and unrecognized kinds produce no events.
    pub fn map(notification: &SessionNotification) -> Vec<StreamEvent> {
        match &notification.update {
            SessionUpdate::AgentMessageChunk(chunk) => vec![map_content_block(&chunk.content)],
            SessionUpdate::AgentThoughtChunk(chunk) => vec![StreamEvent::Reasoning {
                reasoning_content: text_of(&chunk.content),
            }],
            SessionUpdate::ToolCall(tool_call) => {
                let mut events = vec![StreamEvent::Reasoning {
                    reasoning_content: format!(
                        "tool call: {} ({:?})",
                        tool_call.title, tool_call.status
                    ),
                }];
                events.extend(render_tool_content(tool_call.content.iter()));
                events
            }
            SessionUpdate::ToolCallUpdate(update) => {
                let mut events = Vec::new();
                if let Some(title) = &update.fields.title {
                    events.push(StreamEvent::Reasoning {
                        reasoning_content: format!(
                            "tool call update: {title} ({:?})",
                            update.fields.status
                        ),
                    });
                }
                if let Some(content) = &update.fields.content {
                    events.extend(render_tool_content(content.iter()));
                }
                events
            }
            SessionUpdate::Plan(plan) => vec![StreamEvent::Reasoning {
                reasoning_content: summarize_plan(plan),
            }],
            SessionUpdate::UserMessageChunk(_) => Vec::new(),
            _ => Vec::new(),
        }
    }

    /// Maps `PromptResponse.stopReason` to the internal reason vocabulary.
    pub fn map_stop_reason(reason: Option<StopReason>) -> StreamStopReason {
        match reason {
            Some(StopReason::EndTurn) => StreamStopReason::Complete,
            Some(StopReason::MaxTokens) => StreamStopReason::MaxTokens,
            Some(StopReason::MaxTurnRequests) => StreamStopReason::StopSequence,
            Some(StopReason::Cancelled) | Some(StopReason::Refusal) => StreamStopReason::Error,
            _ => StreamStopReason::Complete,
        }
    }
}

fn map_content_block(block: &ContentBlock) -> StreamEvent {
    match block {
        ContentBlock::Text(text) => StreamEvent::Text {
            content: text.text.clone(),
        },
        ContentBlock::Image(image) => StreamEvent::ImageData {
            data: image.data.clone(),
            mime_type: image.mime_type.clone(),
        },
        other => StreamEvent::Text {
            content: serde_json::to_string(other).unwrap_or_else(|_| "<unserializable content>".to_string()),
        },
    }
}

fn text_of(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Text(text) => text.text.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "<unserializable content>".to_string()),
    }
}

fn render_tool_content<'a>(items: impl Iterator<Item = &'a ToolCallContent>) -> Vec<StreamEvent> {
    items
        .map(|item| StreamEvent::Text {
            content: render_tool_content_item(item),
        })
        .collect()
}

fn render_tool_content_item(item: &ToolCallContent) -> String {
    match item {
        ToolCallContent::Content { content } => match content {
            ContentBlock::ResourceLink(link) => link.uri.clone(),
            ContentBlock::Text(text) => text.text.clone(),
            other => serde_json::to_string(other).unwrap_or_else(|_| "<unserializable tool content>".to_string()),
        },
        ToolCallContent::Diff { diff } => format!("diff: {}", diff.path.display()),
        ToolCallContent::Terminal { .. } => {
            serde_json::to_value(item)
                .ok()
                .and_then(|v| v.get("output").and_then(|o| o.as_str().map(str::to_string)))
                .unwrap_or_else(|| "<terminal output>".to_string())
        }
        other => serde_json::to_string(other).unwrap_or_else(|_| "<unserializable tool content>".to_string()),
    }
}

fn summarize_plan(plan: &agent_client_protocol::Plan) -> String {
    let entries: Vec<String> = plan
        .entries
        .iter()
        .map(|e| format!("{} [{:?}]", e.content, e.status))
        .collect();
    format!("plan: {}", entries.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_client_protocol::SessionId;
    use serde_json::json;

    fn notification(update: serde_json::Value) -> SessionNotification {
        serde_json::from_value(json!({
            "sessionId": "s1",
            "update": update,
        }))
        .expect("valid SessionNotification fixture")
    }

    #[test]
    fn agent_message_chunk_text_maps_to_text_event() {
        let n = notification(json!({
            "sessionUpdate": "agent_message_chunk",
            "content": {"type": "text", "text": "hello"}
        }));
        let events = ContentMapper::map(&n);
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Text { content } => assert_eq!(content, "hello"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn user_message_chunk_is_suppressed() {
        let n = notification(json!({
            "sessionUpdate": "user_message_chunk",
            "content": {"type": "text", "text": "echo"}
        }));
        assert!(ContentMapper::map(&n).is_empty());
    }

    #[test]
    fn agent_thought_chunk_maps_to_reasoning() {
        let n = notification(json!({
            "sessionUpdate": "agent_thought_chunk",
            "content": {"type": "text", "text": "thinking..."}
        }));
        let events = ContentMapper::map(&n);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Reasoning { .. }));
    }

    #[test]
    fn unknown_update_kind_never_panics() {
        let n = notification(json!({
            "sessionUpdate": "something_from_the_future",
            "whatever": 1
        }));
        assert!(ContentMapper::map(&n).is_empty());
    }

    #[test]
    fn stop_reason_mapping_matches_table() {
        assert!(matches!(
            ContentMapper::map_stop_reason(Some(StopReason::EndTurn)),
            StreamStopReason::Complete
        ));
        assert!(matches!(
            ContentMapper::map_stop_reason(Some(StopReason::MaxTokens)),
            StreamStopReason::MaxTokens
        ));
        assert!(matches!(
            ContentMapper::map_stop_reason(Some(StopReason::Cancelled)),
            StreamStopReason::Error
        ));
        assert!(matches!(ContentMapper::map_stop_reason(None), StreamStopReason::Complete));
    }

    #[test]
    fn session_id_roundtrip_smoke() {
        let id = SessionId::from("s1");
        assert_eq!(id.to_string(), "s1");
    }

    #[test]
    fn tool_call_resource_link_renders_bare_uri() {
        let n = notification(json!({
            "sessionUpdate": "tool_call",
            "toolCallId": "t1",
            "title": "read file",
            "status": "completed",
            "content": [
                {
                    "type": "content",
                    "content": {"type": "resource_link", "uri": "file:///tmp/example.txt"}
                }
            ]
        }));
        let events = ContentMapper::map(&n);
        let uri = events.iter().find_map(|e| match e {
            StreamEvent::Text { content } if content == "file:///tmp/example.txt" => Some(content.clone()),
            _ => None,
        });
        assert_eq!(uri.as_deref(), Some("file:///tmp/example.txt"));
    }
}
