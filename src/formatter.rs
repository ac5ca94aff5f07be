//! MessageFormatter: pure, deterministic translation from the internal
//! chat-message history into ACP `ContentBlock`s suitable for a `prompt`
//! request. No I/O, no side effects.

use agent_client_protocol::ContentBlock;

use crate::types::{ChatContentPart, ChatMessage, ChatRole};

pub struct MessageFormatter;

impl MessageFormatter {
    /// Converts a message history into the flat `ContentBlock` sequence a
    /// `prompt` request carries. Turn ordering is preserved. An empty user
    /// text part becomes an empty text block rather than being elided, so
    /// the agent never receives an ambiguous (zero-block) prompt.
    pub fn format(messages: &[ChatMessage]) -> Vec<ContentBlock> {
        let mut blocks = Vec::new();
        for message in messages {
            for part in &message.content {
                blocks.push(format_part(message.role, part));
            }
        }
        if blocks.is_empty() {
            blocks.push(ContentBlock::from(String::new()));
        }
        blocks
    }
}

fn format_part(role: ChatRole, part: &ChatContentPart) -> ContentBlock {
    match part {
        ChatContentPart::Text(text) => ContentBlock::from(text.clone()),
        ChatContentPart::Image { data, mime_type } => {
            content_block_from_json(serde_json::json!({
                "type": "image",
                "data": data,
                "mimeType": mime_type,
            }))
        }
        ChatContentPart::Audio { data, mime_type } => {
            content_block_from_json(serde_json::json!({
                "type": "audio",
                "data": data,
                "mimeType": mime_type,
            }))
        }
        ChatContentPart::ResourceLink { uri } => content_block_from_json(serde_json::json!({
            "type": "resource_link",
            "uri": uri,
        })),
        ChatContentPart::ToolCallSummary { name, summary } => {
            // Prior assistant tool calls the agent is not expected to replay
            // are represented as plain text summaries, tagged by role so
            // the agent can tell it's reading its own history back.
            let _ = role;
            ContentBlock::from(format!("[tool call: {name}] {summary}"))
        }
    }
}

fn content_block_from_json(value: serde_json::Value) -> ContentBlock {
    serde_json::from_value(value).expect("well-formed content block literal")
}
