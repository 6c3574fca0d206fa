//! Message types for Claude Code CLI stream-json output
//!
//! Every JSON object the CLI writes to stdout is classified into a [`Message`].
//! Both families are closed sum types, so every consumer matches exhaustively.
//!
//! # Message Types
//!
//! - [`Message::User`] - User input, tool results echoed back, and diagnostics
//! - [`Message::Assistant`] - Assistant responses with ordered content blocks
//! - [`Message::System`] - System events with an open metadata map
//! - [`Message::Result`] - Final result with timing, turns and cost
//!
//! # Content Blocks
//!
//! Assistant messages contain [`ContentBlock`] items:
//! - [`ContentBlock::Text`] - Plain text content
//! - [`ContentBlock::ToolUse`] - Tool invocation requests
//! - [`ContentBlock::ToolResult`] - Tool execution results
//!
//! # Serialization
//!
//! `Serialize` writes the wire shape with a `type` tag. `Deserialize` goes through
//! [`parse_message`](crate::parser::parse_message), so the lenient wire rules
//! (nested or top-level content, float durations) apply there as well.
//!
//! # Example
//!
//! ```
//! use claw_stream::messages::{ContentBlock, Message};
//!
//! let json = r#"{"type": "assistant", "message": {"content": [{"type": "text", "text": "Hello!"}]}}"#;
//! let msg: Message = serde_json::from_str(json).unwrap();
//! match msg {
//!     Message::Assistant(assistant) => {
//!         assert!(matches!(&assistant.content[0], ContentBlock::Text { text } if text == "Hello!"));
//!     }
//!     _ => panic!("Expected assistant message"),
//! }
//! ```

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::parser;

/// Discriminant of a [`Message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `"user"`
    User,
    /// `"assistant"`
    Assistant,
    /// `"system"`
    System,
    /// `"result"`
    Result,
}

impl MessageType {
    /// Wire name of the discriminant
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::Assistant => "assistant",
            MessageType::System => "system",
            MessageType::Result => "result",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level message type discriminated by the `type` field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// User input, echoed tool results, or a synthesized diagnostic
    User(UserMessage),
    /// Assistant response with content blocks
    Assistant(AssistantMessage),
    /// System event with metadata
    System(SystemMessage),
    /// Final result of the query
    Result(ResultMessage),
}

impl Message {
    /// Create a user message carrying `content`
    ///
    /// The transport uses this to report in-band failures without ending the stream.
    pub fn user(content: impl Into<String>) -> Self {
        Message::User(UserMessage::new(content))
    }

    /// The discriminant matching this variant
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::User(_) => MessageType::User,
            Message::Assistant(_) => MessageType::Assistant,
            Message::System(_) => MessageType::System,
            Message::Result(_) => MessageType::Result,
        }
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        parser::parse_message(&value).map_err(serde::de::Error::custom)
    }
}

/// User message with a single text payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMessage {
    /// The text payload
    pub content: String,
}

impl UserMessage {
    /// Create a user message
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Assistant message containing ordered content blocks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantMessage {
    /// Content blocks in the order the CLI emitted them
    pub content: Vec<ContentBlock>,
}

impl AssistantMessage {
    /// Create an assistant message
    pub fn new(content: Vec<ContentBlock>) -> Self {
        Self { content }
    }

    /// Concatenation of all text blocks, in order
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => None,
            })
            .collect()
    }
}

/// System message: a subtype tag plus the complete object it was parsed from
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMessage {
    /// Kind of system event (e.g. `"init"`)
    pub subtype: String,
    /// The entire input object, including `type` and `subtype`
    pub data: Map<String, Value>,
}

impl SystemMessage {
    /// Create a system message
    pub fn new(subtype: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            subtype: subtype.into(),
            data,
        }
    }

    /// Look up a metadata field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

// Written flat so the output parses back into an equal `data` map.
impl Serialize for SystemMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("subtype", &self.subtype)?;
        for (key, value) in &self.data {
            if key == "type" || key == "subtype" {
                continue;
            }
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Final result message with conversation metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultMessage {
    /// Kind of result (e.g. `"success"`, `"error_max_turns"`)
    pub subtype: String,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Time spent in API calls in milliseconds
    pub duration_api_ms: u64,
    /// Whether the conversation ended with an error
    pub is_error: bool,
    /// Number of conversation turns
    pub num_turns: u64,
    /// Session identifier, usable with `--resume`
    pub session_id: String,
    /// Total cost in USD, if reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    /// Token usage map, if reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Map<String, Value>>,
    /// Final result text, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Content block variants discriminated by the `type` field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text content
    Text {
        /// The text content
        text: String,
    },
    /// Tool invocation request
    ToolUse {
        /// Unique identifier for this tool use
        id: String,
        /// Name of the tool to invoke
        name: String,
        /// Tool input parameters
        input: Map<String, Value>,
    },
    /// Tool execution result
    ToolResult {
        /// ID of the tool use this result corresponds to
        tool_use_id: String,
        /// Result payload, any JSON value
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<Value>,
        /// Error flag; `None` when the CLI did not send one
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        parser::parse_content_block(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_type_matches_variant() {
        assert_eq!(Message::user("hi").message_type(), MessageType::User);
        assert_eq!(
            Message::Assistant(AssistantMessage::new(vec![])).message_type(),
            MessageType::Assistant
        );
        assert_eq!(MessageType::Result.to_string(), "result");
        assert_eq!(MessageType::System.as_str(), "system");
    }

    #[test]
    fn test_user_message_serializes_with_tag() {
        let value = serde_json::to_value(Message::user("Hello")).unwrap();
        assert_eq!(value, json!({"type": "user", "content": "Hello"}));
    }

    #[test]
    fn test_assistant_message_serializes_blocks_in_order() {
        let mut input = Map::new();
        input.insert("command".to_string(), json!("ls"));
        let msg = Message::Assistant(AssistantMessage::new(vec![
            ContentBlock::Text {
                text: "Running".to_string(),
            },
            ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "Bash".to_string(),
                input,
            },
        ]));

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "assistant");
        assert_eq!(value["content"][0], json!({"type": "text", "text": "Running"}));
        assert_eq!(value["content"][1]["type"], "tool_use");
        assert_eq!(value["content"][1]["input"]["command"], "ls");
    }

    #[test]
    fn test_tool_result_omits_absent_fields() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "toolu_1".to_string(),
            content: None,
            is_error: None,
        };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value, json!({"type": "tool_result", "tool_use_id": "toolu_1"}));
    }

    #[test]
    fn test_result_message_omits_absent_optionals() {
        let msg = Message::Result(ResultMessage {
            subtype: "success".to_string(),
            duration_ms: 1000,
            duration_api_ms: 800,
            is_error: false,
            num_turns: 2,
            session_id: "abc".to_string(),
            total_cost_usd: None,
            usage: None,
            result: None,
        });
        let value = serde_json::to_value(&msg).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 7);
        assert!(!object.contains_key("total_cost_usd"));
        assert!(!object.contains_key("usage"));
        assert!(!object.contains_key("result"));
    }

    #[test]
    fn test_system_message_round_trip_keeps_metadata() {
        let original = json!({
            "type": "system",
            "subtype": "init",
            "session_id": "sess_1",
            "tools": ["Bash", "Read"]
        });
        let msg: Message = serde_json::from_value(original.clone()).unwrap();
        let serialized = serde_json::to_value(&msg).unwrap();
        assert_eq!(serialized, original);

        let reparsed: Message = serde_json::from_value(serialized).unwrap();
        assert_eq!(reparsed, msg);
    }

    #[test]
    fn test_result_round_trip_with_optionals() {
        let original = json!({
            "type": "result",
            "subtype": "success",
            "duration_ms": 1200,
            "duration_api_ms": 900,
            "is_error": false,
            "num_turns": 3,
            "session_id": "sess_42",
            "total_cost_usd": 0.0125,
            "usage": {"input_tokens": 10, "output_tokens": 20},
            "result": "done"
        });
        let msg: Message = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(serde_json::to_value(&msg).unwrap(), original);
    }

    #[test]
    fn test_assistant_round_trip_mixed_blocks() {
        let original = json!({
            "type": "assistant",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_9", "name": "Read", "input": {"path": "a.txt"}},
                {"type": "tool_result", "tool_use_id": "toolu_9", "content": [{"type": "text", "text": "x"}], "is_error": false}
            ]
        });
        let msg: Message = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(serde_json::to_value(&msg).unwrap(), original);
    }

    #[test]
    fn test_assistant_text_concatenates_text_blocks() {
        let msg = AssistantMessage::new(vec![
            ContentBlock::Text {
                text: "Hello, ".to_string(),
            },
            ContentBlock::ToolResult {
                tool_use_id: "t".to_string(),
                content: None,
                is_error: Some(true),
            },
            ContentBlock::Text {
                text: "world".to_string(),
            },
        ]);
        assert_eq!(msg.text(), "Hello, world");
    }

    #[test]
    fn test_deserialize_reports_parse_failure() {
        let err = serde_json::from_value::<Message>(json!({"type": "bogus"})).unwrap_err();
        assert!(err.to_string().contains("Unknown message type"));
    }

    #[test]
    fn test_content_block_deserialize() {
        let block: ContentBlock =
            serde_json::from_value(json!({"type": "text", "text": "hi"})).unwrap();
        assert_eq!(
            block,
            ContentBlock::Text {
                text: "hi".to_string()
            }
        );
    }

    // === Fixture-Based Tests ===

    fn load_fixture(name: &str) -> Vec<Message> {
        use std::fs::File;
        use std::io::{BufRead, BufReader};

        let fixture_path = format!(
            "{}/tests/fixtures/{}.ndjson",
            env!("CARGO_MANIFEST_DIR"),
            name
        );
        let file = File::open(&fixture_path)
            .unwrap_or_else(|e| panic!("Failed to open fixture '{}': {}", fixture_path, e));

        BufReader::new(file)
            .lines()
            .map(|line| line.unwrap())
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(&line)
                    .unwrap_or_else(|e| panic!("Failed to parse '{}' line: {}\n{}", name, e, line))
            })
            .collect()
    }

    #[test]
    fn test_fixture_simple_query() {
        let messages = load_fixture("simple_query");
        let types: Vec<_> = messages.iter().map(Message::message_type).collect();
        assert_eq!(
            types,
            vec![MessageType::System, MessageType::Assistant, MessageType::Result]
        );

        match &messages[2] {
            Message::Result(result) => {
                assert_eq!(result.session_id, "sess_simple_001");
                assert_eq!(result.num_turns, 1);
                assert_eq!(result.result.as_deref(), Some("4"));
            }
            other => panic!("Expected result, got {other:?}"),
        }
    }

    #[test]
    fn test_fixture_tool_use() {
        let messages = load_fixture("tool_use");
        let tool_use = messages.iter().find_map(|msg| match msg {
            Message::Assistant(assistant) => assistant.content.iter().find_map(|block| match block {
                ContentBlock::ToolUse { name, .. } => Some(name.clone()),
                _ => None,
            }),
            _ => None,
        });
        assert_eq!(tool_use.as_deref(), Some("Bash"));

        let echoed = messages.iter().find_map(|msg| match msg {
            Message::User(user) => Some(user.content.clone()),
            _ => None,
        });
        assert_eq!(echoed.as_deref(), Some("file1.txt\nfile2.txt"));
    }

    #[test]
    fn test_fixture_error_response() {
        let messages = load_fixture("error_response");
        let last = messages.last().expect("fixture is not empty");
        match last {
            Message::Result(result) => {
                assert!(result.is_error);
                assert_eq!(result.subtype, "error_max_turns");
                assert!(result.result.is_none());
            }
            other => panic!("Expected result, got {other:?}"),
        }
    }
}
