//! Protocol parser for stream-json objects
//!
//! Converts one decoded JSON object from the CLI into a typed [`Message`].
//! Dispatch is on the string `type` field. Required fields that are missing or
//! have the wrong shape fail with [`ClawError::MessageParse`]; optional fields
//! with the wrong shape are dropped silently.
//!
//! # Example
//!
//! ```
//! use claw_stream::messages::Message;
//! use claw_stream::parser::parse_message;
//! use serde_json::json;
//!
//! let value = json!({
//!     "type": "result",
//!     "subtype": "success",
//!     "duration_ms": 1000,
//!     "duration_api_ms": 800,
//!     "is_error": false,
//!     "num_turns": 2,
//!     "session_id": "abc"
//! });
//! match parse_message(&value).unwrap() {
//!     Message::Result(result) => assert_eq!(result.num_turns, 2),
//!     _ => unreachable!(),
//! }
//! ```

use serde_json::{Map, Value};

use crate::error::{ClawError, ParseErrorKind};
use crate::messages::{
    AssistantMessage, ContentBlock, Message, ResultMessage, SystemMessage, UserMessage,
};

/// Payload used when a tool-result user message carries no string content
pub const TOOL_RESULT_PLACEHOLDER: &str = "[Tool result message]";

/// Message type the CLI uses for its own control channel
const CONTROL_RESPONSE_TYPE: &str = "control_response";

/// Whether `value` is a CLI-internal `control_response` object
///
/// These carry no deliverable content and are dropped by the transport
/// before parsing.
pub fn is_control_response(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some(CONTROL_RESPONSE_TYPE)
}

/// Parse a decoded JSON object into a [`Message`]
///
/// # Errors
///
/// - [`ParseErrorKind::MissingField`] if `value` is not an object, has no string
///   `type`, or lacks a required payload field
/// - [`ParseErrorKind::UnknownType`] if `type` is not one of
///   `user`, `assistant`, `system`, `result`
/// - [`ParseErrorKind::MalformedBlock`] if an assistant content element is not
///   an object or has an unknown block type
pub fn parse_message(value: &Value) -> Result<Message, ClawError> {
    let Some(data) = value.as_object() else {
        return Err(ClawError::parse(
            ParseErrorKind::MissingField,
            "Invalid message data type (expected object)",
            value,
        ));
    };

    let Some(message_type) = data.get("type").and_then(Value::as_str) else {
        return Err(ClawError::parse(
            ParseErrorKind::MissingField,
            "Message missing 'type' field",
            value,
        ));
    };

    match message_type {
        "user" => parse_user(data, value).map(Message::User),
        "assistant" => parse_assistant(data, value).map(Message::Assistant),
        "system" => parse_system(data, value).map(Message::System),
        "result" => parse_result(data, value).map(Message::Result),
        other => Err(ClawError::parse(
            ParseErrorKind::UnknownType,
            format!("Unknown message type: {other}"),
            value,
        )),
    }
}

fn parse_user(data: &Map<String, Value>, raw: &Value) -> Result<UserMessage, ClawError> {
    if let Some(content) = data.get("message").and_then(|m| m.get("content")) {
        if let Some(text) = content.as_str() {
            return Ok(UserMessage::new(text));
        }

        if let Some(blocks) = content.as_array() {
            let tool_output = blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_result"))
                .find_map(|block| block.get("content").and_then(Value::as_str));
            return Ok(UserMessage::new(tool_output.unwrap_or(TOOL_RESULT_PLACEHOLDER)));
        }
    }

    if let Some(text) = data.get("content").and_then(Value::as_str) {
        return Ok(UserMessage::new(text));
    }

    Err(ClawError::parse(
        ParseErrorKind::MissingField,
        "Missing required field 'content' in user message",
        raw,
    ))
}

fn parse_assistant(data: &Map<String, Value>, raw: &Value) -> Result<AssistantMessage, ClawError> {
    let content = data
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .or_else(|| data.get("content").and_then(Value::as_array))
        .ok_or_else(|| {
            ClawError::parse(
                ParseErrorKind::MissingField,
                "Missing required field 'content' in assistant message",
                raw,
            )
        })?;

    let blocks = content
        .iter()
        .map(parse_content_block)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AssistantMessage::new(blocks))
}

/// Parse one assistant content block
///
/// # Errors
///
/// [`ParseErrorKind::MalformedBlock`] for non-objects and unknown block types,
/// [`ParseErrorKind::MissingField`] when a block lacks its required fields.
pub fn parse_content_block(value: &Value) -> Result<ContentBlock, ClawError> {
    let Some(block) = value.as_object() else {
        return Err(ClawError::parse(
            ParseErrorKind::MalformedBlock,
            "Invalid content block format",
            value,
        ));
    };

    let Some(block_type) = block.get("type").and_then(Value::as_str) else {
        return Err(ClawError::parse(
            ParseErrorKind::MalformedBlock,
            "Content block missing 'type' field",
            value,
        ));
    };

    let missing = |reason: &str| ClawError::parse(ParseErrorKind::MissingField, reason, value);

    match block_type {
        "text" => {
            let text = str_field(block, "text")
                .ok_or_else(|| missing("Text block missing 'text' field"))?;
            Ok(ContentBlock::Text {
                text: text.to_string(),
            })
        }
        "tool_use" => {
            let id = str_field(block, "id")
                .ok_or_else(|| missing("Tool use block missing 'id' field"))?;
            let name = str_field(block, "name")
                .ok_or_else(|| missing("Tool use block missing 'name' field"))?;
            let input = block
                .get("input")
                .and_then(Value::as_object)
                .ok_or_else(|| missing("Tool use block missing 'input' field"))?;
            Ok(ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: input.clone(),
            })
        }
        "tool_result" => {
            let tool_use_id = str_field(block, "tool_use_id")
                .ok_or_else(|| missing("Tool result block missing 'tool_use_id' field"))?;
            let content = block.get("content").filter(|c| !c.is_null()).cloned();
            let is_error = block.get("is_error").and_then(Value::as_bool);
            Ok(ContentBlock::ToolResult {
                tool_use_id: tool_use_id.to_string(),
                content,
                is_error,
            })
        }
        other => Err(ClawError::parse(
            ParseErrorKind::MalformedBlock,
            format!("Unknown content block type: {other}"),
            value,
        )),
    }
}

fn parse_system(data: &Map<String, Value>, raw: &Value) -> Result<SystemMessage, ClawError> {
    let subtype = str_field(data, "subtype").ok_or_else(|| {
        ClawError::parse(
            ParseErrorKind::MissingField,
            "Missing required field 'subtype' in system message",
            raw,
        )
    })?;

    Ok(SystemMessage::new(subtype, data.clone()))
}

fn parse_result(data: &Map<String, Value>, raw: &Value) -> Result<ResultMessage, ClawError> {
    let missing = |field: &str| {
        ClawError::parse(
            ParseErrorKind::MissingField,
            format!("Missing required field '{field}' in result message"),
            raw,
        )
    };

    let subtype = str_field(data, "subtype").ok_or_else(|| missing("subtype"))?;
    let duration_ms = count_field(data, "duration_ms").ok_or_else(|| missing("duration_ms"))?;
    let duration_api_ms =
        count_field(data, "duration_api_ms").ok_or_else(|| missing("duration_api_ms"))?;
    let is_error = data
        .get("is_error")
        .and_then(Value::as_bool)
        .ok_or_else(|| missing("is_error"))?;
    let num_turns = count_field(data, "num_turns").ok_or_else(|| missing("num_turns"))?;
    let session_id = str_field(data, "session_id")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| missing("session_id"))?;

    Ok(ResultMessage {
        subtype: subtype.to_string(),
        duration_ms,
        duration_api_ms,
        is_error,
        num_turns,
        session_id: session_id.to_string(),
        total_cost_usd: data.get("total_cost_usd").and_then(Value::as_f64),
        usage: data.get("usage").and_then(Value::as_object).cloned(),
        result: str_field(data, "result").map(str::to_string),
    })
}

fn str_field<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

/// Non-negative count, accepted as integer or float (truncated toward zero)
fn count_field(data: &Map<String, Value>, key: &str) -> Option<u64> {
    let value = data.get(key)?;
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 => Some(f.trunc() as u64),
        _ => None,
    }
}
