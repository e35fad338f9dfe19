use axum::body::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub use async_openai::types::CompletionUsage as Usage;

/// 会话消息：`content` 按原样保存（字符串、分段数组或 `null`），其余字段原样保留
///
/// `content: None` means the key was absent; an explicit `null` is kept as `Some(Value::Null)`
/// so the message serializes back exactly as it arrived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(Value::String(content.into())),
            extra: Map::new(),
        }
    }

    /// Plain-text content, if the message carries a string.
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Normalized inbound chat completion request.
///
/// Recognized fields keep the caller's literal values (absent stays absent); defaults are
/// applied only when the upstream payload is built. Everything else lives in `extra`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub messages: Option<Vec<Message>>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub stream: Option<bool>,
    pub extra: Map<String, Value>,
}

impl CompletionRequest {
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// Body sent to `/v1/chat/completions`.
pub type ChatPayload = Map<String, Value>;

/// Non-streaming upstream result, kept as the exact bytes the upstream returned.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub body: Bytes,
}

impl CompletionResult {
    pub fn from_value(value: &Value) -> Self {
        Self {
            body: Bytes::from(value.to_string()),
        }
    }

    pub fn usage(&self) -> Option<Usage> {
        let v: Value = serde_json::from_slice(&self.body).ok()?;
        usage_from_value(&v)
    }
}

/// One streamed chunk: the raw JSON text of a single upstream `data:` line.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionChunk {
    pub data: String,
}

impl CompletionChunk {
    pub fn from_value(value: &Value) -> Self {
        Self {
            data: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementResult {
    pub text: String,
}

pub(crate) fn usage_from_value(v: &Value) -> Option<Usage> {
    let usage = v.get("usage")?;
    if usage.is_null() {
        return None;
    }
    serde_json::from_value::<Usage>(usage.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_content_shapes_survive_unchanged() {
        for raw in [
            json!({"role": "user", "content": [{"type": "text", "text": "hi"}]}),
            json!({"role": "assistant", "content": null, "tool_calls": [{"id": "t1", "type": "function"}]}),
            json!({"role": "assistant", "tool_calls": []}),
            json!({"role": "tool", "content": "42", "tool_call_id": "t1"}),
        ] {
            let message: Message = serde_json::from_value(raw.clone()).unwrap();
            assert_eq!(serde_json::to_value(&message).unwrap(), raw);
        }
    }

    #[test]
    fn text_is_only_read_from_string_content() {
        assert_eq!(Message::new("user", "hi").text(), Some("hi"));
        let parts: Message =
            serde_json::from_value(json!({"role": "user", "content": [{"type": "text", "text": "hi"}]}))
                .unwrap();
        assert_eq!(parts.text(), None);
        let null: Message = serde_json::from_value(json!({"role": "assistant", "content": null})).unwrap();
        assert_eq!(null.content, Some(Value::Null));
        assert_eq!(null.text(), None);
    }
}
