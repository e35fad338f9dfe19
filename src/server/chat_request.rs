use serde_json::{Map, Value};

use crate::providers::openai::{CompletionRequest, Message};

/// Top-level keys lifted out of the body; everything else is pass-through.
pub const RECOGNIZED_FIELDS: [&str; 5] = ["model", "messages", "max_tokens", "temperature", "stream"];

/// Parses a raw body leniently: bytes that are not a JSON object normalize to an empty request,
/// which later stages reject for its missing `messages`.
pub fn normalize_body(body: &[u8]) -> CompletionRequest {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => normalize_request(value),
        Err(e) => {
            tracing::debug!("request body is not JSON: {}", e);
            CompletionRequest::default()
        }
    }
}

/// 拆分已识别字段与透传字段；不做任何默认值填充，也从不失败
pub fn normalize_request(body: Value) -> CompletionRequest {
    let Value::Object(mut fields) = body else {
        return CompletionRequest::default();
    };

    let model = fields.remove("model").and_then(|v| match v {
        Value::String(s) => Some(s),
        _ => None,
    });
    let messages = fields.remove("messages").and_then(parse_messages);
    let max_tokens = fields.remove("max_tokens").and_then(|v| whole_number(&v));
    let temperature = fields.remove("temperature").and_then(|v| v.as_f64());
    let stream = fields.remove("stream").and_then(|v| v.as_bool());

    CompletionRequest {
        model,
        messages,
        max_tokens,
        temperature,
        stream,
        extra: fields,
    }
}

// `100` 与 `100.0` 等价；负数、小数或超出 u32 的值视为缺失
fn whole_number(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    let f = value.as_f64()?;
    if f.fract() != 0.0 || f < 0.0 || f > f64::from(u32::MAX) {
        return None;
    }
    Some(f as u32)
}

// 任一元素不是带 role 的对象即视为整个字段畸形；content 的形状不作要求
fn parse_messages(value: Value) -> Option<Vec<Message>> {
    let Value::Array(items) = value else {
        return None;
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(obj) => message_from_object(obj),
            _ => None,
        })
        .collect()
}

fn message_from_object(obj: Map<String, Value>) -> Option<Message> {
    match serde_json::from_value::<Message>(Value::Object(obj)) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::debug!("dropping malformed messages field: {}", e);
            None
        }
    }
}
