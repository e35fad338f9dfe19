use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// 请求形状错误：在任何上游调用之前拒绝
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("messages must contain at least one message to enhance")]
    MissingContext,

    #[error("messages must be a non-empty array of objects that each carry a role")]
    EmptyMessages,

    #[error("the last message's content must be a string to be enhanced")]
    NonTextContent,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Enhancement upstream error: {0}")]
    EnhancementUpstream(String),

    #[error("Completion upstream error: {0}")]
    CompletionUpstream(String),

    #[error("Streaming upstream error: {0}")]
    StreamingUpstream(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Stable machine-readable kind, used as `error.type` on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "validation_error",
            GatewayError::EnhancementUpstream(_) => "enhancement_upstream_error",
            GatewayError::CompletionUpstream(_) => "completion_upstream_error",
            GatewayError::StreamingUpstream(_) => "streaming_upstream_error",
            GatewayError::Cancelled => "cancelled",
            GatewayError::Http(_) => "http_error",
            GatewayError::Json(_) => "json_error",
            GatewayError::Io(_) => "io_error",
            GatewayError::ConfigParse(_) | GatewayError::Config(_) => "config_error",
        }
    }

    // 对外一律 500，与既有客户端的约定保持一致
    pub fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    /// `{ "error": { "type", "message" } }`, shared by the JSON error body and the
    /// sentinel frame that terminates a failed event stream.
    pub fn to_error_body(&self) -> serde_json::Value {
        json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

// 日志由请求处理方带上下文统一记录，这里只负责响应体
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_error_body())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_context_is_a_validation_error() {
        let err: GatewayError = ValidationError::MissingContext.into();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_body_carries_kind_and_message() {
        let body = GatewayError::EnhancementUpstream("no choices".into()).to_error_body();
        assert_eq!(body["error"]["type"], "enhancement_upstream_error");
        assert_eq!(
            body["error"]["message"],
            "Enhancement upstream error: no choices"
        );
    }
}
