use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::error::{Result, ValidationError};
use crate::providers::openai::{ChatPayload, CompletionRequest};
use crate::server::AppState;
use crate::server::request_logging::{RequestContext, log_chat_request};
use crate::server::streaming::relay_stream;

/// Model actually sent upstream: an absent or blank model falls back to the configured baseline.
pub fn effective_model<'a>(request: &'a CompletionRequest, cfg: &'a RelayConfig) -> &'a str {
    request
        .model
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(&cfg.default_model)
}

/// 组装上游请求体：先铺透传字段，再写入由中继决定的字段
///
/// `model`, `messages`, `max_tokens`, `temperature` and `stream` are always written last, so a
/// pass-through key can never replace them. Only absent values are defaulted; an explicit
/// `temperature: 0` is sent as is.
pub fn build_upstream_payload(request: &CompletionRequest, cfg: &RelayConfig) -> Result<ChatPayload> {
    let messages = match request.messages.as_deref() {
        Some(m) if !m.is_empty() => m,
        _ => return Err(ValidationError::EmptyMessages.into()),
    };

    let mut payload = request.extra.clone();
    payload.insert("model".into(), json!(effective_model(request, cfg)));
    payload.insert("messages".into(), serde_json::to_value(messages)?);
    payload.insert(
        "max_tokens".into(),
        json!(request.max_tokens.unwrap_or(cfg.default_max_tokens)),
    );
    payload.insert(
        "temperature".into(),
        json!(request.temperature.unwrap_or(cfg.default_temperature)),
    );
    payload.insert("stream".into(), Value::Bool(request.is_stream()));
    Ok(payload)
}

/// Delivers the completion: one JSON document, or an event stream when `stream` is true.
pub async fn relay_completion(
    app_state: Arc<AppState>,
    request: CompletionRequest,
    ctx: RequestContext,
    cancel: CancellationToken,
) -> Result<Response> {
    let payload = build_upstream_payload(&request, &app_state.config.relay)?;

    if request.is_stream() {
        return relay_stream(app_state, payload, ctx, cancel).await;
    }

    let result = app_state.upstream.submit_completion(payload, &cancel).await?;
    log_chat_request(&ctx, result.usage().as_ref(), None);

    let mut response = (StatusCode::OK, result.body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}
