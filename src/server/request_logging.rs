use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::providers::openai::Usage;

pub const ROUTE_CHAT: &str = "/v1/chat/completions";
pub const ROUTE_ENHANCED_CHAT: &str = "/v1/enhanced/chat/completions";

/// Per-request bookkeeping carried into the log line written when the request ends.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub route: &'static str,
    pub model: String,
    pub stream: bool,
    pub start_time: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(route: &'static str, model: impl Into<String>, stream: bool) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            route,
            model: model.into(),
            stream,
            start_time: Utc::now(),
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.start_time).num_milliseconds()
    }
}

/// 请求结束时的统一日志（非流式，或流尚未建立即失败）
pub fn log_chat_request(
    ctx: &RequestContext,
    usage: Option<&Usage>,
    error: Option<&GatewayError>,
) {
    match error {
        None => tracing::info!(
            request_id = %ctx.request_id,
            route = ctx.route,
            model = %ctx.model,
            stream = ctx.stream,
            status_code = 200,
            response_time_ms = ctx.elapsed_ms(),
            prompt_tokens = usage.map(|u| u.prompt_tokens),
            completion_tokens = usage.map(|u| u.completion_tokens),
            total_tokens = usage.map(|u| u.total_tokens),
            "chat completion finished"
        ),
        Some(e) => tracing::warn!(
            request_id = %ctx.request_id,
            route = ctx.route,
            model = %ctx.model,
            stream = ctx.stream,
            status_code = e.status_code().as_u16(),
            response_time_ms = ctx.elapsed_ms(),
            error_kind = e.kind(),
            error_message = %e,
            "chat completion failed"
        ),
    }
}
