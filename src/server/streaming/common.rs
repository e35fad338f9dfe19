use axum::response::sse::Event;

use crate::error::GatewayError;
use crate::providers::openai::{CompletionChunk, Usage};
use crate::server::request_logging::RequestContext;

/// How a relayed stream ended.
#[derive(Debug)]
pub(crate) enum StreamOutcome {
    Completed,
    Failed(GatewayError),
    /// Caller went away; upstream work was dropped.
    CallerGone,
    Cancelled,
}

/// One `data:` frame per chunk. JSON text can only carry raw line breaks as insignificant
/// whitespace, so they are dropped to keep the frame on a single line.
pub(crate) fn chunk_event(chunk: &CompletionChunk) -> Event {
    if chunk.data.contains(&['\r', '\n'][..]) {
        let single_line: String = chunk.data.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
        Event::default().data(single_line)
    } else {
        Event::default().data(&chunk.data)
    }
}

/// 流中途失败时的终止帧：`data: {"error": {...}}`
pub(crate) fn error_event(err: &GatewayError) -> Event {
    Event::default().data(err.to_error_body().to_string())
}

// 统一的流式结束日志
pub(crate) fn log_stream_outcome(
    ctx: &RequestContext,
    chunks: usize,
    usage: Option<&Usage>,
    outcome: &StreamOutcome,
) {
    let response_time_ms = ctx.elapsed_ms();
    match outcome {
        StreamOutcome::Completed => tracing::info!(
            request_id = %ctx.request_id,
            route = ctx.route,
            model = %ctx.model,
            chunks,
            response_time_ms,
            prompt_tokens = usage.map(|u| u.prompt_tokens),
            completion_tokens = usage.map(|u| u.completion_tokens),
            total_tokens = usage.map(|u| u.total_tokens),
            "chat stream finished"
        ),
        StreamOutcome::Failed(e) => tracing::error!(
            request_id = %ctx.request_id,
            route = ctx.route,
            model = %ctx.model,
            chunks,
            response_time_ms,
            error_kind = e.kind(),
            error_message = %e,
            "chat stream failed after headers were sent"
        ),
        StreamOutcome::CallerGone => tracing::info!(
            request_id = %ctx.request_id,
            route = ctx.route,
            chunks,
            response_time_ms,
            "caller disconnected; upstream stream dropped"
        ),
        StreamOutcome::Cancelled => tracing::warn!(
            request_id = %ctx.request_id,
            route = ctx.route,
            chunks,
            response_time_ms,
            "chat stream cancelled"
        ),
    }
}
