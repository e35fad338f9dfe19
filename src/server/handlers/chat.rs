use axum::{body::Bytes, extract::State, response::Response};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::providers::openai::CompletionRequest;
use crate::server::AppState;
use crate::server::chat_request::normalize_body;
use crate::server::enhancer::enhance_request;
use crate::server::relay::{effective_model, relay_completion};
use crate::server::request_logging::{
    ROUTE_CHAT, ROUTE_ENHANCED_CHAT, RequestContext, log_chat_request,
};

/// 直接中继：归一化后按 `stream` 选择 JSON 或 SSE
pub async fn chat_completions(
    State(app_state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request = normalize_body(&body);
    handle(app_state, request, ROUTE_CHAT, false).await
}

/// 先改写最后一条消息，再中继；改写失败则不会发起主请求
pub async fn enhanced_chat_completions(
    State(app_state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request = normalize_body(&body);
    handle(app_state, request, ROUTE_ENHANCED_CHAT, true).await
}

async fn handle(
    app_state: Arc<AppState>,
    request: CompletionRequest,
    route: &'static str,
    enhance: bool,
) -> Result<Response, GatewayError> {
    let ctx = RequestContext::new(
        route,
        effective_model(&request, &app_state.config.relay),
        request.is_stream(),
    );
    tracing::debug!(
        request_id = %ctx.request_id,
        route,
        model = %ctx.model,
        stream = ctx.stream,
        extra_fields = request.extra.len(),
        "chat completion request"
    );

    // 请求被调用方放弃（handler future 被丢弃）时取消上游调用；
    // 流建立后由后台中继任务自行感知断开
    let cancel = app_state.shutdown.child_token();
    let guard = cancel.clone().drop_guard();

    let result = async {
        let request = if enhance {
            enhance_request(
                app_state.upstream.as_ref(),
                &app_state.config.enhancement,
                request,
                &cancel,
            )
            .await?
        } else {
            request
        };
        relay_completion(app_state.clone(), request, ctx.clone(), cancel.clone()).await
    }
    .await;

    guard.disarm();
    if let Err(e) = &result {
        log_chat_request(&ctx, None, Some(e));
    }
    result
}
