use axum::http::{HeaderValue, header};
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use futures_util::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::{GatewayError, Result};
use crate::providers::openai::{ChatPayload, CompletionChunk};
use crate::providers::streaming::{ChunkStream, usage_from_chunk};
use crate::server::AppState;
use crate::server::request_logging::RequestContext;

mod common;

use common::{StreamOutcome, chunk_event, error_event, log_stream_outcome};

/// 流式中继：
/// - 先打开上游流，上游拒绝时仍可返回普通的 500 JSON 错误
/// - 之后逐个分片按到达顺序写成 `data:` 帧，不合并、不重排
/// - 上游中途失败写出终止帧 `data: {"error": ...}` 后关闭；调用方断开则取消并丢弃上游流
pub(crate) async fn relay_stream(
    app_state: Arc<AppState>,
    payload: ChatPayload,
    ctx: RequestContext,
    cancel: CancellationToken,
) -> Result<Response> {
    let mut chunks = app_state
        .upstream
        .submit_streaming_completion(payload, &cancel)
        .await?;

    let relay_cfg = &app_state.config.relay;
    let idle_timeout = relay_cfg.stream_idle_timeout();
    let (tx, rx) = mpsc::channel::<Event>(relay_cfg.stream_channel_capacity.max(1));

    tokio::spawn(async move {
        let mut relayed = 0usize;
        let mut usage = None;

        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StreamOutcome::Cancelled,
                _ = tx.closed() => break StreamOutcome::CallerGone,
                next = next_chunk(&mut chunks, idle_timeout) => next,
            };

            match next {
                Ok(Some(chunk)) => {
                    if let Some(u) = usage_from_chunk(&chunk) {
                        usage = Some(u);
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break StreamOutcome::Cancelled,
                        sent = tx.send(chunk_event(&chunk)) => {
                            if sent.is_err() {
                                break StreamOutcome::CallerGone;
                            }
                        }
                    }
                    relayed += 1;
                }
                Ok(None) => break StreamOutcome::Completed,
                Err(e) => {
                    let _ = tx.send(error_event(&e)).await;
                    break StreamOutcome::Failed(e);
                }
            }
        };

        // 释放上游连接
        drop(chunks);
        match &outcome {
            StreamOutcome::CallerGone => cancel.cancel(),
            StreamOutcome::Cancelled => {
                let _ = tx.try_send(error_event(&GatewayError::Cancelled));
            }
            _ => {}
        }
        log_stream_outcome(&ctx, relayed, usage.as_ref(), &outcome);
    });

    let out_stream = tokio_stream::StreamExt::map(ReceiverStream::new(rx), Ok::<_, Infallible>);
    let mut response = Sse::new(out_stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(response)
}

/// Waits for the next upstream chunk, bounded by the idle timeout when one is configured.
pub(crate) async fn next_chunk(
    chunks: &mut ChunkStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<CompletionChunk>> {
    let next = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, chunks.next())
            .await
            .map_err(|_| {
                GatewayError::StreamingUpstream(format!(
                    "no chunk received from upstream within {}ms",
                    limit.as_millis()
                ))
            })?,
        None => chunks.next().await,
    };
    next.transpose()
}
