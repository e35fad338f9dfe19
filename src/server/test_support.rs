use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header::CONTENT_TYPE};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::config::Settings;
use crate::error::{GatewayError, Result};
use crate::providers::openai::{ChatPayload, CompletionChunk, CompletionResult, EnhancementResult};
use crate::providers::streaming::ChunkStream;
use crate::providers::upstream::UpstreamClient;
use crate::server::{AppState, build_router};

#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamCall {
    Completion(ChatPayload),
    Streaming(ChatPayload),
    Enhancement {
        prompt: String,
        max_tokens: u32,
        temperature: f64,
    },
}

/// In-memory upstream recording every call in order.
#[derive(Default)]
pub struct StubUpstream {
    completion: Mutex<Option<std::result::Result<Value, String>>>,
    stream: Mutex<Option<std::result::Result<ChunkStream, String>>>,
    enhancement: Mutex<Option<std::result::Result<String, String>>>,
    calls: Mutex<Vec<UpstreamCall>>,
}

impl StubUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completion(self, result: std::result::Result<Value, &str>) -> Self {
        *self.completion.lock().unwrap() = Some(result.map_err(str::to_string));
        self
    }

    pub fn with_chunks(self, chunks: Vec<std::result::Result<Value, &str>>) -> Self {
        let items: Vec<Result<CompletionChunk>> = chunks
            .into_iter()
            .map(|c| match c {
                Ok(v) => Ok(CompletionChunk::from_value(&v)),
                Err(e) => Err(GatewayError::StreamingUpstream(e.to_string())),
            })
            .collect();
        self.with_stream(Box::pin(futures_util::stream::iter(items)))
    }

    pub fn with_stream(self, stream: ChunkStream) -> Self {
        *self.stream.lock().unwrap() = Some(Ok(stream));
        self
    }

    pub fn with_stream_open_error(self, message: &str) -> Self {
        *self.stream.lock().unwrap() = Some(Err(message.to_string()));
        self
    }

    pub fn with_enhancement(self, result: std::result::Result<&str, &str>) -> Self {
        *self.enhancement.lock().unwrap() =
            Some(result.map(str::to_string).map_err(str::to_string));
        self
    }

    pub fn calls(&self) -> Vec<UpstreamCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: UpstreamCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl UpstreamClient for StubUpstream {
    async fn submit_completion(
        &self,
        payload: ChatPayload,
        _cancel: &CancellationToken,
    ) -> Result<CompletionResult> {
        self.record(UpstreamCall::Completion(payload));
        match self.completion.lock().unwrap().clone() {
            Some(Ok(v)) => Ok(CompletionResult::from_value(&v)),
            Some(Err(e)) => Err(GatewayError::CompletionUpstream(e)),
            None => Err(GatewayError::CompletionUpstream("stub has no completion".into())),
        }
    }

    async fn submit_streaming_completion(
        &self,
        payload: ChatPayload,
        _cancel: &CancellationToken,
    ) -> Result<ChunkStream> {
        self.record(UpstreamCall::Streaming(payload));
        match self.stream.lock().unwrap().take() {
            Some(Ok(stream)) => Ok(stream),
            Some(Err(e)) => Err(GatewayError::CompletionUpstream(e)),
            None => Err(GatewayError::CompletionUpstream("stub has no stream".into())),
        }
    }

    async fn submit_enhancement(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
        _cancel: &CancellationToken,
    ) -> Result<EnhancementResult> {
        self.record(UpstreamCall::Enhancement {
            prompt: prompt.to_string(),
            max_tokens,
            temperature,
        });
        match self.enhancement.lock().unwrap().clone() {
            Some(Ok(text)) => Ok(EnhancementResult { text }),
            Some(Err(e)) => Err(GatewayError::EnhancementUpstream(e)),
            None => Err(GatewayError::EnhancementUpstream("stub has no enhancement".into())),
        }
    }
}

pub fn test_state(upstream: Arc<StubUpstream>) -> AppState {
    AppState {
        config: Settings::default(),
        upstream,
        shutdown: CancellationToken::new(),
    }
}

pub fn test_app(upstream: Arc<StubUpstream>) -> Router {
    build_router(test_state(upstream))
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(req).await.unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// `data:` payloads of an event-stream body, in order; comment lines are ignored.
pub fn sse_data_frames(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .map(str::to_string)
        .collect()
}
