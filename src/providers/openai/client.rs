use async_openai::types::CreateCompletionResponse;
use async_trait::async_trait;
use axum::body::Bytes;
use futures_util::StreamExt;
use reqwest::{RequestBuilder, StatusCode};
use reqwest_eventsource::{Event, RequestBuilderExt, retry::Never};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::config::{EnhancementConfig, UpstreamConfig};
use crate::error::{GatewayError, Result};
use crate::http_client::{client_for_upstream, streaming_client_for_upstream};
use crate::providers::streaming::{ChunkStream, chunk_stream_from_event_source};
use crate::providers::upstream::UpstreamClient;

use super::types::{ChatPayload, CompletionResult, EnhancementResult};

/// OpenAI 兼容上游的 HTTP 实现
pub struct OpenAIProvider {
    base_url: String,
    api_key: Option<String>,
    enhancement_model: String,
    client: reqwest::Client,
    streaming_client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(upstream: &UpstreamConfig, enhancement: &EnhancementConfig) -> Result<Self> {
        if upstream.resolve_api_key().is_none() {
            tracing::warn!("No upstream API key configured; requests are sent unauthenticated");
        }
        Ok(Self {
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            api_key: upstream.resolve_api_key(),
            enhancement_model: enhancement.model.clone(),
            client: client_for_upstream(upstream)?,
            streaming_client: streaming_client_for_upstream(upstream)?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    /// Sends a JSON request and returns status and body, racing the cancellation token.
    async fn send_json(
        &self,
        builder: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<std::result::Result<(StatusCode, Bytes), reqwest::Error>> {
        let exchange = async {
            let response = builder.header("Accept", "application/json").send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(GatewayError::Cancelled),
            outcome = exchange => Ok(outcome),
        }
    }
}

fn describe_status(status: StatusCode, body: &[u8]) -> String {
    format!(
        "upstream returned {}: {}",
        status,
        String::from_utf8_lossy(body).trim()
    )
}

/// Picks the first choice's text, typed first and then leniently for vendor variants.
fn first_choice_text(body: &[u8]) -> Option<String> {
    if let Ok(typed) = serde_json::from_slice::<CreateCompletionResponse>(body) {
        return typed.choices.into_iter().next().map(|c| c.text);
    }
    let v: Value = serde_json::from_slice(body).ok()?;
    v.get("choices")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl UpstreamClient for OpenAIProvider {
    async fn submit_completion(
        &self,
        mut payload: ChatPayload,
        cancel: &CancellationToken,
    ) -> Result<CompletionResult> {
        payload.insert("stream".into(), Value::Bool(false));
        let builder = self
            .authorized(self.client.post(self.url("/v1/chat/completions")))
            .json(&payload);

        let (status, body) = self
            .send_json(builder, cancel)
            .await?
            .map_err(|e| GatewayError::CompletionUpstream(e.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::CompletionUpstream(describe_status(status, &body)));
        }
        serde_json::from_slice::<serde::de::IgnoredAny>(&body).map_err(|e| {
            GatewayError::CompletionUpstream(format!("upstream returned invalid JSON: {}", e))
        })?;
        Ok(CompletionResult { body })
    }

    async fn submit_streaming_completion(
        &self,
        mut payload: ChatPayload,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream> {
        payload.insert("stream".into(), Value::Bool(true));
        let builder = self
            .authorized(self.streaming_client.post(self.url("/v1/chat/completions")))
            .header("Accept", "text/event-stream")
            .json(&payload);

        let mut es = builder
            .eventsource()
            .map_err(|e| GatewayError::CompletionUpstream(e.to_string()))?;
        es.set_retry_policy(Box::new(Never));

        // 在提交响应头之前确认上游已接受请求
        let first = tokio::select! {
            _ = cancel.cancelled() => {
                es.close();
                return Err(GatewayError::Cancelled);
            }
            ev = es.next() => ev,
        };
        match first {
            Some(Ok(Event::Open)) => Ok(chunk_stream_from_event_source(es)),
            Some(Ok(Event::Message(m))) => {
                // 理论上首个事件总是 Open；保守处理，避免吞掉首个分片
                es.close();
                Err(GatewayError::CompletionUpstream(format!(
                    "upstream sent data before the stream was opened: {}",
                    m.data
                )))
            }
            Some(Err(reqwest_eventsource::Error::InvalidStatusCode(status, response))) => {
                es.close();
                let body = response.bytes().await.unwrap_or_default();
                Err(GatewayError::CompletionUpstream(describe_status(status, &body)))
            }
            Some(Err(e)) => {
                es.close();
                Err(GatewayError::CompletionUpstream(e.to_string()))
            }
            None => Err(GatewayError::CompletionUpstream(
                "upstream closed the stream before it was opened".into(),
            )),
        }
    }

    async fn submit_enhancement(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
        cancel: &CancellationToken,
    ) -> Result<EnhancementResult> {
        let body = json!({
            "model": self.enhancement_model,
            "prompt": prompt,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });
        let builder = self
            .authorized(self.client.post(self.url("/v1/completions")))
            .json(&body);

        let (status, bytes) = self
            .send_json(builder, cancel)
            .await?
            .map_err(|e| GatewayError::EnhancementUpstream(e.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::EnhancementUpstream(describe_status(
                status, &bytes,
            )));
        }
        let text = first_choice_text(&bytes).ok_or_else(|| {
            GatewayError::EnhancementUpstream("upstream returned no choices".into())
        })?;
        Ok(EnhancementResult { text })
    }
}
