use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::providers::openai::{ChatPayload, CompletionResult, EnhancementResult};
use crate::providers::streaming::ChunkStream;

/// 上游语言模型服务的调用能力（OpenAI 兼容）
///
/// Every call takes the request's cancellation token and must return
/// `GatewayError::Cancelled` promptly once it fires.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Single-document chat completion.
    async fn submit_completion(
        &self,
        payload: ChatPayload,
        cancel: &CancellationToken,
    ) -> Result<CompletionResult>;

    /// Opens a chat completion event stream. Resolves only once the upstream has accepted
    /// the request, so rejection surfaces here rather than as a stream item.
    async fn submit_streaming_completion(
        &self,
        payload: ChatPayload,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream>;

    /// Instruction-mode completion used to rewrite a prompt.
    async fn submit_enhancement(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
        cancel: &CancellationToken,
    ) -> Result<EnhancementResult>;
}
