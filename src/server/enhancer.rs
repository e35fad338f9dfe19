use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::EnhancementConfig;
use crate::error::{GatewayError, Result, ValidationError};
use crate::providers::openai::CompletionRequest;
use crate::providers::upstream::UpstreamClient;

/// Instruction prompt wrapped around the caller's final message.
pub fn build_enhancement_prompt(original: &str) -> String {
    format!(
        "Create a prompt which can act as a prompt templete where I put the original prompt and \
         it can modify it according to my intentions so that the final modified prompt is more \
         detailed.You can expand certain terms or keywords.\n\
         ----------\n\
         PROMPT: {}.\n\
         MODIFIED PROMPT: ",
        original
    )
}

/// Rewrites the last message's `content` through one instruction-mode upstream call.
///
/// Only the last message's `content` changes; its role and any other fields are kept, as are
/// the earlier messages and every other request field. There is no fallback to the original
/// prompt: a failed or empty rewrite fails the request.
pub async fn enhance_request(
    upstream: &dyn UpstreamClient,
    config: &EnhancementConfig,
    mut request: CompletionRequest,
    cancel: &CancellationToken,
) -> Result<CompletionRequest> {
    let Some(last) = request.messages.as_mut().and_then(|m| m.last_mut()) else {
        return Err(ValidationError::MissingContext.into());
    };

    let Some(original) = last.text() else {
        return Err(ValidationError::NonTextContent.into());
    };
    let original_len = original.len();

    let prompt = build_enhancement_prompt(original);
    let enhancement = upstream
        .submit_enhancement(&prompt, config.max_tokens, config.temperature, cancel)
        .await?;

    if enhancement.text.trim().is_empty() {
        return Err(GatewayError::EnhancementUpstream(
            "upstream returned an empty rewrite".into(),
        ));
    }

    tracing::debug!(
        original_len,
        enhanced_len = enhancement.text.len(),
        "prompt enhanced"
    );
    last.content = Some(Value::String(enhancement.text));
    Ok(request)
}
