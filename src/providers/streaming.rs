use futures_util::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde_json::Value;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::error::{GatewayError, Result};
use crate::providers::openai::types::{CompletionChunk, Usage, usage_from_value};

/// 流式传输的响应流类型：惰性、有限、不可重启
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk>> + Send>>;

/// 单条 SSE `data` 的解析结果
#[derive(Debug, PartialEq)]
pub enum ChunkLine {
    Chunk(CompletionChunk),
    Done,
    Skip,
}

/// Classifies one upstream `data:` payload. The chunk text itself is kept as received;
/// it is only parsed to reject non-JSON payloads.
pub fn parse_chunk_line(data: &str) -> Result<ChunkLine> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return Ok(ChunkLine::Skip);
    }
    if trimmed == "[DONE]" {
        return Ok(ChunkLine::Done);
    }
    serde_json::from_str::<serde::de::IgnoredAny>(trimmed).map_err(|e| {
        GatewayError::StreamingUpstream(format!("upstream sent a non-JSON chunk: {}", e))
    })?;
    Ok(ChunkLine::Chunk(CompletionChunk {
        data: data.to_string(),
    }))
}

/// Usage block carried by a chunk (OpenAI only sends it on the final chunk when asked).
pub fn usage_from_chunk(chunk: &CompletionChunk) -> Option<Usage> {
    let v: Value = serde_json::from_str(&chunk.data).ok()?;
    usage_from_value(&v)
}

/// Adapts an already-opened event source into a chunk stream. The source is closed on
/// `[DONE]`, on its natural end, or after the first error; an error is yielded exactly once.
pub fn chunk_stream_from_event_source(es: EventSource) -> ChunkStream {
    let stream = futures_util::stream::unfold(Some(es), |state| async move {
        let Some(mut es) = state else {
            return None;
        };
        loop {
            match es.next().await {
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(m))) => match parse_chunk_line(&m.data) {
                    Ok(ChunkLine::Skip) => continue,
                    Ok(ChunkLine::Done) => {
                        es.close();
                        return None;
                    }
                    Ok(ChunkLine::Chunk(chunk)) => return Some((Ok(chunk), Some(es))),
                    Err(e) => {
                        es.close();
                        return Some((Err(e), None));
                    }
                },
                Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => {
                    es.close();
                    return None;
                }
                Some(Err(e)) => {
                    tracing::error!("Stream error: {}", e);
                    es.close();
                    return Some((Err(GatewayError::StreamingUpstream(e.to_string())), None));
                }
            }
        }
    });
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_marker_ends_the_stream() {
        assert_eq!(parse_chunk_line("[DONE]").unwrap(), ChunkLine::Done);
        assert_eq!(parse_chunk_line(" [DONE] ").unwrap(), ChunkLine::Done);
    }

    #[test]
    fn chunk_text_is_kept_verbatim() {
        let raw = r#"{"id":"c1","choices":[{"delta":{"content":"He"}}],  "z":1}"#;
        match parse_chunk_line(raw).unwrap() {
            ChunkLine::Chunk(c) => assert_eq!(c.data, raw),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_chunk_line("  ").unwrap(), ChunkLine::Skip);
    }

    #[test]
    fn non_json_chunk_is_a_streaming_error() {
        let err = parse_chunk_line("not json").unwrap_err();
        assert!(matches!(err, GatewayError::StreamingUpstream(_)));
    }

    #[test]
    fn usage_is_read_from_final_chunk() {
        let chunk = CompletionChunk {
            data: r#"{"id":"c","choices":[],"usage":{"prompt_tokens":3,"completion_tokens":5,"total_tokens":8}}"#
                .into(),
        };
        let usage = usage_from_chunk(&chunk).unwrap();
        assert_eq!(usage.prompt_tokens, 3);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 8);

        let no_usage = CompletionChunk {
            data: r#"{"id":"c","choices":[],"usage":null}"#.into(),
        };
        assert!(usage_from_chunk(&no_usage).is_none());
    }
}
