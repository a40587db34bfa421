//! Adapter for OpenAI-compatible backends: chat-completions with optional
//! bearer auth. Streaming bodies are server-sent-event framed (`data: {json}`
//! lines) and terminate with a literal `data: [DONE]`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::warn;

use super::{
    CHUNK_CHANNEL_CAPACITY, ChunkReceiver, CompletionChunk, CompletionResult, LineBuffer,
    ProtocolAdapter,
};
use crate::backend::{BackendDescriptor, Protocol};
use crate::error::GatewayError;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageOwned,
}

#[derive(Deserialize)]
struct ChatMessageOwned {
    content: String,
}

#[derive(Deserialize)]
struct ChatStreamEvent {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Deserialize, Default)]
struct ChatDelta {
    content: Option<String>,
}

pub struct OpenAiAdapter {
    client: Client,
    timeout_secs: u64,
}

impl OpenAiAdapter {
    pub fn new(client: Client, timeout_secs: u64) -> Self {
        Self {
            client,
            timeout_secs,
        }
    }

    fn completions_url(backend: &BackendDescriptor) -> String {
        format!("{}/v1/chat/completions", backend.trimmed_base_url())
    }

    async fn send(
        &self,
        backend: &BackendDescriptor,
        model: &str,
        prompt: &str,
        stream: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let req = ChatRequest {
            model,
            messages: vec![ChatRequestMessage {
                role: "user",
                content: prompt,
            }],
            stream,
        };

        let mut request = self
            .client
            .post(Self::completions_url(backend))
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&req);
        if let Some(key) = &backend.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let res = request
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, self.timeout_secs))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(GatewayError::Backend {
                status: status.as_u16(),
                body: GatewayError::excerpt(&body),
            });
        }
        Ok(res)
    }
}

#[async_trait]
impl ProtocolAdapter for OpenAiAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::OpenAiCompatible
    }

    async fn complete(
        &self,
        backend: &BackendDescriptor,
        model: &str,
        prompt: &str,
    ) -> Result<CompletionResult, GatewayError> {
        let res = self.send(backend, model, prompt, false).await?;
        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, self.timeout_secs))?;
        Ok(CompletionResult {
            text: parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .unwrap_or_default(),
        })
    }

    async fn complete_streaming(
        &self,
        backend: &BackendDescriptor,
        model: &str,
        prompt: &str,
    ) -> Result<ChunkReceiver, GatewayError> {
        let res = self.send(backend, model, prompt, true).await?;
        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let timeout_secs = self.timeout_secs;

        tokio::spawn(async move {
            let mut body = res.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(next) = body.next().await {
                let bytes = match next {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(GatewayError::from_reqwest(e, timeout_secs)))
                            .await;
                        return;
                    }
                };
                for line in lines.push(&bytes) {
                    match parse_sse_line(&line) {
                        SseLine::Chunk(text) => {
                            if tx.send(Ok(CompletionChunk { text })).await.is_err() {
                                // Caller went away; drop the connection.
                                return;
                            }
                        }
                        SseLine::Done => return,
                        SseLine::Skip => {}
                    }
                }
            }
            // Body ended without [DONE]; nothing more to forward.
        });

        Ok(rx)
    }
}

enum SseLine {
    Chunk(String),
    Done,
    Skip,
}

/// One line of an SSE-framed chat-completions body. Only `data:` lines carry
/// payload; malformed payloads are skipped with a warning rather than
/// aborting a stream that has already delivered output.
fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim().strip_prefix("data: ") else {
        return SseLine::Skip;
    };
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<ChatStreamEvent>(data) {
        Ok(event) => event
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .map(SseLine::Chunk)
            .unwrap_or(SseLine::Skip),
        Err(e) => {
            warn!("skipping malformed SSE line: {}", e);
            SseLine::Skip
        }
    }
}
