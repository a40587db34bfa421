//! Adapter for Ollama-style backends: a single generate endpoint taking
//! `{model, prompt, stream}`. Streaming bodies are newline-delimited JSON
//! fragments; the stream ends when the connection closes — this family has
//! no end-of-stream sentinel, so body end is normal termination.

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
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaAdapter {
    client: Client,
    timeout_secs: u64,
}

impl OllamaAdapter {
    pub fn new(client: Client, timeout_secs: u64) -> Self {
        Self {
            client,
            timeout_secs,
        }
    }

    fn generate_url(backend: &BackendDescriptor) -> String {
        format!("{}/api/generate", backend.trimmed_base_url())
    }

    async fn send(
        &self,
        backend: &BackendDescriptor,
        model: &str,
        prompt: &str,
        stream: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let req = GenerateRequest {
            model,
            prompt,
            stream,
        };
        let res = self
            .client
            .post(Self::generate_url(backend))
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&req)
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
impl ProtocolAdapter for OllamaAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Ollama
    }

    async fn complete(
        &self,
        backend: &BackendDescriptor,
        model: &str,
        prompt: &str,
    ) -> Result<CompletionResult, GatewayError> {
        let res = self.send(backend, model, prompt, false).await?;
        let parsed: GenerateResponse = res
            .json()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, self.timeout_secs))?;
        Ok(CompletionResult {
            text: parsed.response,
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
                    if let Some(text) = parse_generate_line(&line) {
                        if tx.send(Ok(CompletionChunk { text })).await.is_err() {
                            // Caller went away; drop the connection.
                            return;
                        }
                    }
                }
            }
            if let Some(rest) = lines.finish() {
                if let Some(text) = parse_generate_line(&rest) {
                    let _ = tx.send(Ok(CompletionChunk { text })).await;
                }
            }
            // Connection closed without a sentinel: normal termination for
            // this family.
        });

        Ok(rx)
    }
}

/// One NDJSON line of a streaming generate body. Malformed lines are skipped
/// with a warning; a single bad line must not abort the whole stream.
fn parse_generate_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(value) => value
            .get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string()),
        Err(e) => {
            warn!("skipping malformed stream line: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Scope;

    #[test]
    fn parses_response_fragment() {
        assert_eq!(
            parse_generate_line(r#"{"model":"llama3","response":"Hel","done":false}"#),
            Some("Hel".to_string())
        );
    }

    #[test]
    fn skips_lines_without_response_field() {
        assert_eq!(parse_generate_line(r#"{"done":true}"#), None);
    }

    #[test]
    fn skips_malformed_and_empty_lines() {
        assert_eq!(parse_generate_line("not json at all"), None);
        assert_eq!(parse_generate_line(""), None);
        assert_eq!(parse_generate_line("   "), None);
    }

    #[test]
    fn generate_url_tolerates_trailing_slash() {
        let backend = BackendDescriptor {
            id: "local".to_string(),
            display_name: "local".to_string(),
            protocol: Protocol::Ollama,
            base_url: "http://localhost:11434/".to_string(),
            api_key: None,
            default_model: "llama3".to_string(),
            scope: Scope::System,
        };
        assert_eq!(
            OllamaAdapter::generate_url(&backend),
            "http://localhost:11434/api/generate"
        );
    }
}
