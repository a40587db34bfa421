//! Protocol adapters: translate the gateway's single completion interface to
//! and from each backend family's wire format. Callers of the orchestrator
//! never see the format differences; both families normalize to
//! [`CompletionChunk`] / [`CompletionResult`].

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::backend::{BackendDescriptor, Protocol};
use crate::error::GatewayError;

#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub text: String,
}

/// One incremental fragment of a streamed completion.
#[derive(Debug, Clone)]
pub struct CompletionChunk {
    pub text: String,
}

/// Incremental output of one streaming completion. The channel is bounded,
/// so the upstream reader suspends when the consumer stops draining —
/// backpressure comes from the caller's own consumption rate.
pub type ChunkReceiver = mpsc::Receiver<Result<CompletionChunk, GatewayError>>;

pub(crate) const CHUNK_CHANNEL_CAPACITY: usize = 32;

#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Single blocking completion.
    async fn complete(
        &self,
        backend: &BackendDescriptor,
        model: &str,
        prompt: &str,
    ) -> Result<CompletionResult, GatewayError>;

    /// Streaming completion. Returns once the response headers have arrived;
    /// chunks follow on the receiver. Failures after that point are delivered
    /// through the channel, never as a return value. Dropping the receiver
    /// stops upstream consumption and releases the connection.
    async fn complete_streaming(
        &self,
        backend: &BackendDescriptor,
        model: &str,
        prompt: &str,
    ) -> Result<ChunkReceiver, GatewayError>;
}

/// Reassembles complete lines from a streamed response body. Bodies arrive
/// as arbitrary byte chunks; a line may span several chunks and a chunk may
/// carry several lines.
#[derive(Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            lines.push(text.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Whatever remains once the body ends (a final line without newline).
    pub fn finish(self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(
                String::from_utf8_lossy(&self.buf)
                    .trim_end_matches('\r')
                    .to_string(),
            )
        }
    }
}
