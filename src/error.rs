use thiserror::Error;

/// Failure taxonomy of the execution gateway.
///
/// `Validation` and `BackendNotFound` are raised before anything touches the
/// network. Everything else describes what a backend did (or failed to do);
/// the orchestrator folds those into the execution log rather than letting
/// them escape a running execution.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing required variables: {}", missing.join(", "))]
    Validation { missing: Vec<String> },

    #[error("backend not found: {selector}")]
    BackendNotFound { selector: String },

    #[error("backend returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("backend call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("could not reach backend: {0}")]
    Connect(#[source] reqwest::Error),

    /// Not produced by the built-in adapters, which skip malformed stream
    /// lines after delivering what parsed. Reserved for embedding callers
    /// that layer stricter parsing on the chunk stream.
    #[error("malformed stream chunk: {0}")]
    MalformedChunk(String),
}

impl GatewayError {
    /// Classify a transport-level reqwest failure. Non-2xx statuses never
    /// reach this; adapters turn those into `Backend` themselves.
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout {
                seconds: timeout_secs,
            }
        } else {
            GatewayError::Connect(err)
        }
    }

    /// Error bodies are surfaced verbatim but capped so a misbehaving backend
    /// cannot flood the execution log.
    pub(crate) fn excerpt(body: &str) -> String {
        const MAX_EXCERPT: usize = 512;
        if body.len() <= MAX_EXCERPT {
            return body.to_string();
        }
        let mut end = MAX_EXCERPT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}
