//! The execution orchestrator: validates and assembles the prompt, resolves
//! a backend, drives the blocking or streaming dispatch path, and records an
//! execution ledger entry for every dispatch — success or failure.

mod ledger;
pub mod types;

pub use ledger::ExecutionLedger;
pub use types::{ExecutionRecord, ExecutionState, LogAction, LogEntry};

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tokio::sync::{RwLock, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{BackendDescriptor, BackendRegistry, BackendSelector, Protocol};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::probe::{ProbeResult, Prober};
use crate::protocol::{
    CHUNK_CHANNEL_CAPACITY, ProtocolAdapter, ollama::OllamaAdapter, openai::OpenAiAdapter,
};
use crate::template::{self, ValidationReport, Variable};

/// Legal state transitions of one execution. Same-state is a no-op; terminal
/// states admit nothing.
pub fn can_transition(from: ExecutionState, to: ExecutionState) -> bool {
    if from == to {
        return true;
    }
    match from {
        ExecutionState::Validating => {
            matches!(to, ExecutionState::Assembling | ExecutionState::Failed)
        }
        ExecutionState::Assembling => {
            matches!(to, ExecutionState::Dispatching | ExecutionState::Failed)
        }
        ExecutionState::Dispatching => {
            matches!(to, ExecutionState::Succeeded | ExecutionState::Failed)
        }
        ExecutionState::Succeeded | ExecutionState::Failed => false,
    }
}

fn advance(current: &mut ExecutionState, to: ExecutionState) {
    debug_assert!(
        can_transition(*current, to),
        "illegal execution state transition {:?} -> {:?}",
        current,
        to
    );
    *current = to;
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub template_id: String,
    pub template_text: String,
    pub variables: Vec<Variable>,
    pub file_texts: Vec<String>,
    pub backend: Option<BackendSelector>,
    pub model: Option<String>,
    /// Identity of the caller, used to resolve user-scoped backends.
    pub user_id: Option<String>,
}

/// Live chunk sequence of a streaming execution. The finished record lands
/// in the ledger once the stream terminates; dropping this stream mid-flight
/// cancels the upstream backend call.
#[derive(Debug)]
pub struct ExecutionStream {
    pub execution_id: String,
    chunks: ReceiverStream<String>,
}

impl tokio_stream::Stream for ExecutionStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        Pin::new(&mut self.chunks).poll_next(cx)
    }
}

/// The prompt execution gateway. Cheap to share behind an `Arc`; every
/// execution is independent apart from the read-mostly registry and the
/// append-only-per-key ledger.
pub struct PromptGateway {
    registry: RwLock<BackendRegistry>,
    ledger: Arc<ExecutionLedger>,
    ollama: OllamaAdapter,
    openai: OpenAiAdapter,
    prober: Prober,
}

impl PromptGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        let client = reqwest::Client::new();
        let timeout = config.gateway.request_timeout_secs;
        Self {
            registry: RwLock::new(BackendRegistry::new(config.system_backends())),
            ledger: Arc::new(ExecutionLedger::default()),
            ollama: OllamaAdapter::new(client.clone(), timeout),
            openai: OpenAiAdapter::new(client.clone(), timeout),
            prober: Prober::new(client, config.gateway.probe_timeout_secs),
        }
    }

    fn adapter(&self, protocol: Protocol) -> &dyn ProtocolAdapter {
        match protocol {
            Protocol::Ollama => &self.ollama,
            Protocol::OpenAiCompatible => &self.openai,
        }
    }

    /// Replace the system backends with the given configuration. User
    /// backends survive the reload. The swap is atomic: concurrent readers
    /// see either the old or the new set.
    pub async fn reload_backends(&self, config: &GatewayConfig) {
        let mut registry = self.registry.write().await;
        let user = registry.user_backends().to_vec();
        let mut next = BackendRegistry::new(config.system_backends());
        next.set_user_backends(user);
        *registry = next;
        info!(
            "backend registry reloaded: {} system backend(s)",
            registry.system_backends().len()
        );
    }

    /// Hand over the user-scoped backends managed by the (out-of-scope)
    /// preferences surface.
    pub async fn set_user_backends(&self, backends: Vec<BackendDescriptor>) {
        self.registry.write().await.set_user_backends(backends);
    }

    pub async fn list_backends(&self, caller: Option<&str>) -> Vec<BackendDescriptor> {
        self.registry.read().await.visible_to(caller)
    }

    pub fn validate(&self, template_text: &str, variables: &[Variable]) -> ValidationReport {
        template::validate(template_text, variables)
    }

    /// Substitute variables and inline documents, producing the prompt text
    /// that would be sent plus the assembly log entries.
    pub fn build_final_prompt(
        &self,
        template_text: &str,
        variables: &[Variable],
        file_texts: &[String],
    ) -> (String, Vec<LogEntry>) {
        let mut logs = Vec::new();

        let substituted = template::substitute(template_text, variables);
        let names = variables
            .iter()
            .map(|v| {
                if v.from_catalog {
                    format!("{} (catalog)", v.name)
                } else {
                    v.name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        logs.push(LogEntry::now(
            LogAction::VariableSubstitution,
            format!("substituted {} variable(s): {}", variables.len(), names),
            true,
        ));

        if !file_texts.is_empty() {
            logs.push(LogEntry::now(
                LogAction::FileProcessing,
                format!("inlined {} document(s)", file_texts.len()),
                true,
            ));
        }
        let final_prompt = template::inline_documents(&substituted, file_texts);

        (final_prompt, logs)
    }

    pub async fn get_execution(&self, execution_id: &str) -> Option<ExecutionRecord> {
        self.ledger.get(execution_id).await
    }

    pub async fn probe_backend(&self, backend: &BackendDescriptor) -> ProbeResult {
        self.prober.probe(backend).await
    }

    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    async fn resolve_backend(
        &self,
        request: &ExecutionRequest,
    ) -> Result<BackendDescriptor, GatewayError> {
        let registry = self.registry.read().await;
        registry
            .resolve(request.backend.as_ref(), request.user_id.as_deref())
            .map(|b| b.clone())
    }

    /// Run one blocking execution. Validation and backend-resolution failures
    /// are returned as errors before anything is recorded; once dispatch
    /// begins, backend failures terminate the record as `Failed` with the
    /// failure log entry instead of erroring out.
    pub async fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionRecord, GatewayError> {
        let started = Instant::now();
        let execution_id = Uuid::new_v4().to_string();
        let mut state = ExecutionState::Validating;

        let report = template::validate(&request.template_text, &request.variables);
        if !report.is_valid {
            warn!(
                "execution {} rejected: missing variables {:?}",
                execution_id, report.missing
            );
            return Err(GatewayError::Validation {
                missing: report.missing,
            });
        }
        advance(&mut state, ExecutionState::Assembling);

        let (final_prompt, mut logs) = self.build_final_prompt(
            &request.template_text,
            &request.variables,
            &request.file_texts,
        );
        advance(&mut state, ExecutionState::Dispatching);

        let backend = self.resolve_backend(&request).await?;
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| backend.default_model.clone());

        logs.push(LogEntry::now(
            LogAction::BackendCall,
            format!(
                "calling {} ({}) with model {}",
                backend.id, backend.base_url, model
            ),
            true,
        ));
        info!(
            "execution {}: dispatching to backend {} (model {})",
            execution_id, backend.id, model
        );

        let adapter = self.adapter(backend.protocol);
        let result_text = match adapter.complete(&backend, &model, &final_prompt).await {
            Ok(result) => {
                logs.push(LogEntry::now(
                    LogAction::BackendResponse,
                    format!("response received in {:.2}s", started.elapsed().as_secs_f64()),
                    true,
                ));
                advance(&mut state, ExecutionState::Succeeded);
                result.text
            }
            Err(e) => {
                warn!("execution {} failed: {}", execution_id, e);
                logs.push(LogEntry::now(LogAction::BackendResponse, e.to_string(), false));
                advance(&mut state, ExecutionState::Failed);
                format!("Error: {e}")
            }
        };

        let record = ExecutionRecord {
            execution_id,
            template_id: request.template_id,
            final_prompt,
            result_text,
            logs,
            execution_time: started.elapsed(),
            state,
        };
        self.ledger.put(record.clone()).await;
        Ok(record)
    }

    /// Run one streaming execution. Returns once the backend has accepted
    /// the request; chunks arrive incrementally, unbuffered beyond a small
    /// bounded channel. Failures after the stream opens terminate it and are
    /// recorded, never raised. If the caller drops the stream, the upstream
    /// connection is released promptly.
    pub async fn execute_streaming(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionStream, GatewayError> {
        let started = Instant::now();
        let execution_id = Uuid::new_v4().to_string();
        let mut state = ExecutionState::Validating;

        let report = template::validate(&request.template_text, &request.variables);
        if !report.is_valid {
            warn!(
                "execution {} rejected: missing variables {:?}",
                execution_id, report.missing
            );
            return Err(GatewayError::Validation {
                missing: report.missing,
            });
        }
        advance(&mut state, ExecutionState::Assembling);

        let (final_prompt, mut logs) = self.build_final_prompt(
            &request.template_text,
            &request.variables,
            &request.file_texts,
        );
        advance(&mut state, ExecutionState::Dispatching);

        let backend = self.resolve_backend(&request).await?;
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| backend.default_model.clone());

        logs.push(LogEntry::now(
            LogAction::BackendCall,
            format!(
                "calling {} ({}) with model {}, streaming",
                backend.id, backend.base_url, model
            ),
            true,
        ));
        info!(
            "execution {}: streaming from backend {} (model {})",
            execution_id, backend.id, model
        );

        let adapter = self.adapter(backend.protocol);
        let mut upstream = match adapter
            .complete_streaming(&backend, &model, &final_prompt)
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                // The dispatch was attempted, so it must be on the record
                // even though the caller gets a typed error.
                warn!("execution {} failed to open stream: {}", execution_id, e);
                logs.push(LogEntry::now(LogAction::BackendResponse, e.to_string(), false));
                advance(&mut state, ExecutionState::Failed);
                self.ledger
                    .put(ExecutionRecord {
                        execution_id,
                        template_id: request.template_id,
                        final_prompt,
                        result_text: format!("Error: {e}"),
                        logs,
                        execution_time: started.elapsed(),
                        state,
                    })
                    .await;
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel::<String>(CHUNK_CHANNEL_CAPACITY);
        let ledger = Arc::clone(&self.ledger);
        let exec_id = execution_id.clone();
        let template_id = request.template_id.clone();

        tokio::spawn(async move {
            let mut full_text = String::new();
            let mut failure: Option<String> = None;

            while let Some(item) = upstream.recv().await {
                match item {
                    Ok(chunk) => {
                        full_text.push_str(&chunk.text);
                        if tx.send(chunk.text).await.is_err() {
                            info!("execution {}: caller disconnected, aborting", exec_id);
                            failure = Some("caller disconnected mid-stream".to_string());
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("execution {}: stream failed: {}", exec_id, e);
                        failure = Some(e.to_string());
                        break;
                    }
                }
            }
            // Dropping `upstream` here closes the outbound connection if the
            // backend is still producing.
            drop(upstream);

            let result_text = match &failure {
                None => {
                    logs.push(LogEntry::now(
                        LogAction::BackendResponse,
                        format!(
                            "stream completed in {:.2}s",
                            started.elapsed().as_secs_f64()
                        ),
                        true,
                    ));
                    advance(&mut state, ExecutionState::Succeeded);
                    full_text
                }
                Some(detail) => {
                    logs.push(LogEntry::now(LogAction::BackendResponse, detail.clone(), false));
                    advance(&mut state, ExecutionState::Failed);
                    format!("Error: {detail}")
                }
            };

            ledger
                .put(ExecutionRecord {
                    execution_id: exec_id,
                    template_id,
                    final_prompt,
                    result_text,
                    logs,
                    execution_time: started.elapsed(),
                    state,
                })
                .await;
        });

        Ok(ExecutionStream {
            execution_id,
            chunks: ReceiverStream::new(rx),
        })
    }
}

#[cfg(test)]
mod tests;
