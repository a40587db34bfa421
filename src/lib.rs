//! Prompt execution gateway.
//!
//! Takes a prompt template with `{name}` placeholders, validates and fills in
//! variables, inlines externally-extracted document text, dispatches the
//! assembled prompt to one of several configured LLM backends (Ollama-style
//! or OpenAI-compatible), blocking or streaming, and keeps a replayable audit
//! record of every execution.
//!
//! ```no_run
//! use promptdeck::{ExecutionRequest, GatewayConfig, PromptGateway, Variable};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = GatewayConfig::from_toml_str(
//!     r#"
//! [[backends]]
//! id = "local"
//! protocol = "ollama"
//! base_url = "http://localhost:11434"
//! default_model = "llama3"
//! "#,
//! )?;
//! let gateway = PromptGateway::new(&config);
//!
//! let record = gateway
//!     .execute(ExecutionRequest {
//!         template_id: "greeting".to_string(),
//!         template_text: "Hello {name}".to_string(),
//!         variables: vec![Variable::new("name", "Acme")],
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{}", record.result_text);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod probe;
pub mod protocol;
pub mod template;

pub use backend::{BackendDescriptor, BackendRegistry, BackendSelector, Protocol, Scope};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use execution::{
    ExecutionLedger, ExecutionRecord, ExecutionRequest, ExecutionState, ExecutionStream, LogAction,
    LogEntry, PromptGateway, can_transition,
};
pub use probe::{ProbeResult, ProbeStatus, Prober};
pub use protocol::{CompletionChunk, CompletionResult, ProtocolAdapter};
pub use template::{ValidationReport, Variable};
