//! Gateway configuration. Parsed from TOML, constructed explicitly and
//! passed into [`crate::PromptGateway::new`]; reloads go through
//! [`crate::PromptGateway::reload_backends`] which swaps the registry
//! atomically.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::backend::{BackendDescriptor, Protocol, Scope};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Timeout for execution calls. Generation can take minutes, so this is
    /// deliberately much longer than the probe timeout.
    pub request_timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }
}

/// One `[[backends]]` table. Config-file backends are always System scope.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendEntry {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub protocol: Protocol,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub default_model: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub backends: Vec<BackendEntry>,
}

impl GatewayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid gateway configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading gateway config {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// System backend descriptors in configuration order. The first entry is
    /// the default backend when a request carries no selector.
    pub fn system_backends(&self) -> Vec<BackendDescriptor> {
        self.backends
            .iter()
            .map(|entry| BackendDescriptor {
                id: entry.id.clone(),
                display_name: entry.display_name.clone().unwrap_or_else(|| entry.id.clone()),
                protocol: entry.protocol,
                base_url: entry.base_url.clone(),
                api_key: entry.api_key.clone(),
                default_model: entry.default_model.clone(),
                scope: Scope::System,
            })
            .collect()
    }
}
