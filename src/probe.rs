//! On-demand connectivity and model-discovery checks against a backend.
//! Used by the server-management surfaces, never inside the execution path;
//! probes carry their own short timeout.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendDescriptor, Protocol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Success,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub backend_id: String,
    pub status: ProbeStatus,
    pub message: String,
    pub response_time: Duration,
    pub available_models: Vec<String>,
}

#[derive(Clone)]
pub struct Prober {
    client: Client,
    timeout: Duration,
}

impl Prober {
    pub fn new(client: Client, timeout_secs: u64) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub async fn probe(&self, backend: &BackendDescriptor) -> ProbeResult {
        let started = Instant::now();
        let outcome = match backend.protocol {
            Protocol::Ollama => self.probe_ollama(backend).await,
            Protocol::OpenAiCompatible => self.probe_openai(backend).await,
        };

        match outcome {
            Ok(models) => ProbeResult {
                backend_id: backend.id.clone(),
                status: ProbeStatus::Success,
                message: "connection ok".to_string(),
                response_time: started.elapsed(),
                available_models: models,
            },
            Err((status, message)) => ProbeResult {
                backend_id: backend.id.clone(),
                status,
                message,
                response_time: started.elapsed(),
                available_models: Vec::new(),
            },
        }
    }

    /// Probe every backend concurrently, preserving input order.
    pub async fn probe_all(&self, backends: &[BackendDescriptor]) -> Vec<ProbeResult> {
        let mut set = tokio::task::JoinSet::new();
        for (index, backend) in backends.iter().cloned().enumerate() {
            let prober = self.clone();
            set.spawn(async move { (index, prober.probe(&backend).await) });
        }

        let mut results: Vec<Option<ProbeResult>> = (0..backends.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            if let Ok((index, result)) = joined {
                results[index] = Some(result);
            }
        }
        results.into_iter().flatten().collect()
    }

    async fn probe_ollama(
        &self,
        backend: &BackendDescriptor,
    ) -> Result<Vec<String>, (ProbeStatus, String)> {
        #[derive(Deserialize)]
        struct Tags {
            #[serde(default)]
            models: Vec<TagModel>,
        }
        #[derive(Deserialize)]
        struct TagModel {
            name: String,
        }

        let url = format!("{}/api/tags", backend.trimmed_base_url());
        let res = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify)?;
        if !res.status().is_success() {
            return Err((
                ProbeStatus::Error,
                format!("HTTP {}", res.status().as_u16()),
            ));
        }
        let tags: Tags = res.json().await.map_err(classify)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn probe_openai(
        &self,
        backend: &BackendDescriptor,
    ) -> Result<Vec<String>, (ProbeStatus, String)> {
        #[derive(Deserialize)]
        struct Models {
            #[serde(default)]
            data: Vec<ModelEntry>,
        }
        #[derive(Deserialize)]
        struct ModelEntry {
            id: String,
        }

        let url = format!("{}/v1/models", backend.trimmed_base_url());
        let mut request = self.client.get(&url).timeout(self.timeout);
        if let Some(key) = &backend.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let res = request.send().await.map_err(classify)?;
        if !res.status().is_success() {
            return Err((
                ProbeStatus::Error,
                format!("HTTP {}", res.status().as_u16()),
            ));
        }
        // A reachable endpoint with an unparseable listing still counts as
        // up; fall back to the configured default model.
        match res.json::<Models>().await {
            Ok(models) => Ok(models.data.into_iter().map(|m| m.id).collect()),
            Err(_) => Ok(vec![backend.default_model.clone()]),
        }
    }
}

fn classify(err: reqwest::Error) -> (ProbeStatus, String) {
    if err.is_timeout() {
        (ProbeStatus::Timeout, "connection timed out".to_string())
    } else {
        (ProbeStatus::Error, format!("connection failed: {err}"))
    }
}
