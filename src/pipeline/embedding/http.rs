//! HTTP embedding backends.
//!
//! Two wire formats are supported: OpenAI-compatible `/v1/embeddings`
//! (remote, API-key authenticated) and Ollama `/api/embed` (local).
//! Both use blocking clients with the per-provider timeout from config;
//! the orchestrator already runs stages off the request path.

use serde::{Deserialize, Serialize};

use super::{EmbeddingError, EmbeddingModel};
use crate::config::ProviderConfig;

const DEFAULT_REMOTE_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

fn build_client(timeout_ms: u64, provider: &str) -> Result<reqwest::blocking::Client, EmbeddingError> {
    reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| EmbeddingError::Provider {
            provider: provider.to_string(),
            reason: format!("client init: {e}"),
        })
}

// ── Remote (OpenAI-compatible) ─────────────────────────────

#[derive(Serialize)]
struct RemoteRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct RemoteResponse {
    data: Vec<RemoteVector>,
}

#[derive(Deserialize)]
struct RemoteVector {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI-compatible embeddings endpoint.
pub struct RemoteEmbedder {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    dimension: usize,
}

impl RemoteEmbedder {
    pub fn from_config(config: &ProviderConfig, dimension: usize) -> Result<Self, EmbeddingError> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_REMOTE_ENDPOINT.to_string());
        Ok(Self {
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            client: build_client(config.timeout_ms, "remote")?,
            dimension,
        })
    }
}

impl EmbeddingModel for RemoteEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let fail = |reason: String| EmbeddingError::Provider {
            provider: "remote".to_string(),
            reason,
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&RemoteRequest {
                model: &self.model,
                input: texts,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| fail(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fail(format!("HTTP {}", response.status())));
        }

        let body: RemoteResponse = response.json().map_err(|e| fail(e.to_string()))?;
        if body.data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                provider: "remote".to_string(),
                expected: texts.len(),
                got: body.data.len(),
            });
        }

        // The API may reorder; restore input order by index.
        let mut ordered: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];
        for item in body.data {
            if item.index >= ordered.len() {
                return Err(fail(format!("out-of-range index {}", item.index)));
            }
            ordered[item.index] = item.embedding;
        }
        Ok(ordered)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "remote"
    }
}

// ── Local (Ollama) ─────────────────────────────────────────

#[derive(Serialize)]
struct LocalRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct LocalResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama `/api/embed` endpoint on a local instance.
pub struct LocalEmbedder {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    dimension: usize,
}

impl LocalEmbedder {
    pub fn from_config(config: &ProviderConfig, dimension: usize) -> Result<Self, EmbeddingError> {
        let endpoint = config.endpoint.clone().ok_or_else(|| EmbeddingError::Provider {
            provider: "local".to_string(),
            reason: "missing endpoint".to_string(),
        })?;
        Ok(Self {
            base_url: endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client: build_client(config.timeout_ms, "local")?,
            dimension,
        })
    }
}

impl EmbeddingModel for LocalEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let fail = |reason: String| EmbeddingError::Provider {
            provider: "local".to_string(),
            reason,
        };

        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&LocalRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .map_err(|e| fail(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fail(format!("HTTP {}", response.status())));
        }

        let body: LocalResponse = response.json().map_err(|e| fail(e.to_string()))?;
        if body.embeddings.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                provider: "local".to_string(),
                expected: texts.len(),
                got: body.embeddings.len(),
            });
        }
        Ok(body.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "local"
    }
}
