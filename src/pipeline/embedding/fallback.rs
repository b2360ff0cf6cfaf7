//! Ordered-fallback embedding strategy.
//!
//! Providers are tried in configuration order; the first one that
//! answers wins the call. Transient failures are retried with
//! exponential backoff before the whole call is declared unavailable.
//! Vectors are L2-normalized before they leave this module.

use std::sync::Mutex;
use std::time::Duration;

use super::http::{LocalEmbedder, RemoteEmbedder};
use super::{l2_normalize, EmbeddingError, EmbeddingModel, HashEmbedder, HASH_EMBEDDER_DIM};
use crate::config::{EmbeddingConfig, ProviderKind};

const BACKOFF_BASE_MS: u64 = 100;

/// Strategy over an ordered provider list.
pub struct FallbackEmbedder {
    providers: Vec<Box<dyn EmbeddingModel>>,
    retry_attempts: u32,
    dimension: usize,
    /// Name of the provider that served the most recent successful call.
    last_provider: Mutex<Option<String>>,
}

impl FallbackEmbedder {
    /// Build the provider chain from config. With no providers
    /// configured the deterministic hash embedder serves alone, which
    /// keeps offline runs and tests reproducible.
    pub fn from_config(config: &EmbeddingConfig, dimension: usize) -> Result<Self, EmbeddingError> {
        let mut providers: Vec<Box<dyn EmbeddingModel>> = Vec::new();
        for provider in &config.providers {
            match provider.kind {
                ProviderKind::Remote => {
                    providers.push(Box::new(RemoteEmbedder::from_config(provider, dimension)?))
                }
                ProviderKind::Local => {
                    providers.push(Box::new(LocalEmbedder::from_config(provider, dimension)?))
                }
            }
        }
        if providers.is_empty() {
            providers.push(Box::new(HashEmbedder::new()));
        }
        Ok(Self {
            providers,
            retry_attempts: config.retry_attempts.max(1),
            dimension,
            last_provider: Mutex::new(None),
        })
    }

    /// Chain with only the deterministic hash embedder.
    pub fn deterministic() -> Self {
        Self {
            providers: vec![Box::new(HashEmbedder::new())],
            retry_attempts: 1,
            dimension: HASH_EMBEDDER_DIM,
            last_provider: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub fn from_providers(providers: Vec<Box<dyn EmbeddingModel>>, dimension: usize) -> Self {
        Self {
            providers,
            retry_attempts: 2,
            dimension,
            last_provider: Mutex::new(None),
        }
    }

    /// Provider that served the last successful call, if any.
    pub fn provider_used(&self) -> Option<String> {
        self.last_provider.lock().ok().and_then(|guard| guard.clone())
    }

    fn try_chain(&self, texts: &[&str]) -> Result<(String, Vec<Vec<f32>>), EmbeddingError> {
        let mut last_error = EmbeddingError::Unavailable;
        for provider in &self.providers {
            match provider.embed_batch(texts) {
                Ok(vectors) => return Ok((provider.name().to_string(), vectors)),
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "Embedding provider failed, trying next");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

impl EmbeddingModel for FallbackEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0;
        loop {
            match self.try_chain(texts) {
                Ok((provider, mut vectors)) => {
                    for vector in &mut vectors {
                        if vector.len() != self.dimension {
                            return Err(EmbeddingError::DimensionMismatch {
                                expected: self.dimension,
                                got: vector.len(),
                            });
                        }
                        l2_normalize(vector);
                    }
                    if let Ok(mut guard) = self.last_provider.lock() {
                        *guard = Some(provider);
                    }
                    return Ok(vectors);
                }
                Err(EmbeddingError::DimensionMismatch { expected, got }) => {
                    // Misconfiguration, not a transient fault.
                    return Err(EmbeddingError::DimensionMismatch { expected, got });
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry_attempts {
                        tracing::error!(attempts = attempt, error = %e, "All embedding providers exhausted");
                        return Err(EmbeddingError::Unavailable);
                    }
                    let backoff = BACKOFF_BASE_MS * (1 << (attempt - 1).min(6));
                    std::thread::sleep(Duration::from_millis(backoff));
                }
            }
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    impl EmbeddingModel for FailingProvider {
        fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Provider {
                provider: "failing".into(),
                reason: "connection refused".into(),
            })
        }
        fn dimension(&self) -> usize {
            384
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    struct WrongDimProvider;

    impl EmbeddingModel for WrongDimProvider {
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0; 16]).collect())
        }
        fn dimension(&self) -> usize {
            16
        }
        fn name(&self) -> &str {
            "wrong_dim"
        }
    }

    #[test]
    fn falls_back_to_healthy_provider() {
        let embedder = FallbackEmbedder::from_providers(
            vec![Box::new(FailingProvider), Box::new(HashEmbedder::new())],
            HASH_EMBEDDER_DIM,
        );
        let vectors = embedder.embed_batch(&["obra civil"]).unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(embedder.provider_used().as_deref(), Some("hash"));
    }

    #[test]
    fn all_providers_failing_is_unavailable() {
        let embedder = FallbackEmbedder::from_providers(vec![Box::new(FailingProvider)], 384);
        let result = embedder.embed_batch(&["texto"]);
        assert!(matches!(result, Err(EmbeddingError::Unavailable)));
    }

    #[test]
    fn dimension_mismatch_is_not_retried() {
        let embedder = FallbackEmbedder::from_providers(vec![Box::new(WrongDimProvider)], 384);
        let result = embedder.embed_batch(&["texto"]);
        assert!(matches!(result, Err(EmbeddingError::DimensionMismatch { .. })));
    }

    #[test]
    fn vectors_are_normalized() {
        let embedder = FallbackEmbedder::deterministic();
        let vectors = embedder.embed_batch(&["garantía", "anticipo"]).unwrap();
        for vector in vectors {
            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 0.01);
        }
    }

    #[test]
    fn empty_config_uses_hash_embedder() {
        let embedder =
            FallbackEmbedder::from_config(&EmbeddingConfig::default(), HASH_EMBEDDER_DIM).unwrap();
        embedder.embed_batch(&["texto"]).unwrap();
        assert_eq!(embedder.provider_used().as_deref(), Some("hash"));
    }
}
