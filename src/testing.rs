//! Deterministic fake embedding provider for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::embedding::EmbeddingProvider;

/// Embeds text as a pseudo-random but deterministic vector and counts calls.
pub struct CountingProvider {
    dims: usize,
    output_dims: usize,
    calls: AtomicUsize,
    embedded: Mutex<Vec<String>>,
    failing: HashSet<String>,
}

impl CountingProvider {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            output_dims: dims,
            calls: AtomicUsize::new(0),
            embedded: Mutex::new(Vec::new()),
            failing: HashSet::new(),
        }
    }

    /// Fail every batch that contains `text`.
    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    /// Return vectors of `n` elements while still advertising the configured dims.
    pub fn with_output_dims(mut self, n: usize) -> Self {
        self.output_dims = n;
        self
    }

    /// Number of `embed` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every text passed to `embed`, in call order.
    pub fn embedded_texts(&self) -> Vec<String> {
        self.embedded
            .lock()
            .map(|texts| texts.clone())
            .unwrap_or_default()
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        (0..self.output_dims)
            .map(|i| digest[i % digest.len()] as f32 / 255.0 + i as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    fn model_name(&self) -> &str {
        "counting-fake"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.embedded.lock() {
            seen.extend(texts.iter().cloned());
        }
        if let Some(bad) = texts.iter().find(|t| self.failing.contains(*t)) {
            bail!("simulated provider failure for {:?}", bad);
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}
