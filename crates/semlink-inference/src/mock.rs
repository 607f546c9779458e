//! Mock embedding backend for deterministic testing.
//!
//! Generates deterministic embeddings from text content so similarity
//! relations are reproducible across runs, and supports per-input failure
//! injection for provider-fault tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use semlink_core::{EmbeddingBackend, Error, Result, Vector};

/// Mock embedding backend for testing.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<Vec<String>>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    /// Inputs containing any of these substrings fail with
    /// `Error::Embedding`.
    failing_inputs: HashSet<String>,
    /// Inputs containing any of these substrings get an empty vector list
    /// back, a malformed but non-erroring provider reply.
    empty_response_inputs: HashSet<String>,
    latency_ms: u64,
    fail_all: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            failing_inputs: HashSet::new(),
            empty_response_inputs: HashSet::new(),
            latency_ms: 0,
            fail_all: false,
        }
    }
}

impl MockEmbeddingBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Fail any call whose input contains this substring.
    pub fn with_failing_input(mut self, needle: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .failing_inputs
            .insert(needle.into());
        self
    }

    /// Answer any call whose input contains this substring with an empty
    /// vector list instead of an error.
    pub fn with_empty_response_for(mut self, needle: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .empty_response_inputs
            .insert(needle.into());
        self
    }

    /// Fail every call (for persistence-versus-provider fault tests).
    pub fn with_all_failing(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_all = true;
        self
    }

    /// Set simulated latency per batch.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Every batch of texts this backend was asked to embed, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of embed calls made.
    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.call_log.lock().unwrap().clear()
    }

    fn failure_for(&self, texts: &[String]) -> Option<String> {
        if self.config.fail_all {
            return Some("simulated provider outage".to_string());
        }
        for text in texts {
            for needle in &self.config.failing_inputs {
                if text.contains(needle) {
                    return Some(format!("simulated failure embedding {:?}", needle));
                }
            }
        }
        None
    }
}

impl Default for MockEmbeddingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.call_log.lock().unwrap().push(texts.to_vec());

        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }

        if let Some(reason) = self.failure_for(texts) {
            return Err(Error::Embedding(reason));
        }

        if texts.iter().any(|text| {
            self.config
                .empty_response_inputs
                .iter()
                .any(|needle| text.contains(needle))
        }) {
            return Ok(vec![]);
        }

        Ok(texts
            .iter()
            .map(|t| Vector::from(MockEmbeddingGenerator::generate(t, self.config.dimension)))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

/// Mock embedding generator with deterministic output.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Generate a deterministic embedding from text.
    ///
    /// Uses character-based hashing for reproducibility. The same text
    /// will always produce the same embedding.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];

        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }

        Self::normalize(&mut vec);
        vec
    }

    /// Generate embedding from seed (for random-like but deterministic
    /// vectors).
    pub fn generate_with_seed(seed: u64, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];
        let mut state = seed;

        // Simple LCG for deterministic pseudo-random values
        for item in vec.iter_mut() {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            *item = ((state % 1000) as f32) / 1000.0 - 0.5;
        }

        Self::normalize(&mut vec);
        vec
    }

    /// Generate a pair of embeddings with roughly the given similarity.
    pub fn generate_similar_pair(
        base_text: &str,
        dimension: usize,
        similarity: f64,
    ) -> (Vec<f32>, Vec<f32>) {
        let base = Self::generate(base_text, dimension);
        let mut similar = Self::generate_with_seed(12345, dimension);

        let alpha = similarity as f32;
        for i in 0..dimension {
            similar[i] = alpha * base[i] + (1.0 - alpha) * similar[i];
        }

        Self::normalize(&mut similar);
        (base, similar)
    }

    fn normalize(vec: &mut [f32]) {
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
    }

    /// Calculate cosine similarity between two vectors.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if mag_a > 0.0 && mag_b > 0.0 {
            dot / (mag_a * mag_b)
        } else {
            0.0
        }
    }
}
