//! Local text embeddings with a bounded query cache.
//!
//! Follows the teacher's `embeddings::local` almost verbatim for the model
//! lifecycle (lazily initialized, cache directory resolved the same way,
//! `FASTEMBED_CACHE_PATH` taking precedence), generalized in two ways the
//! spec requires and the teacher's process-global `OnceLock` doesn't
//! support: the model can be reset when `EngineConfig.model_name` changes
//! (a `Mutex<Option<ModelState>>` swapped in place, rather than a
//! `OnceLock` that's fixed for the process), and the LRU query cache
//! (teacher: a field on `Storage`) is pulled out into its own service so
//! both `embed` and `embed_enriched` share it.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Mutex;

use lru::LruCache;

/// Errors from the embedding pipeline.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    #[error("model initialization failed: {0}")]
    ModelInit(String),
    #[error("embedding generation failed: {0}")]
    EmbeddingFailed(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Maximum input length before truncation, mirroring the teacher's
/// `MAX_TEXT_LENGTH` guard against pathologically long decisions.
pub const MAX_TEXT_LENGTH: usize = 8192;

const QUERY_CACHE_CAPACITY: usize = 100;

#[cfg(feature = "embeddings")]
struct ModelState {
    model: fastembed::TextEmbedding,
}

/// Generates and caches text embeddings for decisions and queries.
pub struct EmbeddingService {
    model_name: Mutex<String>,
    dimensions: usize,
    cache_dir: PathBuf,
    #[cfg(feature = "embeddings")]
    pipeline: Mutex<Option<ModelState>>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingService {
    pub fn new(model_name: &str, dimensions: usize, cache_dir: Option<PathBuf>) -> Self {
        Self {
            model_name: Mutex::new(model_name.to_string()),
            dimensions,
            cache_dir: cache_dir.unwrap_or_else(default_cache_dir),
            #[cfg(feature = "embeddings")]
            pipeline: Mutex::new(None),
            // SAFETY: 100 is non-zero.
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_CAPACITY).expect("100 is non-zero"),
            )),
        }
    }

    pub fn model_name(&self) -> String {
        self.model_name.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Point the service at a new model, discarding any cached pipeline and
    /// every cached query embedding (a different model produces vectors
    /// that aren't comparable to the old ones).
    pub fn set_model(&self, model_name: &str) {
        if let Ok(mut name) = self.model_name.lock() {
            if *name == model_name {
                return;
            }
            *name = model_name.to_string();
        }
        #[cfg(feature = "embeddings")]
        if let Ok(mut pipeline) = self.pipeline.lock() {
            *pipeline = None;
        }
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.clear();
        }
    }

    /// Embed a single piece of text, unit-normalized, using the cache.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".into()));
        }

        let key = cache_key(text);
        if let Some(hit) = self.query_cache.lock().ok().and_then(|mut c| c.get(&key).cloned()) {
            return Ok(hit);
        }

        let truncated = if text.len() > MAX_TEXT_LENGTH {
            &text[..MAX_TEXT_LENGTH]
        } else {
            text
        };

        let vector = self.embed_uncached(truncated)?;

        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(key, vector.clone());
        }

        Ok(vector)
    }

    /// Embed the concatenation of a decision's topic, decision text, and
    /// reasoning — composed the way the teacher's `embed_batch` joins
    /// multiple pieces of text, but concatenated into one embedding call
    /// rather than returned as separate vectors, since recall scores a
    /// single combined representation per decision.
    pub fn embed_enriched(&self, topic: &str, decision: &str, reasoning: Option<&str>) -> Result<Vec<f32>, EmbeddingError> {
        let mut combined = format!("{topic}\n{decision}");
        if let Some(r) = reasoning {
            combined.push('\n');
            combined.push_str(r);
        }
        self.embed(&combined)
    }

    #[cfg(feature = "embeddings")]
    fn embed_uncached(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let mut pipeline = self
            .pipeline
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("pipeline lock poisoned: {e}")))?;

        if pipeline.is_none() {
            std::fs::create_dir_all(&self.cache_dir).ok();
            let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
                .with_show_download_progress(false)
                .with_cache_dir(self.cache_dir.clone());
            let model = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;
            *pipeline = Some(ModelState { model });
        }

        let state = pipeline.as_mut().expect("just initialized above");
        let raw = state
            .model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
        let vector = raw
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("no embedding generated".into()))?;

        Ok(truncate_and_normalize(vector, self.dimensions))
    }

    /// Deterministic fallback embedding used when the `embeddings` feature
    /// (and its `fastembed`/ONNX dependency) is disabled. Not semantically
    /// meaningful beyond exact and near-exact text matches — good enough to
    /// keep the storage and scoring layers exercised without the model
    /// download, never advertised as a substitute for the real pipeline.
    #[cfg(not(feature = "embeddings"))]
    fn embed_uncached(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(hash_embedding(text, self.dimensions))
    }
}

fn truncate_and_normalize(mut vector: Vec<f32>, dimensions: usize) -> Vec<f32> {
    if vector.len() > dimensions {
        vector.truncate(dimensions);
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

#[cfg(not(feature = "embeddings"))]
fn hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut vector = vec![0.0_f32; dimensions];
    for (i, word) in text.split_whitespace().enumerate() {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        i.hash(&mut hasher);
        let h = hasher.finish();
        let idx = (h as usize) % dimensions;
        let sign = if h & 1 == 0 { 1.0 } else { -1.0 };
        vector[idx] += sign;
    }
    truncate_and_normalize(vector, dimensions)
}

fn cache_key(text: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

fn default_cache_dir() -> PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return PathBuf::from(path);
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "mama", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }
    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs.home_dir().join(".cache/mama/fastembed");
    }
    PathBuf::from(".fastembed_cache")
}

/// Cosine similarity between two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}
