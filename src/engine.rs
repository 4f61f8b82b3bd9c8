//! The `Engine` handle: storage, embeddings, and config bundled behind one
//! `&self`-taking API.
//!
//! Per Design Note §9 ("model as a single engine handle... lifetime is
//! `init → (many operations) → close`"), mirroring the teacher's `Storage`
//! struct, which already bundles the SQLite connections, the embedding
//! service, and the vector index behind one `&self` API so the host can
//! hold it in an `Arc` instead of an `Arc<Mutex<_>>`.

use std::path::PathBuf;

use crate::config::{self, EngineConfig};
use crate::embeddings::EmbeddingService;
use crate::error::{EngineError, Result};
use crate::storage::Storage;

/// The engine handle. `Send + Sync`: every field's interior mutability is
/// already behind its own lock, so callers can share one `Engine` (e.g. in
/// an `Arc`) across threads without an outer mutex.
pub struct Engine {
    storage: Storage,
    embeddings: EmbeddingService,
    config: EngineConfig,
    /// Single-flight guard around the first (expensive) embedding call, per
    /// §4.8's single-flight init contract. `OnceCell::get_or_try_init`
    /// resets itself to uninitialized on an `Err`, so a failed warm-up is
    /// retried by the next caller instead of being poisoned forever.
    model_ready: tokio::sync::OnceCell<()>,
}

impl Engine {
    /// Open the engine: load config, resolve the store path, open storage
    /// (applying migrations), and construct the embedding service.
    ///
    /// `db_path_override` takes precedence over `$MAMA_DB_PATH`, the legacy
    /// path, and the default path, in that order (§6).
    pub fn open(db_path_override: Option<PathBuf>) -> Result<Self> {
        let config_path = EngineConfig::default_path();
        let config = match &config_path {
            Some(p) => EngineConfig::load(p),
            None => {
                tracing::warn!("could not determine home directory; using default config");
                EngineConfig::default()
            }
        };

        let db_path = config::resolve_db_path(db_path_override).map_err(|e| {
            EngineError::Storage(crate::storage::StorageError::Init(format!(
                "could not resolve store path: {e}"
            )))
        })?;

        let storage = Storage::open(&db_path)?;
        let embeddings = EmbeddingService::new(&config.model_name, config.embedding_dim, config.cache_dir.clone());

        tracing::info!(
            "engine opened at {:?} (vector index {})",
            db_path,
            if storage.vector_index_available() { "enabled" } else { "degraded" }
        );

        Ok(Self { storage, embeddings, config, model_ready: tokio::sync::OnceCell::new() })
    }

    /// Open an ephemeral, in-memory engine, bypassing the config file and
    /// on-disk store entirely — used by tests and by callers that want a
    /// scratch engine.
    pub fn open_in_memory(config: EngineConfig) -> Result<Self> {
        let storage = Storage::open_in_memory()?;
        let embeddings = EmbeddingService::new(&config.model_name, config.embedding_dim, config.cache_dir.clone());
        Ok(Self { storage, embeddings, config, model_ready: tokio::sync::OnceCell::new() })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn embeddings(&self) -> &EmbeddingService {
        &self.embeddings
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the ANN vector-search extension loaded. When `false`, vector
    /// search is disabled and `suggest`/`search_embeddings` return empty
    /// results cleanly (Glossary: "Degraded tier").
    pub fn vector_index_available(&self) -> bool {
        self.storage.vector_index_available()
    }

    /// Single-flight warm-up of the embedding pipeline (§4.8). Concurrent
    /// callers await the same in-flight attempt rather than each paying the
    /// model-load cost; a failed attempt resets so the next call retries.
    pub(crate) async fn ensure_model_ready(&self) -> Result<()> {
        self.model_ready
            .get_or_try_init(|| async { self.embeddings.embed("warmup").map(|_| ()) })
            .await
            .map(|_| ())
            .map_err(EngineError::Embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_constructs_a_usable_engine() {
        let engine = Engine::open_in_memory(EngineConfig::default()).unwrap();
        assert_eq!(engine.config().embedding_dim, crate::DEFAULT_EMBEDDING_DIM);
    }
}
