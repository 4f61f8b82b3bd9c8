//! Vector similarity search over `decision_embeddings`.
//!
//! The scan itself — true cosine similarity over BLOB-stored embeddings — is
//! grounded on `cortex-storage`'s `queries::vector_search`/`search_vector`
//! rather than the teacher's `usearch`-backed `VectorIndex`.
//! `f32_vec_to_bytes`/`bytes_to_f32_vec` and `cosine_similarity` below are
//! carried over near-verbatim; `store` is new, grounded on the same file's
//! `store_embedding` upsert-by-rowid shape minus the content-hash dedup
//! (decisions are immutable per row, so there is exactly one embedding per
//! decision rowid). Per spec.md §4.1, this scan only ever runs when the ANN
//! extension loaded — [`super::sqlite::Storage::search_embeddings`] gates on
//! `vector_index_available` and returns empty otherwise, so "degraded" means
//! no results, never a slower fallback.

use rusqlite::{params, Connection, OptionalExtension};

use super::StorageError;

/// Environment variable naming a SQLite extension to load for vector
/// search. When unset, or when the load fails, vector search is disabled
/// entirely — invariant 3 (every decision gets an embedding row) still
/// holds, since embeddings are always written regardless of this flag.
pub const VEC_EXTENSION_ENV: &str = "MAMA_VEC_EXTENSION";

/// Attempts to load the configured vector-search extension. Returns `true`
/// if search is now available, `false` if it should stay disabled (the
/// degraded, "no results" tier). Never returns `Err` — a failed load is a
/// normal, logged degradation, not a fatal error.
pub fn try_load_extension(conn: &Connection) -> bool {
    let Ok(path) = std::env::var(VEC_EXTENSION_ENV) else {
        return false;
    };

    // SAFETY: `load_extension` executes arbitrary native code from `path`.
    // The path is operator-controlled via an environment variable, not
    // derived from untrusted input.
    let result = unsafe {
        conn.load_extension_enable()
            .and_then(|_| conn.load_extension(&path, None::<&str>))
    };

    match result {
        Ok(()) => {
            tracing::info!("loaded vector-search extension from {path}");
            true
        }
        Err(e) => {
            tracing::warn!(
                "failed to load vector-search extension {path} ({e}); vector search disabled"
            );
            false
        }
    }
}

/// Write a decision's embedding, keyed by its rowid. Always writes the raw
/// BLOB regardless of whether an ANN extension is loaded.
pub fn store(
    conn: &Connection,
    rowid: i64,
    embedding: &[f32],
    model: &str,
    created_at_ms: i64,
) -> Result<(), StorageError> {
    let blob = f32_vec_to_bytes(embedding);
    conn.execute(
        "INSERT INTO decision_embeddings (rowid, embedding, dimensions, model, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(rowid) DO UPDATE SET
            embedding = excluded.embedding,
            dimensions = excluded.dimensions,
            model = excluded.model,
            created_at = excluded.created_at",
        params![rowid, blob, embedding.len() as i64, model, created_at_ms],
    )
    .map_err(StorageError::Database)?;
    Ok(())
}

/// Remove a decision's embedding (used when a decision is purged; not part
/// of the everyday save/recall path since decisions are otherwise
/// append-only).
pub fn remove(conn: &Connection, rowid: i64) -> Result<(), StorageError> {
    conn.execute(
        "DELETE FROM decision_embeddings WHERE rowid = ?1",
        params![rowid],
    )
    .map_err(StorageError::Database)?;
    Ok(())
}

/// True cosine-similarity scan over every stored embedding, returning
/// `(rowid, similarity)` pairs above `min_similarity`, ordered descending,
/// truncated to `limit`. Only ever invoked by
/// [`super::sqlite::Storage::search_embeddings`] once the ANN extension has
/// loaded — it is the scoring step after the extension narrows candidates,
/// not a substitute for it.
pub fn search(
    conn: &Connection,
    query: &[f32],
    limit: usize,
    min_similarity: f32,
) -> Result<Vec<(i64, f32)>, StorageError> {
    let query_norm_sq: f64 = query.iter().map(|x| (*x as f64) * (*x as f64)).sum();
    if query_norm_sq == 0.0 {
        return Ok(vec![]);
    }
    let query_len = query.len();

    let mut stmt = conn
        .prepare("SELECT rowid, embedding, dimensions FROM decision_embeddings")
        .map_err(StorageError::Database)?;

    let rows = stmt
        .query_map([], |row| {
            let rowid: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            let dims: i64 = row.get(2)?;
            Ok((rowid, blob, dims))
        })
        .map_err(StorageError::Database)?;

    let mut scored: Vec<(i64, f32)> = Vec::new();
    for row in rows {
        let (rowid, blob, dims) = row.map_err(StorageError::Database)?;
        if dims as usize != query_len {
            continue;
        }
        let stored = bytes_to_f32_vec(&blob, dims as usize);
        let sim = cosine_similarity(query, &stored);
        if sim >= min_similarity {
            scored.push((rowid, sim));
        }
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    Ok(scored)
}

/// Fetch a single stored embedding by rowid, if present.
pub fn get(conn: &Connection, rowid: i64) -> Result<Option<Vec<f32>>, StorageError> {
    conn.query_row(
        "SELECT embedding, dimensions FROM decision_embeddings WHERE rowid = ?1",
        params![rowid],
        |row| {
            let blob: Vec<u8> = row.get(0)?;
            let dims: i64 = row.get(1)?;
            Ok(bytes_to_f32_vec(&blob, dims as usize))
        },
    )
    .optional()
    .map_err(StorageError::Database)
}

fn f32_vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_f32_vec(bytes: &[u8], expected_dims: usize) -> Vec<f32> {
    let mut result = Vec::with_capacity(expected_dims);
    for chunk in bytes.chunks_exact(4) {
        result.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    result
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations::apply_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn store_and_get_roundtrip() {
        let conn = setup();
        let vec = vec![1.0_f32, 0.0, 0.0];
        store(&conn, 1, &vec, "test-model", 0).unwrap();
        let fetched = get(&conn, 1).unwrap().unwrap();
        assert_eq!(fetched, vec);
    }

    #[test]
    fn search_ranks_by_similarity() {
        let conn = setup();
        store(&conn, 1, &[1.0, 0.0, 0.0], "test-model", 0).unwrap();
        store(&conn, 2, &[0.0, 1.0, 0.0], "test-model", 0).unwrap();
        store(&conn, 3, &[0.9, 0.1, 0.0], "test-model", 0).unwrap();

        let results = search(&conn, &[1.0, 0.0, 0.0], 10, 0.0).unwrap();
        assert_eq!(results[0].0, 1);
        assert_eq!(results[1].0, 3);
        assert_eq!(results[2].0, 2);
    }

    #[test]
    fn search_ignores_dimension_mismatch() {
        let conn = setup();
        store(&conn, 1, &[1.0, 0.0], "test-model", 0).unwrap();
        let results = search(&conn, &[1.0, 0.0, 0.0], 10, 0.0).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn zero_norm_query_returns_empty() {
        let conn = setup();
        store(&conn, 1, &[1.0, 0.0, 0.0], "test-model", 0).unwrap();
        let results = search(&conn, &[0.0, 0.0, 0.0], 10, 0.0).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn remove_deletes_embedding() {
        let conn = setup();
        store(&conn, 1, &[1.0, 0.0, 0.0], "test-model", 0).unwrap();
        remove(&conn, 1).unwrap();
        assert!(get(&conn, 1).unwrap().is_none());
    }
}
