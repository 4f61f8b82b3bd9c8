//! SQLite-backed storage adapter.
//!
//! Shaped directly on the teacher's `Storage` in `storage/sqlite.rs`: a
//! writer/reader connection pair behind separate `Mutex`es so `&self`
//! methods are `Send + Sync` and the host can hold the whole engine in an
//! `Arc` without an outer lock, the same `configure_connection` PRAGMA
//! block, and the same owner-only Unix permission restriction on the
//! database directory and file. Decision/edge CRUD replaces the teacher's
//! `KnowledgeNode` ingest/recall surface; the shape of "compute the
//! embedding before opening the transaction, then do everything else in one
//! `Connection::transaction()` closure" is carried over unchanged.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::decisions::model::{Decision, DecisionEdge, Outcome, RelationshipType};

use super::vector;

/// Storage-layer errors.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("decision not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("initialization error: {0}")]
    Init(String),
    #[error("migration error: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// SQLite storage adapter: connections, migrations, and decision/edge CRUD.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    vector_index_available: bool,
}

impl Storage {
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (creating if necessary) the database at `path`, applying
    /// migrations and attempting to load a vector-search extension.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
            }
        }

        let writer_conn = Connection::open(path)?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
        }

        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;
        let vector_index_available = vector::try_load_extension(&writer_conn);

        let reader_conn = Connection::open(path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            vector_index_available,
        })
    }

    /// Open an in-memory database, for tests and ephemeral use. Writer and
    /// reader share the same named, shared-cache memory database (plain
    /// `:memory:` is per-connection and the reader would see an empty db),
    /// so the writer connection must stay open for the `Storage`'s lifetime
    /// to keep the backing database alive.
    pub fn open_in_memory() -> Result<Self> {
        use rusqlite::OpenFlags;

        let uri = format!(
            "file:mama-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4()
        );
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let writer_conn = Connection::open_with_flags(&uri, flags)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;
        let vector_index_available = vector::try_load_extension(&writer_conn);

        let reader_conn = Connection::open_with_flags(&uri, flags)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            vector_index_available,
        })
    }

    /// Whether the ANN vector-search extension loaded. When `false`,
    /// `search_embeddings` always returns empty (the degraded tier).
    pub fn vector_index_available(&self) -> bool {
        self.vector_index_available
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Init("writer connection lock poisoned".into()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Init("reader connection lock poisoned".into()))
    }

    /// Insert a new decision row plus its embedding, and — if `supersedes`
    /// is set — flip the previous head's `superseded_by` pointer, all in
    /// one transaction.
    pub fn insert_decision(&self, decision: &Decision, embedding: Option<&[f32]>, model: &str) -> Result<()> {
        let mut conn = self.writer()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO decisions (
                id, topic, decision, reasoning, confidence, outcome, failure_reason,
                limitation, duration_days, evidence, alternatives, risks, supersedes,
                superseded_by, refined_from, created_at, updated_at, usage_count,
                usage_success, usage_failure, time_saved, needs_validation,
                validation_attempts, last_validated_at, trust_context
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
            )",
            params![
                decision.id,
                decision.topic,
                decision.decision,
                decision.reasoning,
                decision.confidence,
                decision.outcome.map(|o| o.as_str()),
                decision.failure_reason,
                decision.limitation,
                decision.duration_days,
                decision.evidence,
                decision.alternatives,
                decision.risks,
                decision.supersedes,
                decision.superseded_by,
                serde_json::to_string(&decision.refined_from).unwrap_or_else(|_| "[]".into()),
                decision.created_at.timestamp_millis(),
                decision.updated_at.timestamp_millis(),
                decision.usage_count,
                decision.usage_success,
                decision.usage_failure,
                decision.time_saved,
                decision.needs_validation,
                decision.validation_attempts,
                decision.last_validated_at.map(|t| t.timestamp_millis()),
                decision.trust_context,
            ],
        )?;

        if let Some(prev_id) = &decision.supersedes {
            let updated = tx.execute(
                "UPDATE decisions SET superseded_by = ?1, updated_at = ?2 WHERE id = ?3",
                params![decision.id, decision.updated_at.timestamp_millis(), prev_id],
            )?;
            if updated == 0 {
                return Err(StorageError::NotFound(prev_id.clone()));
            }
        }

        if let Some(vec) = embedding {
            let rowid = tx.last_insert_rowid();
            let blob = f32_slice_to_blob(vec);
            tx.execute(
                "INSERT INTO decision_embeddings (rowid, embedding, dimensions, model, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    rowid,
                    blob,
                    vec.len() as i64,
                    model,
                    decision.created_at.timestamp_millis()
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get_decision(&self, id: &str) -> Result<Option<Decision>> {
        let reader = self.reader()?;
        reader
            .query_row(DECISION_SELECT_SQL_WHERE_ID, params![id], row_to_decision)
            .optional()
            .map_err(StorageError::Database)
    }

    /// List decisions for a topic (or all topics, if `topic` is `None`),
    /// most-recent first, capped at `limit`.
    pub fn list_decisions(&self, topic: Option<&str>, limit: usize) -> Result<Vec<Decision>> {
        let reader = self.reader()?;
        let mut stmt = if topic.is_some() {
            reader.prepare(&format!(
                "{DECISION_SELECT_SQL} WHERE topic = ?1 ORDER BY created_at DESC LIMIT ?2"
            ))?
        } else {
            reader.prepare(&format!(
                "{DECISION_SELECT_SQL} ORDER BY created_at DESC LIMIT ?1"
            ))?
        };

        let rows = if let Some(t) = topic {
            stmt.query_map(params![t, limit as i64], row_to_decision)?
        } else {
            stmt.query_map(params![limit as i64], row_to_decision)?
        };

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::Database)
    }

    /// Every decision, for in-memory scoring passes that can't be expressed
    /// as SQL (confidence decay, usage signal). Bounded by `limit` as a
    /// safety valve — see Design Note on unbounded scans.
    pub fn all_decisions(&self, limit: usize) -> Result<Vec<Decision>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!("{DECISION_SELECT_SQL} LIMIT ?1"))?;
        let rows = stmt.query_map(params![limit as i64], row_to_decision)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::Database)
    }

    pub fn update_outcome(
        &self,
        id: &str,
        outcome: Outcome,
        failure_reason: Option<&str>,
        limitation: Option<&str>,
        duration_days: Option<i64>,
        confidence: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.writer()?;
        let updated = conn.execute(
            "UPDATE decisions SET
                outcome = ?1, failure_reason = ?2, limitation = ?3, duration_days = ?4,
                confidence = COALESCE(?5, confidence), updated_at = ?6
             WHERE id = ?7",
            params![
                outcome.as_str(),
                failure_reason,
                limitation,
                duration_days,
                confidence,
                now.timestamp_millis(),
                id,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Increment the usage counters on a decision (a successful/failed
    /// application of it elsewhere), used by the injector's feedback loop.
    pub fn record_usage(&self, id: &str, success: bool) -> Result<()> {
        let conn = self.writer()?;
        let column = if success { "usage_success" } else { "usage_failure" };
        let updated = conn.execute(
            &format!("UPDATE decisions SET usage_count = usage_count + 1, {column} = {column} + 1 WHERE id = ?1"),
            params![id],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn insert_edge(&self, edge: &DecisionEdge) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO decision_edges (from_id, to_id, relationship, reason, approved_by_user, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                edge.from_id,
                edge.to_id,
                edge.relationship.as_str(),
                edge.reason,
                edge.approved_by_user,
                edge.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Every edge touching `decision_id`, in either direction.
    pub fn edges_for(&self, decision_id: &str) -> Result<Vec<DecisionEdge>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT from_id, to_id, relationship, reason, approved_by_user, created_at
             FROM decision_edges WHERE from_id = ?1 OR to_id = ?1",
        )?;
        let rows = stmt.query_map(params![decision_id], row_to_edge)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::Database)
    }

    /// Walk the `supersedes` chain for `decision_id` in a single recursive
    /// query, returned oldest-first.
    pub fn query_chain(&self, decision_id: &str) -> Result<Vec<Decision>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "WITH RECURSIVE chain(id, depth) AS (
                SELECT id, 0 FROM decisions WHERE id = ?1
                UNION ALL
                SELECT d.id, c.depth + 1
                FROM decisions d
                JOIN chain c ON d.supersedes = c.id
                UNION ALL
                SELECT d.supersedes, c.depth - 1
                FROM decisions d
                JOIN chain c ON d.id = c.id
                WHERE d.supersedes IS NOT NULL
            )
            SELECT {cols} FROM decisions
            WHERE id IN (SELECT DISTINCT id FROM chain)
            ORDER BY created_at ASC",
            cols = DECISION_COLUMNS,
        ))?;
        let rows = stmt.query_map(params![decision_id], row_to_decision)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::Database)
    }

    pub fn store_embedding(&self, rowid: i64, embedding: &[f32], model: &str, created_at_ms: i64) -> Result<()> {
        let conn = self.writer()?;
        vector::store(&conn, rowid, embedding, model, created_at_ms)
    }

    /// Vector search, gated on the ANN extension having loaded (§4.1: "on
    /// failure, marks vector search as disabled and all subsequent vector
    /// operations return 'no results' cleanly"). Degraded means empty, not a
    /// slower fallback scan.
    pub fn search_embeddings(&self, query: &[f32], limit: usize, min_similarity: f32) -> Result<Vec<(i64, f32)>> {
        if !self.vector_index_available {
            return Ok(vec![]);
        }
        let reader = self.reader()?;
        vector::search(&reader, query, limit, min_similarity)
    }

    /// Map an embedding's rowid back to the decision it belongs to (rowid
    /// equals `decisions`' own internal rowid since it's an unaliased
    /// `INTEGER PRIMARY KEY`-less text-keyed table — resolved via a join on
    /// SQLite's implicit rowid).
    pub fn decision_id_for_rowid(&self, rowid: i64) -> Result<Option<String>> {
        let reader = self.reader()?;
        reader
            .query_row("SELECT id FROM decisions WHERE rowid = ?1", params![rowid], |r| r.get(0))
            .optional()
            .map_err(StorageError::Database)
    }

    pub fn rowid_for_decision(&self, id: &str) -> Result<Option<i64>> {
        let reader = self.reader()?;
        reader
            .query_row("SELECT rowid FROM decisions WHERE id = ?1", params![id], |r| r.get(0))
            .optional()
            .map_err(StorageError::Database)
    }
}

const DECISION_COLUMNS: &str = "id, topic, decision, reasoning, confidence, outcome, failure_reason, \
    limitation, duration_days, evidence, alternatives, risks, supersedes, superseded_by, refined_from, \
    created_at, updated_at, usage_count, usage_success, usage_failure, time_saved, needs_validation, \
    validation_attempts, last_validated_at, trust_context";

const DECISION_SELECT_SQL: &str = "SELECT id, topic, decision, reasoning, confidence, outcome, failure_reason, \
    limitation, duration_days, evidence, alternatives, risks, supersedes, superseded_by, refined_from, \
    created_at, updated_at, usage_count, usage_success, usage_failure, time_saved, needs_validation, \
    validation_attempts, last_validated_at, trust_context FROM decisions";

const DECISION_SELECT_SQL_WHERE_ID: &str = "SELECT id, topic, decision, reasoning, confidence, outcome, \
    failure_reason, limitation, duration_days, evidence, alternatives, risks, supersedes, superseded_by, \
    refined_from, created_at, updated_at, usage_count, usage_success, usage_failure, time_saved, \
    needs_validation, validation_attempts, last_validated_at, trust_context \
    FROM decisions WHERE id = ?1";

fn row_to_decision(row: &rusqlite::Row) -> rusqlite::Result<Decision> {
    let outcome: Option<String> = row.get(5)?;
    let refined_from: String = row.get(14)?;
    let created_at_ms: i64 = row.get(15)?;
    let updated_at_ms: i64 = row.get(16)?;
    let last_validated_at_ms: Option<i64> = row.get(23)?;

    Ok(Decision {
        id: row.get(0)?,
        topic: row.get(1)?,
        decision: row.get(2)?,
        reasoning: row.get(3)?,
        confidence: row.get(4)?,
        outcome: outcome.and_then(|s| Outcome::parse_name(&s)),
        failure_reason: row.get(6)?,
        limitation: row.get(7)?,
        duration_days: row.get(8)?,
        evidence: row.get(9)?,
        alternatives: row.get(10)?,
        risks: row.get(11)?,
        supersedes: row.get(12)?,
        superseded_by: row.get(13)?,
        refined_from: serde_json::from_str(&refined_from).unwrap_or_default(),
        created_at: millis_to_datetime(created_at_ms),
        updated_at: millis_to_datetime(updated_at_ms),
        usage_count: row.get(17)?,
        usage_success: row.get(18)?,
        usage_failure: row.get(19)?,
        time_saved: row.get(20)?,
        needs_validation: row.get(21)?,
        validation_attempts: row.get(22)?,
        last_validated_at: last_validated_at_ms.map(millis_to_datetime),
        trust_context: row.get(24)?,
    })
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<DecisionEdge> {
    let relationship: String = row.get(2)?;
    let created_at_ms: i64 = row.get(5)?;
    Ok(DecisionEdge {
        from_id: row.get(0)?,
        to_id: row.get(1)?,
        relationship: relationship.parse().unwrap_or(RelationshipType::Similar),
        reason: row.get(3)?,
        approved_by_user: row.get(4)?,
        created_at: millis_to_datetime(created_at_ms),
    })
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn f32_slice_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_decision(id: &str, topic: &str) -> Decision {
        let now = Utc::now();
        Decision {
            id: id.to_string(),
            topic: topic.to_string(),
            decision: "use postgres".to_string(),
            reasoning: Some("team familiarity".to_string()),
            confidence: 0.6,
            outcome: None,
            failure_reason: None,
            limitation: None,
            duration_days: None,
            evidence: None,
            alternatives: None,
            risks: None,
            supersedes: None,
            superseded_by: None,
            refined_from: vec![],
            created_at: now,
            updated_at: now,
            usage_count: 0,
            usage_success: 0,
            usage_failure: 0,
            time_saved: None,
            needs_validation: None,
            validation_attempts: None,
            last_validated_at: None,
            trust_context: None,
        }
    }

    #[test]
    fn insert_and_fetch_roundtrip() {
        let storage = Storage::open_in_memory().unwrap();
        let d = sample_decision("d1", "database");
        storage.insert_decision(&d, None, "test-model").unwrap();
        let fetched = storage.get_decision("d1").unwrap().unwrap();
        assert_eq!(fetched.topic, "database");
        assert_eq!(fetched.decision, "use postgres");
    }

    #[test]
    fn supersedes_flips_previous_head() {
        let storage = Storage::open_in_memory().unwrap();
        let d1 = sample_decision("d1", "database");
        storage.insert_decision(&d1, None, "test-model").unwrap();

        let mut d2 = sample_decision("d2", "database");
        d2.supersedes = Some("d1".to_string());
        storage.insert_decision(&d2, None, "test-model").unwrap();

        let prev = storage.get_decision("d1").unwrap().unwrap();
        assert_eq!(prev.superseded_by.as_deref(), Some("d2"));
    }

    #[test]
    fn query_chain_returns_full_lineage_oldest_first() {
        let storage = Storage::open_in_memory().unwrap();
        let d1 = sample_decision("d1", "database");
        storage.insert_decision(&d1, None, "test-model").unwrap();
        let mut d2 = sample_decision("d2", "database");
        d2.supersedes = Some("d1".to_string());
        storage.insert_decision(&d2, None, "test-model").unwrap();
        let mut d3 = sample_decision("d3", "database");
        d3.supersedes = Some("d2".to_string());
        storage.insert_decision(&d3, None, "test-model").unwrap();

        let chain = storage.query_chain("d3").unwrap();
        let ids: Vec<_> = chain.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2", "d3"]);
    }

    #[test]
    fn update_outcome_persists_fields() {
        let storage = Storage::open_in_memory().unwrap();
        let d = sample_decision("d1", "database");
        storage.insert_decision(&d, None, "test-model").unwrap();
        storage
            .update_outcome("d1", Outcome::Failed, Some("too slow"), None, Some(14), None, Utc::now())
            .unwrap();
        let fetched = storage.get_decision("d1").unwrap().unwrap();
        assert_eq!(fetched.outcome, Some(Outcome::Failed));
        assert_eq!(fetched.failure_reason.as_deref(), Some("too slow"));
        assert_eq!(fetched.duration_days, Some(14));
    }

    #[test]
    fn get_missing_decision_returns_none() {
        let storage = Storage::open_in_memory().unwrap();
        assert!(storage.get_decision("missing").unwrap().is_none());
    }

    #[test]
    fn list_decisions_orders_newest_first_and_respects_limit() {
        let storage = Storage::open_in_memory().unwrap();
        for i in 0..5 {
            let d = sample_decision(&format!("d{i}"), "database");
            storage.insert_decision(&d, None, "test-model").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let listed = storage.list_decisions(Some("database"), 3).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].id, "d4");
    }

    #[test]
    fn search_embeddings_returns_empty_without_the_vector_extension() {
        // MAMA_VEC_EXTENSION is unset in the test environment, so
        // vector_index_available is always false here — exercising the
        // documented degraded tier (spec.md §8: "Vector index disabled:
        // suggest returns {success:true, results:[]}").
        let storage = Storage::open_in_memory().unwrap();
        assert!(!storage.vector_index_available());
        let d = sample_decision("d1", "database");
        storage.insert_decision(&d, Some(&[1.0, 0.0, 0.0]), "test-model").unwrap();
        let hits = storage.search_embeddings(&[1.0, 0.0, 0.0], 10, 0.0).unwrap();
        assert!(hits.is_empty());
    }
}
