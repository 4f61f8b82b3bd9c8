//! Migration runner.
//!
//! Generalized from the teacher's hardcoded `MIGRATIONS: &[Migration]` array
//! in `storage/migrations.rs` to files under `migrations/` at the workspace
//! root, embedded at compile time via `include_str!` so the on-disk
//! `NNN-*.sql` naming is real and inspectable rather than baked into a Rust
//! const. Application order, the `schema_version` ledger, and the
//! `execute_batch`-per-migration shape all follow the teacher's
//! `apply_migrations`/`get_current_version` pair.

use rusqlite::Connection;

use super::StorageError;

/// A single versioned migration.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, embedded at compile time and applied in ascending order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema with decisions table",
        sql: include_str!("../../migrations/001-init.sql"),
    },
    Migration {
        version: 2,
        description: "Embedding storage keyed by decision rowid",
        sql: include_str!("../../migrations/002-embeddings.sql"),
    },
    Migration {
        version: 3,
        description: "Evolution graph edges",
        sql: include_str!("../../migrations/003-edges.sql"),
    },
    Migration {
        version: 4,
        description: "Provenance fields: needs_validation, validation_attempts, last_validated_at, trust_context",
        sql: include_str!("../../migrations/004-provenance.sql"),
    },
];

/// Read the highest applied version from `schema_version`, or 0 if the
/// table doesn't exist yet (fresh database).
pub fn get_current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply every migration whose version exceeds the database's current
/// version, in ascending order. A migration that fails because its
/// `ALTER TABLE` statements target columns or tables that already exist
/// (message containing `"duplicate column"` or `"no such table"`) is
/// treated as already-applied rather than fatal — this lets a from-scratch
/// v1 install that already created later columns skip re-adding them.
pub fn apply_migrations(conn: &Connection) -> Result<u32, StorageError> {
    let current_version = get_current_version(conn).map_err(StorageError::Database)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        tracing::info!(
            "applying migration v{}: {}",
            migration.version,
            migration.description
        );

        match conn.execute_batch(migration.sql) {
            Ok(()) => {}
            Err(e) => {
                let msg = e.to_string().to_lowercase();
                if msg.contains("duplicate column") || msg.contains("no such table") {
                    tracing::warn!(
                        "migration v{} already partially applied ({e}); treating as idempotent",
                        migration.version
                    );
                    // execute_batch stops at the first failing statement, so
                    // the migration's own trailing `schema_version` insert
                    // never ran. Record it here or this migration retries
                    // (and re-fails identically) on every open.
                    conn.execute(
                        "INSERT OR IGNORE INTO schema_version (version, description, applied_at)
                         VALUES (?1, ?2, datetime('now'))",
                        rusqlite::params![migration.version, migration.description],
                    )
                    .map_err(StorageError::Database)?;
                } else {
                    return Err(StorageError::Migration(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    )));
                }
            }
        }

        applied += 1;
    }

    Ok(applied)
}
