//! # mama-core
//!
//! Local decision-memory engine for AI coding assistants.
//!
//! Records engineering decisions made during a conversation and retrieves
//! them later by semantic similarity, topic, and evolution relationship
//! (supersedes/refines/contradicts/builds_on/debates/synthesizes).
//!
//! ## Architecture
//!
//! - [`storage`] — SQLite adapter: connections, migrations, vector index
//! - [`embeddings`] — deterministic text embedding with an LRU query cache
//! - [`decisions`] — the decision record type and its CRUD repository
//! - [`graph`] — the evolution graph between decisions
//! - [`outcome`] — outcome updates and free-text outcome-signal detection
//! - [`scorer`] — hybrid relevance scoring and top-K selection
//! - [`formatter`] — renders a selection into a compact context block
//! - [`injector`] — the hook-invoked, timeout-guarded context pipeline
//! - [`facade`] — the five stable public operations external callers use
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mama_core::{Engine, facade};
//!
//! # fn run() -> mama_core::Result<()> {
//! let engine = Engine::open(None)?;
//!
//! let saved = facade::save(&engine, facade::SaveRequest {
//!     topic: "date_format".to_string(),
//!     decision: "Use ISO 8601 only".to_string(),
//!     reasoning: Some("Standard, unambiguous".to_string()),
//!     confidence: Some(0.6),
//!     outcome: None,
//!     supersedes: None,
//! })?;
//! assert!(saved.success);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decisions;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod facade;
pub mod formatter;
pub mod graph;
pub mod injector;
pub mod outcome;
pub mod scorer;
pub mod storage;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result};

/// Crate version, re-exported for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding dimension used when no override is configured.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::decisions::{Decision, DecisionEdge, Outcome, RelationshipType};
    pub use crate::engine::Engine;
    pub use crate::error::{EngineError, Result};
    pub use crate::facade;
}
