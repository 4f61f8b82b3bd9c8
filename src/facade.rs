//! Public API façade (C9): the five stable operations external callers use.
//!
//! Input types carry `#[serde(deny_unknown_fields)]`, matching the
//! teacher's `IngestInput`/`RecallInput` convention for anything an
//! external caller can deserialize into. The façade never throws on a
//! caller mistake — it returns `{success: false, message}` — but lets
//! unrecoverable internal errors (disk full, a poisoned lock) propagate as
//! `Err`, per §7's error taxonomy ("Outside the injector, unrecoverable I/O
//! errors propagate from the façade").

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::decisions::model::{Decision, Outcome, SaveInput};
use crate::decisions::repository::{self, RepositoryError};
use crate::engine::Engine;
use crate::error::Result;
use crate::formatter::{self, Preset};
use crate::graph;
use crate::outcome::{self, OutcomeError};
use crate::scorer::{self, CandidateSource, ScoredDecision};

/// Input to [`save`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SaveRequest {
    pub topic: String,
    pub decision: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub supersedes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub success: bool,
    pub id: Option<String>,
    pub message: Option<String>,
}

pub fn save(engine: &Engine, request: SaveRequest) -> Result<SaveResponse> {
    let input = SaveInput {
        topic: request.topic,
        decision: request.decision,
        reasoning: request.reasoning,
        confidence: request.confidence,
        outcome: request.outcome,
        supersedes: request.supersedes,
        evidence: None,
        alternatives: None,
        risks: None,
    };

    match repository::save(engine.storage(), engine.embeddings(), input) {
        Ok(id) => Ok(SaveResponse { success: true, id: Some(id), message: None }),
        Err(RepositoryError::Validation(msg)) => Ok(SaveResponse { success: false, id: None, message: Some(msg) }),
        Err(e) => Err(e.into()),
    }
}

/// Input to [`recall`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecallRequest {
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResponse {
    pub success: bool,
    pub history_text: String,
    pub message: Option<String>,
}

const NO_DECISIONS_FOUND: &str = "no decisions found";

pub fn recall(engine: &Engine, request: RecallRequest) -> Result<RecallResponse> {
    let chain = match repository::recall(engine.storage(), &request.topic) {
        Ok(chain) => chain,
        Err(RepositoryError::Validation(msg)) => {
            return Ok(RecallResponse { success: false, history_text: String::new(), message: Some(msg) });
        }
        Err(e) => return Err(e.into()),
    };

    if chain.is_empty() {
        return Ok(RecallResponse { success: true, history_text: NO_DECISIONS_FOUND.to_string(), message: None });
    }

    let ids: Vec<String> = chain.iter().map(|d| d.id.clone()).collect();
    let edges = graph::outgoing_edges_by_id(engine.storage(), &ids)?;

    let items = as_scored(chain, 1.0);
    let text = formatter::format_with_edges(Preset::Full, &items, usize::MAX, Utc::now(), Some(&edges));
    Ok(RecallResponse { success: true, history_text: text, message: None })
}

/// Input to [`list`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListRequest {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub filter: Option<Outcome>,
}

fn default_list_limit() -> usize {
    repository::DEFAULT_LIST_LIMIT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub success: bool,
    pub list_text: String,
    pub message: Option<String>,
}

pub fn list(engine: &Engine, request: ListRequest) -> Result<ListResponse> {
    let rows = match repository::list(engine.storage(), request.limit, request.filter) {
        Ok(rows) => rows,
        Err(RepositoryError::Validation(msg)) => {
            return Ok(ListResponse { success: false, list_text: String::new(), message: Some(msg) });
        }
        Err(e) => return Err(e.into()),
    };

    if rows.is_empty() {
        return Ok(ListResponse { success: true, list_text: NO_DECISIONS_FOUND.to_string(), message: None });
    }

    let items = as_scored(rows, 1.0);
    let text = formatter::format(Preset::Full, &items, usize::MAX, Utc::now());
    Ok(ListResponse { success: true, list_text: text, message: None })
}

/// Input to [`suggest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SuggestRequest {
    pub query: String,
    #[serde(default = "default_suggest_limit")]
    pub limit: usize,
    #[serde(default = "default_suggest_threshold")]
    pub threshold: f32,
}

fn default_suggest_limit() -> usize {
    5
}

fn default_suggest_threshold() -> f32 {
    0.6
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestResult {
    pub id: String,
    pub topic: String,
    pub decision: String,
    pub similarity: f32,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestResponse {
    pub success: bool,
    pub results: Vec<SuggestResult>,
}

pub fn suggest(engine: &Engine, request: SuggestRequest) -> Result<SuggestResponse> {
    if request.query.trim().is_empty() {
        return Ok(SuggestResponse { success: false, results: vec![] });
    }

    let query_vector = engine.embeddings().embed(&request.query)?;
    let hits = engine
        .storage()
        .search_embeddings(&query_vector, 10, scorer::PREFILTER_THRESHOLD)?;

    let mut candidates = Vec::with_capacity(hits.len());
    for (rowid, similarity) in hits {
        if let Some(decision_id) = engine.storage().decision_id_for_rowid(rowid)? {
            if let Some(decision) = engine.storage().get_decision(&decision_id)? {
                candidates.push((decision, similarity, CandidateSource::Ann));
            }
        }
    }

    let threshold = request.threshold.max(scorer::adaptive_threshold(&request.query));
    let selected = scorer::select_top_k(candidates, threshold, request.limit, Utc::now(), &engine.config().scorer_weights);

    let results = selected
        .into_iter()
        .map(|s| SuggestResult {
            id: s.decision.id,
            topic: s.decision.topic,
            decision: s.decision.decision,
            similarity: s.similarity,
            score: s.score,
        })
        .collect();

    Ok(SuggestResponse { success: true, results })
}

/// Input to [`update_outcome`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateOutcomeRequest {
    pub decision_id: String,
    pub outcome: Outcome,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub limitation: Option<String>,
    #[serde(default)]
    pub duration_days: Option<i64>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcomeResponse {
    pub success: bool,
    pub message: Option<String>,
}

pub fn update_outcome(engine: &Engine, request: UpdateOutcomeRequest) -> Result<UpdateOutcomeResponse> {
    let result = outcome::update_outcome(
        engine.storage(),
        &request.decision_id,
        request.outcome,
        request.failure_reason.as_deref(),
        request.limitation.as_deref(),
        request.duration_days,
        request.confidence,
        Utc::now(),
    );

    match result {
        Ok(()) => Ok(UpdateOutcomeResponse { success: true, message: None }),
        Err(OutcomeError::Validation(msg)) => Ok(UpdateOutcomeResponse { success: false, message: Some(msg) }),
        Err(OutcomeError::NotFound(id)) => {
            Ok(UpdateOutcomeResponse { success: false, message: Some(format!("decision not found: {id}")) })
        }
        Err(OutcomeError::Storage(e)) => Err(e.into()),
    }
}

fn as_scored(decisions: Vec<Decision>, similarity: f32) -> Vec<ScoredDecision> {
    decisions
        .into_iter()
        .map(|decision| ScoredDecision { decision, similarity, score: 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn engine() -> Engine {
        Engine::open_in_memory(EngineConfig::default()).unwrap()
    }

    #[test]
    fn save_then_recall_round_trips() {
        let engine = engine();
        let saved = save(&engine, SaveRequest {
            topic: "date_format".to_string(),
            decision: "Use ISO 8601 only".to_string(),
            reasoning: Some("Standard".to_string()),
            confidence: Some(0.6),
            outcome: None,
            supersedes: None,
        }).unwrap();
        assert!(saved.success);

        std::thread::sleep(std::time::Duration::from_millis(55));

        let saved2 = save(&engine, SaveRequest {
            topic: "date_format".to_string(),
            decision: "Support ISO 8601 and Unix".to_string(),
            reasoning: Some("Bootstrap needs Unix".to_string()),
            confidence: Some(0.9),
            outcome: None,
            supersedes: None,
        }).unwrap();
        assert!(saved2.success);

        let recalled = recall(&engine, RecallRequest { topic: "date_format".to_string() }).unwrap();
        assert!(recalled.success);
        assert!(recalled.history_text.contains("ISO 8601"));
        assert!(recalled.history_text.contains("Unix"));
        let unix_pos = recalled.history_text.find("Unix").unwrap();
        let iso_pos = recalled.history_text.find("date_format").unwrap();
        assert!(unix_pos > iso_pos || recalled.history_text.matches("date_format").count() > 1);
    }

    #[test]
    fn list_reports_topic_and_success_outcome() {
        let engine = engine();
        save(&engine, SaveRequest {
            topic: "auth".to_string(),
            decision: "Use JWT".to_string(),
            reasoning: None,
            confidence: Some(0.8),
            outcome: Some(Outcome::Success),
            supersedes: None,
        }).unwrap();

        let listed = list(&engine, ListRequest { limit: 20, filter: None }).unwrap();
        assert!(listed.success);
        assert!(listed.list_text.contains("auth"));
    }

    #[test]
    fn update_outcome_on_unknown_decision_fails() {
        let engine = engine();
        let result = update_outcome(&engine, UpdateOutcomeRequest {
            decision_id: "unknown".to_string(),
            outcome: Outcome::Success,
            failure_reason: None,
            limitation: None,
            duration_days: None,
            confidence: None,
        }).unwrap();
        assert!(!result.success);
    }

    #[test]
    fn list_validates_limit_range() {
        let engine = engine();
        let result = list(&engine, ListRequest { limit: 0, filter: None }).unwrap();
        assert!(!result.success);
        let result = list(&engine, ListRequest { limit: 101, filter: None }).unwrap();
        assert!(!result.success);
    }

    #[test]
    fn recall_rejects_empty_topic() {
        let engine = engine();
        let result = recall(&engine, RecallRequest { topic: "".to_string() }).unwrap();
        assert!(!result.success);
    }

    #[test]
    fn suggest_returns_empty_when_vector_index_is_disabled() {
        // No MAMA_VEC_EXTENSION is configured in tests, so the engine always
        // runs in the degraded tier (spec.md §8 boundary behavior).
        let engine = engine();
        assert!(!engine.vector_index_available());
        save(&engine, SaveRequest {
            topic: "database".to_string(),
            decision: "use postgres".to_string(),
            reasoning: None,
            confidence: None,
            outcome: None,
            supersedes: None,
        }).unwrap();

        let result = suggest(&engine, SuggestRequest {
            query: "which database should I pick".to_string(),
            limit: 5,
            threshold: 0.6,
        }).unwrap();
        assert!(result.success);
        assert!(result.results.is_empty());
    }
}
