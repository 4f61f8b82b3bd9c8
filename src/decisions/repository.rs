//! Decision repository (C3): `save`, `recall`, `list`.
//!
//! Built the way the teacher's `Storage::ingest` composes a single
//! transaction: the embedding is computed *before* the transaction opens
//! (§4.3 step 3 — "so the transaction body remains synchronous"), then the
//! decision row, head-pointer flip, and embedding insert all happen inside
//! one `Storage::insert_decision` call.

use chrono::Utc;
use uuid::Uuid;

use crate::embeddings::{EmbeddingError, EmbeddingService};
use crate::storage::{Storage, StorageError};

use super::model::{Decision, Outcome, SaveInput};

/// Errors from repository operations, returned as validation data by the
/// façade rather than thrown, per §7's error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

pub const LIST_LIMIT_MIN: usize = 1;
pub const LIST_LIMIT_MAX: usize = 100;
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Save a new decision. Computes its embedding, then inserts the row (and,
/// if this topic already has a head, flips the old head's `superseded_by`)
/// in one transaction.
pub fn save(storage: &Storage, embeddings: &EmbeddingService, input: SaveInput) -> Result<String, RepositoryError> {
    if input.topic.trim().is_empty() {
        return Err(RepositoryError::Validation("topic must not be empty".into()));
    }
    if input.decision.trim().is_empty() {
        return Err(RepositoryError::Validation("decision must not be empty".into()));
    }

    let confidence = input.confidence.unwrap_or(0.5).clamp(0.0, 1.0);
    let now = Utc::now();
    let id = Uuid::new_v4().to_string();

    let supersedes = match &input.supersedes {
        Some(explicit) => Some(explicit.clone()),
        None => current_head(storage, &input.topic)?.map(|h| h.id),
    };

    let vector = embeddings.embed_enriched(&input.topic, &input.decision, input.reasoning.as_deref())?;

    let decision = Decision {
        id: id.clone(),
        topic: input.topic,
        decision: input.decision,
        reasoning: input.reasoning,
        confidence,
        outcome: input.outcome,
        failure_reason: None,
        limitation: None,
        duration_days: None,
        evidence: input.evidence,
        alternatives: input.alternatives,
        risks: input.risks,
        supersedes,
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
    };

    storage.insert_decision(&decision, Some(&vector), &embeddings.model_name())?;
    Ok(id)
}

fn current_head(storage: &Storage, topic: &str) -> Result<Option<Decision>, RepositoryError> {
    let candidates = storage.list_decisions(Some(topic), LIST_LIMIT_MAX)?;
    Ok(candidates.into_iter().find(Decision::is_head))
}

/// Find the head of `topic`'s chain and walk `supersedes` back to the
/// oldest ancestor, returning newest-first. Retries once with a `LIKE`
/// prefix on the first `_`-separated token when there's no exact topic
/// match.
pub fn recall(storage: &Storage, topic: &str) -> Result<Vec<Decision>, RepositoryError> {
    if topic.trim().is_empty() {
        return Err(RepositoryError::Validation("topic must not be empty".into()));
    }

    let head = match current_head(storage, topic)? {
        Some(h) => h,
        None => {
            let prefix = topic.split('_').next().unwrap_or(topic);
            let fuzzy_head = match find_topic_by_prefix(storage, prefix)? {
                Some(fuzzy_topic) => current_head(storage, &fuzzy_topic)?,
                None => None,
            };
            match fuzzy_head {
                Some(h) => h,
                None => return Ok(vec![]),
            }
        }
    };

    let mut chain = storage.query_chain(&head.id)?;
    chain.reverse(); // query_chain returns oldest-first; recall wants newest-first
    Ok(chain)
}

fn find_topic_by_prefix(storage: &Storage, prefix: &str) -> Result<Option<String>, RepositoryError> {
    let all = storage.all_decisions(LIST_LIMIT_MAX * 10)?;
    Ok(all.into_iter().find(|d| d.topic.starts_with(prefix)).map(|d| d.topic))
}

/// Return the `limit` most recently created decisions, optionally filtered
/// by outcome. `limit` must be in `[1, 100]`.
pub fn list(storage: &Storage, limit: usize, filter: Option<Outcome>) -> Result<Vec<Decision>, RepositoryError> {
    if !(LIST_LIMIT_MIN..=LIST_LIMIT_MAX).contains(&limit) {
        return Err(RepositoryError::Validation(format!(
            "limit must be between {LIST_LIMIT_MIN} and {LIST_LIMIT_MAX}"
        )));
    }

    let rows = if filter.is_some() {
        storage.all_decisions(LIST_LIMIT_MAX * 10)?
    } else {
        storage.list_decisions(None, limit)?
    };

    let mut rows: Vec<Decision> = match filter {
        Some(wanted) => rows.into_iter().filter(|d| d.outcome == Some(wanted)).collect(),
        None => rows,
    };
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows.truncate(limit);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Storage, EmbeddingService) {
        (Storage::open_in_memory().unwrap(), EmbeddingService::new("test-model", 32, None))
    }

    #[test]
    fn save_rejects_empty_topic() {
        let (storage, embeddings) = setup();
        let input = SaveInput {
            topic: "".to_string(),
            decision: "use jwt".to_string(),
            reasoning: None,
            confidence: None,
            outcome: None,
            supersedes: None,
            evidence: None,
            alternatives: None,
            risks: None,
        };
        assert!(matches!(save(&storage, &embeddings, input), Err(RepositoryError::Validation(_))));
    }

    #[test]
    fn second_save_to_same_topic_supersedes_the_first() {
        let (storage, embeddings) = setup();
        let make_input = |decision: &str| SaveInput {
            topic: "date_format".to_string(),
            decision: decision.to_string(),
            reasoning: None,
            confidence: None,
            outcome: None,
            supersedes: None,
            evidence: None,
            alternatives: None,
            risks: None,
        };

        let a = save(&storage, &embeddings, make_input("Use ISO 8601 only")).unwrap();
        let b = save(&storage, &embeddings, make_input("Support ISO 8601 and Unix")).unwrap();

        let a_row = storage.get_decision(&a).unwrap().unwrap();
        assert_eq!(a_row.superseded_by.as_deref(), Some(b.as_str()));
        let b_row = storage.get_decision(&b).unwrap().unwrap();
        assert_eq!(b_row.supersedes.as_deref(), Some(a.as_str()));
    }

    #[test]
    fn recall_returns_newest_first() {
        let (storage, embeddings) = setup();
        let make_input = |decision: &str| SaveInput {
            topic: "date_format".to_string(),
            decision: decision.to_string(),
            reasoning: None,
            confidence: None,
            outcome: None,
            supersedes: None,
            evidence: None,
            alternatives: None,
            risks: None,
        };
        save(&storage, &embeddings, make_input("Use ISO 8601 only")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        save(&storage, &embeddings, make_input("Support ISO 8601 and Unix")).unwrap();

        let chain = recall(&storage, "date_format").unwrap();
        assert_eq!(chain.len(), 2);
        assert!(chain[0].decision.contains("Unix"));
        assert!(chain[1].decision.contains("ISO 8601 only"));
    }

    #[test]
    fn recall_rejects_empty_topic() {
        let (storage, _embeddings) = setup();
        assert!(matches!(recall(&storage, ""), Err(RepositoryError::Validation(_))));
    }

    #[test]
    fn recall_on_missing_topic_returns_empty() {
        let (storage, _embeddings) = setup();
        assert_eq!(recall(&storage, "nonexistent").unwrap().len(), 0);
    }

    #[test]
    fn list_rejects_out_of_range_limit() {
        let (storage, _embeddings) = setup();
        assert!(matches!(list(&storage, 0, None), Err(RepositoryError::Validation(_))));
        assert!(matches!(list(&storage, 101, None), Err(RepositoryError::Validation(_))));
    }

    #[test]
    fn list_respects_limit_and_order() {
        let (storage, embeddings) = setup();
        for i in 0..5 {
            let input = SaveInput {
                topic: format!("topic-{i}"),
                decision: "d".to_string(),
                reasoning: None,
                confidence: None,
                outcome: None,
                supersedes: None,
                evidence: None,
                alternatives: None,
                risks: None,
            };
            save(&storage, &embeddings, input).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let rows = list(&storage, 3, None).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].topic, "topic-4");
    }
}
