//! Context injector (C8): the hook-invoked, timeout-guarded pipeline that
//! turns a prompt into an optional context block.
//!
//! Mirrors the teacher's `memory::consolidation` guard, which never lets a
//! background enrichment pass block or fail the foreground request: every
//! error and every timeout here collapses to `None` plus one `tracing::warn!`
//! line, per §4.8 ("On timeout or any error, return nothing and emit one log
//! line").

use std::time::Duration;

use chrono::Utc;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::formatter::{self, Preset};
use crate::scorer::{self, CandidateSource};

/// Deadline for the whole embed → search → score → format pipeline.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// How many ANN candidates to pull before filtering to the adaptive
/// threshold (§4.8: "up to 10 ANN candidates at prefilter threshold 0.5").
const ANN_CANDIDATE_LIMIT: usize = 10;

/// Run the context-injection pipeline for `prompt`, returning a rendered
/// block under [`formatter::DEFAULT_TOKEN_BUDGET`] or `None` if nothing
/// cleared the adaptive threshold, the pipeline errored, or it ran past
/// [`TIMEOUT`]. Never propagates an error to the caller.
pub async fn get_context(engine: &Engine, prompt: &str) -> Option<String> {
    if crate::config::hooks_disabled() {
        return None;
    }

    match tokio::time::timeout(TIMEOUT, run_pipeline(engine, prompt)).await {
        Ok(Ok(context)) => context,
        Ok(Err(e)) => {
            tracing::warn!("context injection failed: {e}");
            None
        }
        Err(_) => {
            tracing::warn!("context injection timed out after {:?}", TIMEOUT);
            None
        }
    }
}

async fn run_pipeline(engine: &Engine, prompt: &str) -> Result<Option<String>, EngineError> {
    if prompt.trim().is_empty() {
        return Ok(None);
    }

    engine.ensure_model_ready().await?;

    let threshold = scorer::adaptive_threshold(prompt);
    let query_vector = engine.embeddings().embed(prompt)?;
    let hits = engine
        .storage()
        .search_embeddings(&query_vector, ANN_CANDIDATE_LIMIT, scorer::PREFILTER_THRESHOLD)?;

    let mut candidates = Vec::with_capacity(hits.len());
    for (rowid, similarity) in hits {
        if similarity < threshold {
            continue;
        }
        let Some(decision_id) = engine.storage().decision_id_for_rowid(rowid)? else { continue };
        let Some(decision) = engine.storage().get_decision(&decision_id)? else { continue };
        candidates.push((decision, similarity, CandidateSource::Ann));
    }

    if candidates.is_empty() {
        return Ok(None);
    }

    let selected = scorer::select_top_k(candidates, threshold, scorer::DEFAULT_TOP_K, Utc::now(), &engine.config().scorer_weights);
    if selected.is_empty() {
        return Ok(None);
    }

    let rendered = formatter::format(Preset::Full, &selected, formatter::DEFAULT_TOKEN_BUDGET, Utc::now());
    if rendered.is_empty() {
        Ok(None)
    } else {
        Ok(Some(rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::decisions::model::SaveInput;
    use crate::decisions::repository;

    fn engine() -> Engine {
        Engine::open_in_memory(EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn empty_prompt_yields_no_context() {
        let engine = engine();
        assert!(get_context(&engine, "   ").await.is_none());
    }

    #[tokio::test]
    async fn empty_store_yields_no_context() {
        let engine = engine();
        assert!(get_context(&engine, "which database should we use").await.is_none());
    }

    #[tokio::test]
    async fn unrelated_store_yields_no_context() {
        let engine = engine();
        repository::save(engine.storage(), engine.embeddings(), SaveInput {
            topic: "cache_eviction".to_string(),
            decision: "Use an LRU policy with a bounded capacity".to_string(),
            reasoning: None,
            confidence: None,
            outcome: None,
            supersedes: None,
            evidence: None,
            alternatives: None,
            risks: None,
        }).unwrap();

        let result = get_context(&engine, "zzzyzzyx completely unrelated nonsense query").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn disabled_hooks_short_circuit() {
        std::env::set_var("MAMA_DISABLE_HOOKS", "1");
        let engine = engine();
        let result = get_context(&engine, "which database should we use").await;
        std::env::remove_var("MAMA_DISABLE_HOOKS");
        assert!(result.is_none());
    }
}
