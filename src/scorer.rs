//! Hybrid relevance scoring and top-K selection (C6).
//!
//! The formula and selection rules are fixed by spec; the weights and
//! half-life are not pinned to one value anywhere in the corpus, so — per
//! Design Note §9 ("pick defaults and make them tunable") — they live here
//! as documented `const`s wrapped in a `Serialize`/`Deserialize` struct so
//! `EngineConfig` can override them, the same "defaults plus config
//! override" shape the teacher uses for its FSRS scheduler parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decisions::model::{Decision, Outcome};

/// Tunable weights for the hybrid score, plus the recency half-life.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScorerWeights {
    pub w_sem: f64,
    pub w_rec: f64,
    pub w_conf: f64,
    pub w_out: f64,
    pub w_use: f64,
    /// Recency half-life in days. "On the order of weeks" per spec.
    pub half_life_days: f64,
    /// Magnitude of `outcome_bonus`; bounded so a single failure cannot
    /// invert semantic rank, per §4.6.
    pub outcome_bonus_magnitude: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            w_sem: 0.45,
            w_rec: 0.2,
            w_conf: 0.15,
            w_out: 0.1,
            w_use: 0.1,
            half_life_days: 14.0,
            outcome_bonus_magnitude: 0.15,
        }
    }
}

/// Default number of results returned by `suggest`/the injector (K).
pub const DEFAULT_TOP_K: usize = 3;

/// ANN prefilter threshold: candidates below this never reach scoring.
pub const PREFILTER_THRESHOLD: f32 = 0.5;

/// A scored candidate: the decision, its raw similarity, and final score.
#[derive(Debug, Clone)]
pub struct ScoredDecision {
    pub decision: Decision,
    pub similarity: f32,
    pub score: f64,
}

/// Where a candidate came from, used to prefer graph-chain entries over
/// ANN-derived ones when merging and deduplicating (§4.6 rule 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    GraphChain,
    Ann,
}

/// The minimum similarity a candidate must meet, chosen by the query's
/// token count: short queries (fewer than 3 whitespace-separated tokens)
/// require a tighter match.
pub fn adaptive_threshold(query: &str) -> f32 {
    if query.split_whitespace().count() < 3 {
        0.7
    } else {
        0.6
    }
}

fn recency_decay(created_at: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let age_days = (now - created_at).num_milliseconds() as f64 / 86_400_000.0;
    let age_days = age_days.max(0.0);
    0.5_f64.powf(age_days / half_life_days.max(0.001))
}

fn outcome_bonus(outcome: Option<Outcome>, magnitude: f64) -> f64 {
    match outcome {
        Some(Outcome::Success) => magnitude,
        Some(Outcome::Failed) => -magnitude,
        Some(Outcome::Partial) | None => 0.0,
    }
}

fn usage_signal(usage_success: i64, usage_failure: i64) -> f64 {
    usage_success as f64 / (usage_success + usage_failure).max(1) as f64
}

/// Compute the final score for one decision given its similarity to the
/// query embedding.
pub fn score(decision: &Decision, similarity: f32, now: DateTime<Utc>, weights: &ScorerWeights) -> f64 {
    weights.w_sem * similarity as f64
        + weights.w_rec * recency_decay(decision.created_at, now, weights.half_life_days)
        + weights.w_conf * decision.confidence
        + weights.w_out * outcome_bonus(decision.outcome, weights.outcome_bonus_magnitude)
        + weights.w_use * usage_signal(decision.usage_success, decision.usage_failure)
}

/// Merge candidates from the evolution graph and the ANN search, preferring
/// the graph-chain entry when the same decision id appears in both (§4.6
/// rule 3: "prefer graph-chain entries").
pub fn merge_candidates(
    graph_chain: Vec<(Decision, f32)>,
    ann: Vec<(Decision, f32)>,
) -> Vec<(Decision, f32, CandidateSource)> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::with_capacity(graph_chain.len() + ann.len());

    for (decision, similarity) in graph_chain {
        seen.insert(decision.id.clone());
        merged.push((decision, similarity, CandidateSource::GraphChain));
    }
    for (decision, similarity) in ann {
        if seen.insert(decision.id.clone()) {
            merged.push((decision, similarity, CandidateSource::Ann));
        }
    }
    merged
}

/// Apply the adaptive threshold, score, sort, and take the top `k` —
/// the full selection pipeline from §4.6.
pub fn select_top_k(
    candidates: Vec<(Decision, f32, CandidateSource)>,
    threshold: f32,
    k: usize,
    now: DateTime<Utc>,
    weights: &ScorerWeights,
) -> Vec<ScoredDecision> {
    let mut scored: Vec<ScoredDecision> = candidates
        .into_iter()
        .filter(|(_, similarity, _)| *similarity >= threshold)
        .map(|(decision, similarity, _)| {
            let s = score(&decision, similarity, now, weights);
            ScoredDecision { decision, similarity, score: s }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.decision.created_at.cmp(&a.decision.created_at))
    });
    scored.truncate(k);
    scored
}
