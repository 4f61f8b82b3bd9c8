//! Outcome tracker (C5): `update_outcome` and free-text signal detection.
//!
//! `analyze_outcome`'s lexicon classifier is grounded directly on
//! `neuroscience::emotional_memory::EmotionalMemory::build_lexicon` /
//! `evaluate_content`: lowercase tokenization, punctuation trimming, a
//! 3-word negation window, and confidence from lexicon-hit ratio, all
//! carried over. The lexicon itself is swapped from valence/arousal words
//! to a bilingual (English + Korean) success/failure/partial vocabulary,
//! since spec.md §8 scenario 6 exercises Korean text directly.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};

use crate::decisions::model::Outcome;
use crate::storage::{Storage, StorageError};

/// Errors from `update_outcome` validation (§4.3, §8 boundary behaviors).
#[derive(Debug, Clone, thiserror::Error)]
pub enum OutcomeError {
    #[error("{0}")]
    Validation(String),
    #[error("decision not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Caps on free-text provenance fields, per §8 boundary behaviors.
pub const MAX_TEXT_BYTES: usize = 2000;

/// Confidence adjustments applied on outcome update, per §4.3. Overridden
/// entirely when the caller supplies an explicit `confidence`.
pub const SUCCESS_BONUS: f64 = 0.2;
pub const FAILED_PENALTY: f64 = -0.3;
pub const PARTIAL_BONUS: f64 = 0.1;
/// Extra bonus when a `SUCCESS` lands on a decision that's matured — old
/// enough that the success isn't just an immediate, untested result.
pub const MATURE_SUCCESS_BONUS: f64 = 0.1;
pub const MATURE_SUCCESS_AGE_DAYS: i64 = 30;

/// Update a decision's outcome, validating inputs and applying the default
/// confidence adjustment unless the caller overrides it.
pub fn update_outcome(
    storage: &Storage,
    id: &str,
    outcome: Outcome,
    failure_reason: Option<&str>,
    limitation: Option<&str>,
    duration_days: Option<i64>,
    confidence_override: Option<f64>,
    now: DateTime<Utc>,
) -> Result<(), OutcomeError> {
    if let Outcome::Failed = outcome {
        if failure_reason.map(str::is_empty).unwrap_or(true) {
            return Err(OutcomeError::Validation(
                "failure_reason is required when outcome is FAILED".to_string(),
            ));
        }
    }
    if let Some(r) = failure_reason {
        if r.len() > MAX_TEXT_BYTES {
            return Err(OutcomeError::Validation(format!(
                "failure_reason exceeds {MAX_TEXT_BYTES} bytes"
            )));
        }
    }
    if let Some(l) = limitation {
        if l.len() > MAX_TEXT_BYTES {
            return Err(OutcomeError::Validation(format!(
                "limitation exceeds {MAX_TEXT_BYTES} bytes"
            )));
        }
    }

    let existing = storage
        .get_decision(id)?
        .ok_or_else(|| OutcomeError::NotFound(id.to_string()))?;

    let confidence = match confidence_override {
        Some(c) => c.clamp(0.0, 1.0),
        None => {
            let mut adjusted = existing.confidence
                + match outcome {
                    Outcome::Success => SUCCESS_BONUS,
                    Outcome::Failed => FAILED_PENALTY,
                    Outcome::Partial => PARTIAL_BONUS,
                };
            if matches!(outcome, Outcome::Success) && existing.age_days(now) >= MATURE_SUCCESS_AGE_DAYS {
                adjusted += MATURE_SUCCESS_BONUS;
            }
            adjusted.clamp(0.0, 1.0)
        }
    };

    storage.update_outcome(id, outcome, failure_reason, limitation, duration_days, Some(confidence), now)?;
    Ok(())
}

/// A detected outcome signal from free text, with a coarse confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeSignal {
    pub signal: Outcome,
    pub confidence: f64,
}

/// Minimum classifier confidence before an auto-applied update is trusted.
pub const AUTO_APPLY_MIN_CONFIDENCE: f64 = 0.4;

/// Detect a success/failure/partial signal in free text using a small
/// bilingual lexicon. Advisory only — callers decide whether and when to
/// act on it (see [`maybe_auto_apply`]).
pub fn analyze_outcome(text: &str) -> Option<OutcomeSignal> {
    let words: Vec<String> = text
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect();

    if words.is_empty() {
        return None;
    }

    let lexicon = lexicon();
    let negations = negation_markers();

    let mut success_score = 0.0_f64;
    let mut failure_score = 0.0_f64;
    let mut partial_score = 0.0_f64;
    let mut hits = 0usize;

    for (i, word) in words.iter().enumerate() {
        let Some(&class) = lexicon.get(word.as_str()) else {
            continue;
        };
        let negated = (i.saturating_sub(3)..i).any(|j| negations.contains(words[j].as_str()));
        hits += 1;

        let target = if negated { flip(class) } else { class };
        match target {
            LexiconClass::Success => success_score += 1.0,
            LexiconClass::Failure => failure_score += 1.0,
            LexiconClass::Partial => partial_score += 1.0,
        }
    }

    if hits == 0 {
        return None;
    }

    let confidence = (hits as f64 / words.len() as f64).min(1.0);

    let (signal, strength) = [
        (Outcome::Success, success_score),
        (Outcome::Failed, failure_score),
        (Outcome::Partial, partial_score),
    ]
    .into_iter()
    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;

    if strength <= 0.0 {
        return None;
    }

    Some(OutcomeSignal { signal, confidence })
}

/// Apply a detected outcome signal automatically, but only when the
/// decision has no outcome yet and was created within `window_minutes` of
/// `now` (§4.5: "applied only within a 1-hour window... and only when no
/// outcome has been set"). Outside that window, or below the confidence
/// floor, this is a no-op that leaves the decision untouched.
pub fn maybe_auto_apply(
    storage: &Storage,
    decision_id: &str,
    text: &str,
    window_minutes: i64,
    now: DateTime<Utc>,
) -> Result<bool, OutcomeError> {
    let decision = storage
        .get_decision(decision_id)?
        .ok_or_else(|| OutcomeError::NotFound(decision_id.to_string()))?;

    if decision.outcome.is_some() {
        tracing::debug!("analyze_outcome: {decision_id} already has an outcome; not auto-applying");
        return Ok(false);
    }

    let age_minutes = (now - decision.created_at).num_minutes();
    if age_minutes > window_minutes {
        tracing::debug!("analyze_outcome: {decision_id} is outside the auto-outcome window; not auto-applying");
        return Ok(false);
    }

    let Some(signal) = analyze_outcome(text) else {
        return Ok(false);
    };
    if signal.confidence < AUTO_APPLY_MIN_CONFIDENCE {
        return Ok(false);
    }

    let failure_reason = if matches!(signal.signal, Outcome::Failed) {
        Some("auto-detected from free text")
    } else {
        None
    };

    update_outcome(storage, decision_id, signal.signal, failure_reason, None, None, None, now)?;
    Ok(true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexiconClass {
    Success,
    Failure,
    Partial,
}

fn flip(class: LexiconClass) -> LexiconClass {
    match class {
        LexiconClass::Success => LexiconClass::Failure,
        LexiconClass::Failure => LexiconClass::Success,
        LexiconClass::Partial => LexiconClass::Partial,
    }
}

static LEXICON: OnceLock<HashMap<&'static str, LexiconClass>> = OnceLock::new();
static NEGATIONS: OnceLock<std::collections::HashSet<&'static str>> = OnceLock::new();

fn lexicon() -> &'static HashMap<&'static str, LexiconClass> {
    LEXICON.get_or_init(|| {
        let mut lex = HashMap::new();
        for word in [
            "works", "worked", "working", "success", "successful", "succeeded", "great", "solid",
            "stable", "resolved", "fixed", "passed", "good", "excellent", "shipped", "성공", "해결",
            "완료", "잘됨", "좋음", "안정적",
        ] {
            lex.insert(word, LexiconClass::Success);
        }
        for word in [
            "failed", "failure", "broke", "broken", "crash", "crashed", "error", "bug", "regression",
            "reverted", "rollback", "bad", "terrible", "실패", "오류", "버그", "깨짐", "롤백",
        ] {
            lex.insert(word, LexiconClass::Failure);
        }
        for word in [
            "partial", "partially", "mixed", "somewhat", "workaround", "limitation", "limited",
            "부분적", "일부", "제한적",
        ] {
            lex.insert(word, LexiconClass::Partial);
        }
        lex
    })
}

fn negation_markers() -> &'static std::collections::HashSet<&'static str> {
    NEGATIONS.get_or_init(|| {
        [
            "not", "no", "never", "don't", "doesn't", "didn't", "won't", "can't", "couldn't",
            "shouldn't", "without", "안", "못",
        ]
        .into_iter()
        .collect()
    })
}
