//! The decision record and its supporting types.
//!
//! Shaped the way the teacher's `KnowledgeNode`/`EdgeType` are shaped in
//! `memory/node.rs` and `memory/mod.rs`: a plain data struct with a
//! `Default` impl for sensible zero values, a closed enum with
//! `Display`/`FromStr` for the one field that needs a stable wire name, and
//! `#[serde(deny_unknown_fields)]` on caller-supplied input types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a decision. Absent (`None` on [`Decision::outcome`]) means
/// `ONGOING` — there is deliberately no `Ongoing` variant so that "no
/// outcome yet" and "explicitly ongoing" can't drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failed,
    Partial,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Failed => "FAILED",
            Outcome::Partial => "PARTIAL",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SUCCESS" => Some(Outcome::Success),
            "FAILED" => Some(Outcome::Failed),
            "PARTIAL" => Some(Outcome::Partial),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed relationship between two decisions in the evolution graph.
///
/// A closed enum rather than a free string, per Design Note "Dynamic typing
/// in edge kinds" — generalized from the teacher's `EdgeType`
/// (`memory/mod.rs`) to the relationship vocabulary spec.md defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    Supersedes,
    Refines,
    Contradicts,
    BuildsOn,
    Debates,
    Synthesizes,
    Similar,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Supersedes => "supersedes",
            RelationshipType::Refines => "refines",
            RelationshipType::Contradicts => "contradicts",
            RelationshipType::BuildsOn => "builds_on",
            RelationshipType::Debates => "debates",
            RelationshipType::Synthesizes => "synthesizes",
            RelationshipType::Similar => "similar",
        }
    }

    /// The inverse-direction name used when categorizing edges by direction
    /// (e.g. `refines` / `refined_by`) — see [`crate::graph::query_semantic_edges`].
    pub fn inverse_label(&self) -> &'static str {
        match self {
            RelationshipType::Supersedes => "superseded_by",
            RelationshipType::Refines => "refined_by",
            RelationshipType::Contradicts => "contradicted_by",
            RelationshipType::BuildsOn => "built_on_by",
            RelationshipType::Debates => "debated_by",
            RelationshipType::Synthesizes => "synthesized_by",
            RelationshipType::Similar => "similar",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "supersedes" => Ok(RelationshipType::Supersedes),
            "refines" => Ok(RelationshipType::Refines),
            "contradicts" => Ok(RelationshipType::Contradicts),
            "builds_on" | "buildson" => Ok(RelationshipType::BuildsOn),
            "debates" => Ok(RelationshipType::Debates),
            "synthesizes" => Ok(RelationshipType::Synthesizes),
            "similar" => Ok(RelationshipType::Similar),
            other => Err(format!("unknown relationship type: {other}")),
        }
    }
}

/// A single immutable decision snapshot (spec.md §3).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: String,
    pub topic: String,
    pub decision: String,
    pub reasoning: Option<String>,
    pub confidence: f64,
    pub outcome: Option<Outcome>,
    pub failure_reason: Option<String>,
    pub limitation: Option<String>,
    pub duration_days: Option<i64>,
    pub evidence: Option<String>,
    pub alternatives: Option<String>,
    pub risks: Option<String>,
    pub supersedes: Option<String>,
    pub superseded_by: Option<String>,
    pub refined_from: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub usage_count: i64,
    pub usage_success: i64,
    pub usage_failure: i64,
    pub time_saved: Option<i64>,
    pub needs_validation: Option<bool>,
    pub validation_attempts: Option<i64>,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub trust_context: Option<String>,
}

impl Decision {
    /// Whether this decision is the current head of its topic's chain.
    pub fn is_head(&self) -> bool {
        self.superseded_by.is_none()
    }

    /// Age in whole days, used by the confidence-adjustment "mature
    /// success" bonus (§4.3) and the recency-decay scorer (§4.6).
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }

    /// Usage-based success ratio, clamped to `[0, 1]` (§4.6).
    pub fn usage_signal(&self) -> f64 {
        let total = self.usage_success + self.usage_failure;
        if total <= 0 {
            0.0
        } else {
            self.usage_success as f64 / total as f64
        }
    }
}

/// A typed, directed edge between two decisions (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionEdge {
    pub from_id: String,
    pub to_id: String,
    pub relationship: RelationshipType,
    pub reason: Option<String>,
    /// `Some(true)`/`Some(false)` once reviewed, `None` while pending.
    pub approved_by_user: Option<bool>,
    pub created_at: DateTime<Utc>,
}

/// Input accepted by [`crate::decisions::repository::save`].
///
/// `deny_unknown_fields` follows the teacher's `IngestInput` convention —
/// reject unexpected fields rather than silently ignore them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SaveInput {
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
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub alternatives: Option<String>,
    #[serde(default)]
    pub risks: Option<String>,
}

/// Input accepted by [`crate::outcome::update_outcome`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateOutcomeInput {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_type_roundtrip() {
        for rel in [
            RelationshipType::Supersedes,
            RelationshipType::Refines,
            RelationshipType::Contradicts,
            RelationshipType::BuildsOn,
            RelationshipType::Debates,
            RelationshipType::Synthesizes,
            RelationshipType::Similar,
        ] {
            let parsed: RelationshipType = rel.as_str().parse().unwrap();
            assert_eq!(parsed, rel);
        }
    }

    #[test]
    fn outcome_roundtrip() {
        for outcome in [Outcome::Success, Outcome::Failed, Outcome::Partial] {
            assert_eq!(Outcome::parse_name(outcome.as_str()), Some(outcome));
        }
    }

    #[test]
    fn save_input_denies_unknown_fields() {
        let json = r#"{"topic": "t", "decision": "d", "sneaky": true}"#;
        let result: std::result::Result<SaveInput, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
