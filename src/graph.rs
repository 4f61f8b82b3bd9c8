//! Evolution graph (C4): typed edges between decisions and chain queries.
//!
//! `query_chain`'s recursive traversal lives in
//! [`crate::storage::sqlite::Storage::query_chain`] as a single
//! `WITH RECURSIVE` query, per the contract's "single recursive query to
//! avoid N+1". This module owns edge creation and the
//! `query_semantic_edges` categorization on top of it.

use std::collections::HashMap;

use chrono::Utc;

use crate::decisions::model::{DecisionEdge, RelationshipType};
use crate::storage::Storage;
use crate::storage::StorageError;

/// Edges touching a set of decision ids, partitioned by relationship and
/// direction — `refines`/`refined_by`, `contradicts`/`contradicted_by`, and
/// so on — used to enrich retrieval results with "why this was chosen".
#[derive(Debug, Default, Clone)]
pub struct CategorizedEdges {
    pub by_label: HashMap<&'static str, Vec<DecisionEdge>>,
}

impl CategorizedEdges {
    pub fn get(&self, label: &str) -> &[DecisionEdge] {
        self.by_label.get(label).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Create a typed edge. Edges other than the automatic `supersedes` link
/// created by `save` start `approved_by_user = None` (pending review) and
/// participate in default queries until explicitly disapproved, per §4.4.
pub fn create_edge(
    storage: &Storage,
    from_id: &str,
    to_id: &str,
    relationship: RelationshipType,
    reason: Option<String>,
    approved_by_user: Option<bool>,
) -> Result<DecisionEdge, StorageError> {
    let edge = DecisionEdge {
        from_id: from_id.to_string(),
        to_id: to_id.to_string(),
        relationship,
        reason,
        approved_by_user,
        created_at: Utc::now(),
    };
    storage.insert_edge(&edge)?;
    Ok(edge)
}

/// Only edges that are approved or not-yet-reviewed participate in default
/// retrieval — `approved_by_user = Some(false)` hides an edge everywhere
/// (invariant 5).
fn visible(edge: &DecisionEdge) -> bool {
    edge.approved_by_user != Some(false)
}

/// Outgoing edges (approved or unreviewed) for each of `ids`, grouped by
/// `from_id` — used by `recall` to attach "why this was chosen" context to
/// each row (spec.md:101: "for each row, attaches the set of outgoing
/// edges"). Supersedes edges are excluded since the chain itself already
/// encodes that relationship.
pub fn outgoing_edges_by_id(
    storage: &Storage,
    ids: &[String],
) -> Result<HashMap<String, Vec<DecisionEdge>>, StorageError> {
    let mut by_id: HashMap<String, Vec<DecisionEdge>> = HashMap::new();
    for id in ids {
        for edge in storage.edges_for(id)? {
            if edge.from_id != *id || !visible(&edge) || edge.relationship == RelationshipType::Supersedes {
                continue;
            }
            by_id.entry(id.clone()).or_default().push(edge);
        }
    }
    Ok(by_id)
}

/// Categorize every edge touching `ids` by relationship and direction.
pub fn query_semantic_edges(storage: &Storage, ids: &[String]) -> Result<CategorizedEdges, StorageError> {
    let id_set: std::collections::HashSet<&str> = ids.iter().map(String::as_str).collect();
    let mut categorized = CategorizedEdges::default();

    let mut seen = std::collections::HashSet::new();
    for id in ids {
        for edge in storage.edges_for(id)? {
            let key = (edge.from_id.clone(), edge.to_id.clone(), edge.relationship.as_str());
            if !seen.insert(key) {
                continue;
            }
            if !visible(&edge) {
                continue;
            }
            if edge.relationship == RelationshipType::Supersedes {
                continue;
            }

            let label = if id_set.contains(edge.from_id.as_str()) {
                edge.relationship.as_str()
            } else {
                edge.relationship.inverse_label()
            };

            categorized.by_label.entry(label).or_default().push(edge);
        }
    }

    Ok(categorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_direction_relative_to_queried_ids() {
        let storage = Storage::open_in_memory().unwrap();
        create_edge(&storage, "a", "b", RelationshipType::Refines, None, None).unwrap();

        let from_a = query_semantic_edges(&storage, &["a".to_string()]).unwrap();
        assert_eq!(from_a.get("refines").len(), 1);
        assert!(from_a.get("refined_by").is_empty());

        let from_b = query_semantic_edges(&storage, &["b".to_string()]).unwrap();
        assert_eq!(from_b.get("refined_by").len(), 1);
        assert!(from_b.get("refines").is_empty());
    }

    #[test]
    fn disapproved_edges_are_hidden() {
        let storage = Storage::open_in_memory().unwrap();
        create_edge(&storage, "a", "b", RelationshipType::Contradicts, None, Some(false)).unwrap();
        let result = query_semantic_edges(&storage, &["a".to_string()]).unwrap();
        assert!(result.get("contradicts").is_empty());
    }

    #[test]
    fn pending_review_edges_are_visible() {
        let storage = Storage::open_in_memory().unwrap();
        create_edge(&storage, "a", "b", RelationshipType::BuildsOn, None, None).unwrap();
        let result = query_semantic_edges(&storage, &["a".to_string()]).unwrap();
        assert_eq!(result.get("builds_on").len(), 1);
    }

    #[test]
    fn supersedes_edges_are_excluded_from_semantic_categorization() {
        let storage = Storage::open_in_memory().unwrap();
        create_edge(&storage, "a", "b", RelationshipType::Supersedes, None, Some(true)).unwrap();
        let result = query_semantic_edges(&storage, &["a".to_string()]).unwrap();
        assert!(result.by_label.is_empty());
    }

    #[test]
    fn outgoing_edges_by_id_only_includes_the_sending_row() {
        let storage = Storage::open_in_memory().unwrap();
        create_edge(&storage, "a", "b", RelationshipType::Refines, None, None).unwrap();

        let by_id = outgoing_edges_by_id(&storage, &["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(by_id.get("a").unwrap().len(), 1);
        assert!(by_id.get("b").is_none());
    }

    #[test]
    fn outgoing_edges_by_id_excludes_disapproved_and_supersedes() {
        let storage = Storage::open_in_memory().unwrap();
        create_edge(&storage, "a", "b", RelationshipType::Contradicts, None, Some(false)).unwrap();
        create_edge(&storage, "a", "c", RelationshipType::Supersedes, None, Some(true)).unwrap();
        create_edge(&storage, "a", "d", RelationshipType::BuildsOn, None, None).unwrap();

        let by_id = outgoing_edges_by_id(&storage, &["a".to_string()]).unwrap();
        let edges = by_id.get("a").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relationship, RelationshipType::BuildsOn);
    }
}
