//! Context formatter (C7): renders a selection into a compact block.
//!
//! Small, focused rendering helpers in the teacher's style of exhaustive
//! match functions (c.f. `memory::node::NodeType::as_str`) — one function
//! per glyph/phrase concern, composed by the three presets.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::decisions::model::{DecisionEdge, Outcome};
use crate::scorer::ScoredDecision;

/// Default token budget for a rendered block, approximated as a
/// word+separator count per §4.7.
pub const DEFAULT_TOKEN_BUDGET: usize = 500;

const PREVIEW_MIN_CHARS: usize = 60;
const PREVIEW_MAX_CHARS: usize = 80;

/// Which rendering preset to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Full,
    Summary,
    Markdown,
}

fn outcome_glyph(outcome: Option<Outcome>) -> &'static str {
    match outcome {
        Some(Outcome::Success) => "\u{2713}",
        Some(Outcome::Failed) => "\u{2717}",
        Some(Outcome::Partial) => "\u{25D0}",
        None => "\u{25CB}",
    }
}

fn relative_time(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now - created_at;
    if age.num_minutes() < 1 {
        "just now".to_string()
    } else if age.num_hours() < 1 {
        format!("{}m ago", age.num_minutes())
    } else if age.num_days() < 1 {
        format!("{}h ago", age.num_hours())
    } else if age.num_days() < 30 {
        format!("{}d ago", age.num_days())
    } else {
        format!("{}mo ago", age.num_days() / 30)
    }
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= PREVIEW_MAX_CHARS {
        return trimmed.to_string();
    }
    let truncated: String = trimmed.chars().take(PREVIEW_MAX_CHARS.max(PREVIEW_MIN_CHARS)).collect();
    format!("{truncated}…")
}

/// Approximate token count as "word+separator count", per §4.7.
fn approx_tokens(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Render the outgoing edges attached to a row (spec.md:101), one per line,
/// e.g. `  -> refines d2`.
fn render_edges(edges: &[DecisionEdge]) -> Option<String> {
    if edges.is_empty() {
        return None;
    }
    let lines: Vec<String> = edges.iter().map(|e| format!("  -> {} {}", e.relationship, e.to_id)).collect();
    Some(lines.join("\n"))
}

fn render_entry(preset: Preset, item: &ScoredDecision, now: DateTime<Utc>, edges: Option<&[DecisionEdge]>) -> String {
    let glyph = outcome_glyph(item.decision.outcome);
    let pct = (item.similarity * 100.0).round() as i32;
    let when = relative_time(item.decision.created_at, now);

    let header = match preset {
        Preset::Markdown => format!("- {glyph} **{}** ({pct}%, {when})", item.decision.topic),
        Preset::Full | Preset::Summary => format!("{glyph} {} ({pct}%, {when})", item.decision.topic),
    };

    if matches!(preset, Preset::Summary) {
        return header;
    }

    let body = preview(&item.decision.decision);
    let mut entry = format!("{header}\n  {body}");
    if let Some(edge_lines) = edges.and_then(render_edges) {
        entry.push('\n');
        entry.push_str(&edge_lines);
    }
    entry
}

/// Render a scored selection into a compact block, stopping once the next
/// entry would exceed `token_budget` and appending a `+N more` sentinel.
pub fn format(preset: Preset, items: &[ScoredDecision], token_budget: usize, now: DateTime<Utc>) -> String {
    format_with_edges(preset, items, token_budget, now, None)
}

/// As [`format`], additionally attaching each row's outgoing edges (spec.md:101)
/// by decision id when `edges` is given.
pub fn format_with_edges(
    preset: Preset,
    items: &[ScoredDecision],
    token_budget: usize,
    now: DateTime<Utc>,
    edges: Option<&HashMap<String, Vec<DecisionEdge>>>,
) -> String {
    if items.is_empty() {
        return String::new();
    }

    let mut rendered = Vec::new();
    let mut used_tokens = 0usize;

    for item in items {
        let item_edges = edges.and_then(|m| m.get(&item.decision.id)).map(Vec::as_slice);
        let entry = render_entry(preset, item, now, item_edges);
        let entry_tokens = approx_tokens(&entry);
        if used_tokens + entry_tokens > token_budget && !rendered.is_empty() {
            break;
        }
        used_tokens += entry_tokens;
        rendered.push(entry);
    }

    let mut out = rendered.join("\n");
    let omitted = items.len() - rendered.len();
    if omitted > 0 {
        out.push_str(&format!("\n+{omitted} more"));
    }
    out
}
