//! End-to-end scenarios exercising the façade through an on-disk store,
//! mirroring spec.md §8's numbered scenarios.

use mama_core::decisions::model::Outcome;
use mama_core::{facade, Engine};

fn engine_at(dir: &std::path::Path) -> Engine {
    Engine::open(Some(dir.join("mama-memory.db"))).unwrap()
}

#[test]
fn scenario_1_chain_construction() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let a = facade::save(&engine, facade::SaveRequest {
        topic: "date_format".to_string(),
        decision: "Use ISO 8601 only".to_string(),
        reasoning: Some("Standard".to_string()),
        confidence: Some(0.6),
        outcome: None,
        supersedes: None,
    }).unwrap();
    assert!(a.success);

    std::thread::sleep(std::time::Duration::from_millis(50));

    let b = facade::save(&engine, facade::SaveRequest {
        topic: "date_format".to_string(),
        decision: "Support ISO 8601 and Unix".to_string(),
        reasoning: Some("Bootstrap needs Unix".to_string()),
        confidence: Some(0.9),
        outcome: None,
        supersedes: None,
    }).unwrap();
    assert!(b.success);

    let recalled = facade::recall(&engine, facade::RecallRequest { topic: "date_format".to_string() }).unwrap();
    assert!(recalled.success);
    assert!(recalled.history_text.contains("ISO 8601"));
    assert!(recalled.history_text.contains("Unix"));

    let newer_entry_start = recalled.history_text.find("date_format").unwrap();
    let unix_mention = recalled.history_text.find("Unix").unwrap();
    let older_entry_start = recalled.history_text[newer_entry_start + 1..].find("date_format");
    if let Some(offset) = older_entry_start {
        let older_entry_start = newer_entry_start + 1 + offset;
        assert!(unix_mention < older_entry_start, "newer decision (Unix) should render before the older one");
    }
}

#[test]
fn scenario_2_list_ordering_and_cap() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    for i in 0..25 {
        let saved = facade::save(&engine, facade::SaveRequest {
            topic: format!("topic-{i}"),
            decision: format!("decision body {i}"),
            reasoning: None,
            confidence: None,
            outcome: None,
            supersedes: None,
        }).unwrap();
        assert!(saved.success);
        std::thread::sleep(std::time::Duration::from_millis(2));
    }

    let default_list = facade::list(&engine, facade::ListRequest { limit: 20, filter: None }).unwrap();
    assert!(default_list.success);
    assert_eq!(default_list.list_text.lines().filter(|l| l.contains("topic-")).count(), 20);

    let capped = facade::list(&engine, facade::ListRequest { limit: 5, filter: None }).unwrap();
    assert!(capped.success);
    assert_eq!(capped.list_text.lines().filter(|l| l.contains("topic-")).count(), 5);
    assert!(capped.list_text.contains("topic-24"));
}

#[test]
fn scenario_3_outcome_update_and_display() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let saved = facade::save(&engine, facade::SaveRequest {
        topic: "auth".to_string(),
        decision: "Use JWT".to_string(),
        reasoning: None,
        confidence: Some(0.8),
        outcome: Some(Outcome::Success),
        supersedes: None,
    }).unwrap();
    assert!(saved.success);

    let listed = facade::list(&engine, facade::ListRequest { limit: 20, filter: None }).unwrap();
    assert!(listed.success);
    assert!(listed.list_text.contains("auth"));

    let bad_update = facade::update_outcome(&engine, facade::UpdateOutcomeRequest {
        decision_id: "does-not-exist".to_string(),
        outcome: Outcome::Success,
        failure_reason: None,
        limitation: None,
        duration_days: None,
        confidence: None,
    }).unwrap();
    assert!(!bad_update.success);
}

#[test]
fn scenario_5_injector_never_panics_or_propagates_on_an_unrelated_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    facade::save(&engine, facade::SaveRequest {
        topic: "cache_eviction".to_string(),
        decision: "Use an LRU policy with a bounded capacity".to_string(),
        reasoning: None,
        confidence: None,
        outcome: None,
        supersedes: None,
    }).unwrap();

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let result = rt.block_on(mama_core::injector::get_context(&engine, "zzzyzzyx totally unrelated gibberish query"));
    assert!(result.is_none());
}

#[test]
fn disabling_hooks_short_circuits_the_injector() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());
    std::env::set_var("MAMA_DISABLE_HOOKS", "1");

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let result = rt.block_on(mama_core::injector::get_context(&engine, "does this ever return anything"));

    std::env::remove_var("MAMA_DISABLE_HOOKS");
    assert!(result.is_none());
}

#[test]
fn update_outcome_rejects_failed_without_reason() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let saved = facade::save(&engine, facade::SaveRequest {
        topic: "deploy".to_string(),
        decision: "Use blue-green deploys".to_string(),
        reasoning: None,
        confidence: None,
        outcome: None,
        supersedes: None,
    }).unwrap();

    let result = facade::update_outcome(&engine, facade::UpdateOutcomeRequest {
        decision_id: saved.id.unwrap(),
        outcome: Outcome::Failed,
        failure_reason: None,
        limitation: None,
        duration_days: None,
        confidence: None,
    }).unwrap();
    assert!(!result.success);
}

#[test]
fn reopening_the_same_store_preserves_data() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = engine_at(dir.path());
        facade::save(&engine, facade::SaveRequest {
            topic: "persistence_check".to_string(),
            decision: "Data should survive a reopen".to_string(),
            reasoning: None,
            confidence: None,
            outcome: None,
            supersedes: None,
        }).unwrap();
    }

    let engine = engine_at(dir.path());
    let recalled = facade::recall(&engine, facade::RecallRequest { topic: "persistence_check".to_string() }).unwrap();
    assert!(recalled.success);
    assert!(recalled.history_text.contains("survive a reopen"));
}
