//! End-to-end scenarios driven through the public API.

use noctua::{
    AssertionType, Engine, EngineConfig, PotentialAssertion, Query, QueryStatus, QueryType, Term,
    parse_kif,
};
use smol_str::SmolStr;

fn term(s: &str) -> Term {
    parse_kif(s).unwrap().remove(0)
}

fn pa(kif: &str, priority: f64) -> PotentialAssertion {
    PotentialAssertion::new(term(kif), priority).unwrap()
}

#[test]
fn scenario_parse_two_top_level_lists() {
    let terms = parse_kif("((likes Alice Bob) (not (likes ?x Carol)))").unwrap();
    assert_eq!(terms.len(), 1);
    let outer = terms[0].children().unwrap();
    assert_eq!(outer.len(), 2);
    let vars = outer[1].vars();
    assert_eq!(vars.len(), 1);
    assert!(vars.contains("?x"));
}

#[test]
fn scenario_duplicate_commit_is_rejected() {
    let engine = Engine::default();
    assert!(engine.submit(pa("(p a)", 0.5), "test").is_some());
    assert!(engine.submit(pa("(p a)", 0.5), "test").is_none());
    assert_eq!(engine.cognition().kb(None).assertion_count(), 1);
}

#[test]
fn scenario_universal_assertion_attributes() {
    let engine = Engine::default();
    let id = engine
        .submit(pa("(forall (?x) (=> (man ?x) (mortal ?x)))", 0.9), "test")
        .unwrap();
    let assertion = engine.cognition().tms().get(id).unwrap();
    assert_eq!(assertion.assertion_type, AssertionType::Universal);
    assert_eq!(assertion.quantified_vars, vec![SmolStr::new("?x")]);
    assert_eq!(
        assertion.effective_term(),
        &term("(=> (man ?x) (mortal ?x))")
    );
}

#[test]
fn scenario_eviction_drops_lowest_priority() {
    let mut config = EngineConfig::default();
    config.global_kb_capacity = 2;
    let engine = Engine::new(config);

    engine.submit(pa("(fact one)", 0.9), "test").unwrap();
    let low = engine.submit(pa("(fact two)", 0.5), "test").unwrap();
    engine.submit(pa("(fact three)", 0.8), "test").unwrap();

    let remaining = engine.cognition().kb(None).get_all_assertions();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|a| a.id != low));
    let priorities: Vec<f64> = remaining.iter().map(|a| a.priority).collect();
    assert!(priorities.contains(&0.9));
    assert!(priorities.contains(&0.8));
}

#[test]
fn scenario_retraction_cascades_and_repeat_is_noop() {
    let engine = Engine::default();
    let a = engine.submit(pa("(p a)", 0.8), "test").unwrap();
    let b = engine
        .submit(pa("(q a)", 0.8).with_support([a]), "test")
        .unwrap();

    let tms = engine.cognition().tms();
    assert!(tms.is_active(a));
    assert!(tms.is_active(b));

    engine.cognition().kb(None).retract(a, "test");
    assert!(!tms.is_active(a));
    assert!(!tms.is_active(b), "dependent deactivates with its support");

    // Second retract is a no-op.
    engine.cognition().kb(None).retract(a, "test");
    assert!(!tms.is_active(b));
}

#[test]
fn scenario_ask_bindings_two_matches_in_order() {
    let engine = Engine::default();
    engine.submit(pa("(likes Alice Bob)", 0.9), "test").unwrap();
    engine.submit(pa("(likes Carol Bob)", 0.6), "test").unwrap();

    let query = Query::new(QueryType::AskBindings, term("(likes ?who Bob)"));
    let result = engine.submit_query(&query);
    assert_eq!(result.status, QueryStatus::Success);
    assert_eq!(result.bindings.len(), 2);
    assert_eq!(result.bindings[0].get("?who"), Some(&term("Alice")));
    assert_eq!(result.bindings[1].get("?who"), Some(&term("Carol")));
}
