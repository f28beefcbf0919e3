//! Engine facade: rules from KIF, forward chaining, queries, events.

use noctua::{
    Engine, EngineConfig, KbEvent, KbEventKind, PotentialAssertion, Query, QueryStatus, QueryType,
    Term, intern, parse_kif,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn term(s: &str) -> Term {
    parse_kif(s).unwrap().remove(0)
}

fn pa(kif: &str, priority: f64) -> PotentialAssertion {
    PotentialAssertion::new(term(kif), priority).unwrap()
}

#[test]
fn test_rules_from_kif_then_chain_then_query() {
    let engine = Engine::default();
    let added = engine
        .add_rules_from_kif(
            "(=> (man ?x) (mortal ?x))\n(=> (and (mortal ?x) (greek ?x)) (philosopher ?x))",
            0.8,
        )
        .unwrap();
    assert_eq!(added.len(), 2);

    engine.submit(pa("(man Socrates)", 0.9), "test").unwrap();
    engine.submit(pa("(greek Socrates)", 0.9), "test").unwrap();
    let derived = engine.run_to_fixpoint(8);
    assert_eq!(derived, 2);

    let result = engine.submit_query(&Query::new(
        QueryType::AskTrueFalse,
        term("(philosopher Socrates)"),
    ));
    assert_eq!(result.status, QueryStatus::Success);
}

#[test]
fn test_malformed_rule_kif_is_an_error() {
    let engine = Engine::default();
    assert!(engine.add_rules_from_kif("(=> (p ?x)", 0.5).is_err());
    assert!(engine.add_rules_from_kif("(or (p ?x) (q ?x))", 0.5).is_err());
    assert!(engine.cognition().rules().is_empty());
}

#[test]
fn test_duplicate_rule_forms_are_skipped() {
    let engine = Engine::default();
    let first = engine
        .add_rules_from_kif("(=> (p ?x) (q ?x))", 0.5)
        .unwrap();
    let second = engine
        .add_rules_from_kif("(=> (p ?x) (q ?x))", 0.9)
        .unwrap();
    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
}

#[test]
fn test_asserted_and_retracted_events_reach_subscribers() {
    let engine = Engine::default();
    let asserted = Arc::new(AtomicUsize::new(0));
    let retracted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&asserted);
    engine.bus().subscribe(KbEventKind::Asserted, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&retracted);
    engine.bus().subscribe(KbEventKind::Retracted, move |event| {
        if let KbEvent::Retracted { assertion } = event {
            assert!(!assertion.is_active, "retracted event carries the final value");
        }
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let id = engine.submit(pa("(p a)", 0.5), "test").unwrap();
    engine.cognition().kb(None).retract(id, "test");

    for _ in 0..200 {
        if asserted.load(Ordering::SeqCst) == 1 && retracted.load(Ordering::SeqCst) == 1 {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("events not delivered");
}

#[test]
fn test_note_scoped_derivation_inherits_source() {
    let engine = Engine::default();
    let note = intern("note-1");
    engine.cognition().add_active_note(note.clone());
    engine
        .add_rules_from_kif("(=> (man ?x) (mortal ?x))", 0.8)
        .unwrap();
    engine
        .submit(pa("(man Socrates)", 0.9).with_source_note(note.clone()), "test")
        .unwrap();
    assert_eq!(engine.step(), 1);

    let derived = engine
        .cognition()
        .find_assertions_across_active_kbs(&term("(mortal Socrates)"), |_| true);
    assert_eq!(derived.len(), 1);
    assert_eq!(derived[0].source_note_id.as_ref(), Some(&note));
    assert_eq!(derived[0].kb_id, note, "derivation routes to the common source note");
}

#[test]
fn test_concurrent_submissions_from_threads() {
    let mut config = EngineConfig::default();
    config.global_kb_capacity = 4096;
    let engine = Arc::new(Engine::new(config));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                for i in 0..50 {
                    engine
                        .submit(pa(&format!("(fact w{worker} n{i})"), 0.5), "test")
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(engine.cognition().kb(None).assertion_count(), 200);
}
