//! Justification-based truth maintenance store.
//!
//! The TMS is the authoritative registry of every assertion ever admitted.
//! Each record carries the assertion plus a reverse-support set (ids of
//! assertions that justify-depend on it). Activity is conjunctive: an
//! assertion is active iff every id in its support set is active, so a
//! retraction cascades deactivation through all transitive dependents.
//!
//! Mutations are serialized by one coarse lock; the record map sits behind a
//! reader-writer lock so `get`/`is_active`/`get_all_active` stay safe under
//! concurrent writers. The TMS never touches KB indices itself - Knowledge
//! instances consume its state events to clean up their own.

use crate::engine::assertion::Assertion;
use crate::engine::error::EngineError;
use crate::engine::events::{EventBus, KbEvent};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, trace};
use uuid::Uuid;

#[derive(Debug)]
struct TmsRecord {
    assertion: Arc<Assertion>,
    /// Ids of assertions whose support set contains this one.
    dependents: BTreeSet<Uuid>,
    /// True once explicitly removed; the record is purged when the last
    /// dependent reference drains.
    retracted: bool,
}

/// The central truth maintenance store.
pub struct Tms {
    bus: EventBus,
    /// Serializes mutations; cascades cross assertions, so per-record
    /// locking would not be sound.
    write_lock: Mutex<()>,
    records: RwLock<FxHashMap<Uuid, TmsRecord>>,
}

impl Tms {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            write_lock: Mutex::new(()),
            records: RwLock::new(FxHashMap::default()),
        }
    }

    /// Admit an assertion with its support set.
    ///
    /// Refuses (returning `None`, store unchanged) when a support id is
    /// unknown, equals the assertion's own id, or would close a cycle in
    /// the justification graph. On success the assertion is stored with
    /// activity computed from its support and a state event is emitted.
    pub fn add(&self, assertion: Assertion, source: &str) -> Result<Arc<Assertion>, EngineError> {
        let _guard = self.write_lock.lock();
        let mut records = self.records.write();

        if records.contains_key(&assertion.id) {
            error!(id = %assertion.id, source, "assertion id already present in TMS");
            return Err(EngineError::validation(format!(
                "assertion id {} already present",
                assertion.id
            )));
        }
        for support_id in &assertion.justification_ids {
            if *support_id == assertion.id {
                debug!(id = %assertion.id, source, "assertion cannot support itself");
                return Err(EngineError::Cycle(assertion.id));
            }
            if !records.contains_key(support_id) {
                debug!(id = %assertion.id, support = %support_id, source, "unknown support id");
                return Err(EngineError::UnknownSupport(*support_id));
            }
        }
        if closes_cycle(&records, assertion.id, &assertion.justification_ids) {
            debug!(id = %assertion.id, source, "support cycle refused");
            return Err(EngineError::Cycle(assertion.id));
        }

        // Active iff every support is active; external facts (empty
        // support) are active.
        let is_active = assertion
            .justification_ids
            .iter()
            .all(|id| records[id].assertion.is_active);

        for support_id in &assertion.justification_ids {
            records
                .get_mut(support_id)
                .expect("support existence checked above")
                .dependents
                .insert(assertion.id);
        }

        let stored = Arc::new(Assertion {
            is_active,
            ..assertion
        });
        records.insert(
            stored.id,
            TmsRecord {
                assertion: Arc::clone(&stored),
                dependents: BTreeSet::new(),
                retracted: false,
            },
        );
        trace!(id = %stored.id, kb = %stored.kb_id, is_active, source, "assertion admitted");
        self.bus.publish(KbEvent::StateChanged {
            id: stored.id,
            kb: stored.kb_id.clone(),
            is_active,
        });
        Ok(stored)
    }

    /// Explicitly retract an assertion.
    ///
    /// Deactivates it and every transitive dependent (conjunctive support),
    /// emitting a state event per transition; the retracted event for the
    /// assertion itself is emitted strictly after those. The record is
    /// unlinked from its supports and physically deleted once nothing
    /// depends on it. Retracting an unknown or already-retracted id is a
    /// no-op.
    pub fn remove(&self, id: Uuid, source: &str) {
        let _guard = self.write_lock.lock();
        let mut records = self.records.write();

        let Some(record) = records.get_mut(&id) else {
            trace!(%id, source, "retract of unknown assertion ignored");
            return;
        };
        if record.retracted {
            trace!(%id, source, "repeat retract ignored");
            return;
        }
        record.retracted = true;

        // Deactivate the target and cascade through dependents, collecting
        // transitions in order. The target's own state event precedes its
        // dependents'; the retracted event goes out after all of them.
        let mut transitions = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            let Some(record) = records.get_mut(&current) else {
                continue;
            };
            if !record.assertion.is_active {
                continue;
            }
            record.assertion = Arc::new(Assertion {
                is_active: false,
                ..(*record.assertion).clone()
            });
            transitions.push((current, record.assertion.kb_id.clone()));
            queue.extend(record.dependents.iter().copied());
        }

        for (changed, kb) in &transitions {
            self.bus.publish(KbEvent::StateChanged {
                id: *changed,
                kb: kb.clone(),
                is_active: false,
            });
        }

        let final_value = Arc::clone(&records[&id].assertion);
        debug!(%id, kb = %final_value.kb_id, source, cascaded = transitions.len(), "assertion retracted");

        // Unlink from supports and purge records that no longer serve as
        // justification for anything.
        unlink_and_purge(&mut records, id);

        self.bus.publish(KbEvent::Retracted {
            assertion: final_value,
        });
    }

    /// The current record for an id, if still physically present.
    pub fn get(&self, id: Uuid) -> Option<Arc<Assertion>> {
        self.records.read().get(&id).map(|r| Arc::clone(&r.assertion))
    }

    pub fn is_active(&self, id: Uuid) -> bool {
        self.records
            .read()
            .get(&id)
            .is_some_and(|r| r.assertion.is_active)
    }

    pub fn get_all_active(&self) -> Vec<Arc<Assertion>> {
        self.records
            .read()
            .values()
            .filter(|r| r.assertion.is_active)
            .map(|r| Arc::clone(&r.assertion))
            .collect()
    }
}

/// Would linking `new_id` under `support` close a cycle? True when any
/// support id transitively depends on `new_id` through justification links.
fn closes_cycle(
    records: &FxHashMap<Uuid, TmsRecord>,
    new_id: Uuid,
    support: &BTreeSet<Uuid>,
) -> bool {
    let mut queue: VecDeque<Uuid> = support.iter().copied().collect();
    let mut visited = BTreeSet::new();
    while let Some(current) = queue.pop_front() {
        if current == new_id {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(record) = records.get(&current) {
            queue.extend(record.assertion.justification_ids.iter().copied());
        }
    }
    false
}

/// Remove `id`'s reverse-support links and delete any retracted record left
/// without dependents, cascading into its own supports.
fn unlink_and_purge(records: &mut FxHashMap<Uuid, TmsRecord>, id: Uuid) {
    let mut queue = VecDeque::from([id]);
    while let Some(current) = queue.pop_front() {
        let purgeable = records
            .get(&current)
            .is_some_and(|r| r.retracted && r.dependents.is_empty());
        if !purgeable {
            continue;
        }
        let record = records.remove(&current).expect("checked above");
        trace!(id = %current, "record purged");
        for support_id in &record.assertion.justification_ids {
            if let Some(support) = records.get_mut(support_id) {
                support.dependents.remove(&current);
                queue.push_back(*support_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::assertion::PotentialAssertion;
    use crate::kif::parse_kif;

    fn tms() -> Tms {
        Tms::new(EventBus::new())
    }

    fn assertion(kif: &str, support: &[Uuid]) -> Assertion {
        PotentialAssertion::new(parse_kif(kif).unwrap().remove(0), 0.5)
            .unwrap()
            .with_support(support.iter().copied())
            .into_assertion(Uuid::new_v4(), 0, crate::base::intern("global"))
    }

    #[test]
    fn test_external_fact_is_active() {
        let tms = tms();
        let ticket = tms.add(assertion("(p a)", &[]), "test").unwrap();
        assert!(ticket.is_active);
        assert!(tms.is_active(ticket.id));
        assert_eq!(tms.get_all_active().len(), 1);
    }

    #[test]
    fn test_unknown_support_refused() {
        let tms = tms();
        let result = tms.add(assertion("(q a)", &[Uuid::new_v4()]), "test");
        assert!(matches!(result, Err(EngineError::UnknownSupport(_))));
        assert!(tms.get_all_active().is_empty());
    }

    #[test]
    fn test_self_support_refused() {
        let tms = tms();
        let mut a = assertion("(p a)", &[]);
        a.justification_ids.insert(a.id);
        assert!(matches!(tms.add(a, "test"), Err(EngineError::Cycle(_))));
    }

    #[test]
    fn test_derived_active_iff_support_active() {
        let tms = tms();
        let a = tms.add(assertion("(p a)", &[]), "test").unwrap();
        let b = tms.add(assertion("(q a)", &[a.id]), "test").unwrap();
        assert!(b.is_active);

        tms.remove(a.id, "test");
        let c = tms.add(assertion("(r a)", &[b.id]), "test").unwrap();
        assert!(!c.is_active, "support deactivated before add");
    }

    #[test]
    fn test_remove_cascades_through_dependents() {
        let tms = tms();
        let a = tms.add(assertion("(p a)", &[]), "test").unwrap();
        let b = tms.add(assertion("(q a)", &[a.id]), "test").unwrap();
        let c = tms.add(assertion("(r a)", &[b.id]), "test").unwrap();

        tms.remove(a.id, "test");
        assert!(!tms.is_active(a.id));
        assert!(!tms.is_active(b.id));
        assert!(!tms.is_active(c.id));
    }

    #[test]
    fn test_repeat_remove_is_noop() {
        let tms = tms();
        let a = tms.add(assertion("(p a)", &[]), "test").unwrap();
        tms.remove(a.id, "test");
        tms.remove(a.id, "test");
        assert!(!tms.is_active(a.id));
    }

    #[test]
    fn test_referenced_record_survives_until_dependents_drop() {
        let tms = tms();
        let a = tms.add(assertion("(p a)", &[]), "test").unwrap();
        let b = tms.add(assertion("(q a)", &[a.id]), "test").unwrap();

        tms.remove(a.id, "test");
        // B still references A, so A's record is kept (inactive).
        assert!(tms.get(a.id).is_some());
        assert!(!tms.is_active(a.id));

        tms.remove(b.id, "test");
        // Last dependent gone: both records purge.
        assert!(tms.get(b.id).is_none());
        assert!(tms.get(a.id).is_none());
    }

    #[test]
    fn test_unreferenced_record_purges_immediately() {
        let tms = tms();
        let a = tms.add(assertion("(p a)", &[]), "test").unwrap();
        tms.remove(a.id, "test");
        assert!(tms.get(a.id).is_none());
    }

    #[test]
    fn test_retracted_event_follows_dependent_state_events() {
        use std::time::Duration;

        let bus = EventBus::new();
        let log: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&log);
        bus.subscribe_all(move |event| {
            let entry = match event {
                KbEvent::StateChanged { id, is_active, .. } => {
                    format!("state:{id}:{is_active}")
                }
                KbEvent::Retracted { assertion } => format!("retracted:{}", assertion.id),
                _ => return,
            };
            sink.lock().push(entry);
        });

        let tms = Tms::new(bus);
        let a = tms.add(assertion("(p a)", &[]), "test").unwrap();
        let b = tms.add(assertion("(q a)", &[a.id]), "test").unwrap();
        tms.remove(a.id, "test");

        for _ in 0..200 {
            if log.lock().len() >= 5 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let events = log.lock().clone();
        let retracted_pos = events
            .iter()
            .position(|e| e == &format!("retracted:{}", a.id))
            .expect("retracted event emitted");
        let b_deactivated_pos = events
            .iter()
            .position(|e| e == &format!("state:{}:false", b.id))
            .expect("dependent deactivation emitted");
        assert!(
            b_deactivated_pos < retracted_pos,
            "dependent must deactivate before the retracted event"
        );
    }
}
