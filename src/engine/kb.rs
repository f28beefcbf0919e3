//! Per-KB assertion store with capacity-bounded eviction.
//!
//! A `Knowledge` owns no assertions - the TMS does. It keeps a path index
//! over its active ground/skolemized assertions, a universal index keyed by
//! referenced predicate, and a priority-ordered eviction queue. All mutation
//! happens under the KB's write lock; the TMS lock is only ever taken while
//! the KB lock is held (never the other way around), and a KB never calls
//! into another KB.
//!
//! Index entries can go stale when a cascade started in another KB
//! deactivates assertions here; every read path validates candidates
//! against the TMS, and a bus subscription cleans stale entries up
//! asynchronously.

use crate::base::constants::{OP_AND, OP_EQUALS};
use crate::base::{FreshIds, Sym};
use crate::engine::assertion::{Assertion, AssertionType, KbId, PotentialAssertion};
use crate::engine::error::EngineError;
use crate::engine::events::{EventBus, KbEvent, KbEventKind};
use crate::engine::path_index::PathIndex;
use crate::engine::tms::Tms;
use crate::kif::Term;
use crate::logic::{Bindings, match_pattern, simplify};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

/// Eviction candidate. Ordered so that the binary heap pops the lowest
/// priority first, breaking ties by oldest timestamp, then insertion order.
#[derive(Debug, Clone)]
struct EvictionEntry {
    priority: f64,
    timestamp: u64,
    seq: u64,
    id: Uuid,
}

impl PartialEq for EvictionEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EvictionEntry {}

impl PartialOrd for EvictionEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EvictionEntry {
    // Reversed: BinaryHeap is a max-heap and we pop lowest-priority first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.timestamp.cmp(&self.timestamp))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct KbState {
    paths: PathIndex,
    /// Referenced predicate → universal assertion ids.
    universals: FxHashMap<Sym, FxHashSet<Uuid>>,
    universal_preds: FxHashMap<Uuid, BTreeSet<Sym>>,
    evictions: BinaryHeap<EvictionEntry>,
    /// Every id this KB has indexed and not yet cleaned up.
    ids: FxHashSet<Uuid>,
    seq: u64,
}

/// A note-scoped, capacity-bounded knowledge base.
pub struct Knowledge {
    id: KbId,
    capacity: usize,
    subsumption_enabled: bool,
    tms: Arc<Tms>,
    bus: EventBus,
    clock: Arc<FreshIds>,
    state: RwLock<KbState>,
}

impl Knowledge {
    /// Create a KB and subscribe it to deactivation events so its indices
    /// clean up after cascades that originate elsewhere.
    pub fn new(
        id: KbId,
        capacity: usize,
        subsumption_enabled: bool,
        tms: Arc<Tms>,
        bus: EventBus,
        clock: Arc<FreshIds>,
    ) -> Arc<Self> {
        let kb = Arc::new(Self {
            id: id.clone(),
            capacity,
            subsumption_enabled,
            tms,
            bus: bus.clone(),
            clock,
            state: RwLock::new(KbState::default()),
        });
        let weak = Arc::downgrade(&kb);
        bus.subscribe(KbEventKind::StateChanged, move |event| {
            if let KbEvent::StateChanged {
                id: assertion_id,
                kb: event_kb,
                is_active: false,
            } = event
                && *event_kb == id
                && let Some(kb) = weak.upgrade()
            {
                kb.deindex(*assertion_id);
            }
        });
        kb
    }

    pub fn id(&self) -> &KbId {
        &self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Commit a candidate assertion.
    ///
    /// Returns the now-active assertion, or `None` when the candidate is
    /// trivial, a duplicate, subsumed, refused by the TMS, or the KB cannot
    /// make room. Rejections leave no state visible to other observers.
    pub fn commit(&self, pa: PotentialAssertion, source: &str) -> Option<Arc<Assertion>> {
        let mut state = self.state.write();

        let pa = self.normalize(pa)?;
        if is_trivially_true(&pa.kif) {
            trace!(kb = %self.id, kif = %pa.kif, source, "trivially true, ignored");
            return None;
        }

        if self.is_duplicate(&state, &pa) {
            debug!(kb = %self.id, kif = %pa.kif, source, "duplicate assertion rejected");
            return None;
        }

        if self.subsumption_enabled && self.is_subsumed(&state, &pa) {
            debug!(kb = %self.id, kif = %pa.kif, source, "subsumed assertion rejected");
            return None;
        }

        let mut active_count = self.prune_stale(&mut state);
        while active_count >= self.capacity {
            match self.evict_lowest(&mut state, source) {
                Some(_) => active_count -= 1,
                None => break,
            }
        }
        if active_count >= self.capacity {
            let err = EngineError::Capacity {
                kb: self.id.to_string(),
                capacity: self.capacity,
            };
            error!(kb = %self.id, %err, source, "commit failed");
            return None;
        }

        let id = Uuid::new_v4();
        let timestamp = self.clock.next();
        let assertion = pa.into_assertion(id, timestamp, self.id.clone());
        let ticket = match self.tms.add(assertion, source) {
            Ok(ticket) => ticket,
            Err(err) => {
                debug!(kb = %self.id, %err, source, "TMS refused assertion");
                return None;
            }
        };
        if !ticket.is_active {
            debug!(kb = %self.id, %id, source, "assertion admitted inactive, commit failed");
            return None;
        }

        match ticket.assertion_type {
            AssertionType::Universal => {
                let preds = ticket.referenced_predicates();
                for pred in &preds {
                    state
                        .universals
                        .entry(pred.clone())
                        .or_default()
                        .insert(id);
                }
                state.universal_preds.insert(id, preds);
            }
            AssertionType::Ground | AssertionType::Skolemized => {
                state.paths.insert(id, &ticket.kif);
                state.seq += 1;
                let entry = EvictionEntry {
                    priority: ticket.priority,
                    timestamp,
                    seq: state.seq,
                    id,
                };
                state.evictions.push(entry);
            }
        }
        state.ids.insert(id);
        self.log_watermarks(active_count + 1);

        self.bus.publish(KbEvent::Asserted {
            assertion: Arc::clone(&ticket),
        });
        Some(ticket)
    }

    /// Retract an assertion. Forwards to the TMS; index cleanup for this
    /// and any other affected KB follows from the state events.
    pub fn retract(&self, id: Uuid, source: &str) {
        self.tms.remove(id, source);
        self.deindex(id);
    }

    /// Retract every assertion this KB holds and reset its indices.
    pub fn clear(&self, source: &str) {
        let ids: Vec<Uuid> = {
            let mut state = self.state.write();
            let ids = state.ids.drain().collect();
            state.paths.clear();
            state.universals.clear();
            state.universal_preds.clear();
            state.evictions.clear();
            ids
        };
        for id in ids {
            self.tms.remove(id, source);
        }
        debug!(kb = %self.id, source, "KB cleared");
    }

    /// Active assertions whose term may unify with `term`. Candidates come
    /// from the path index; callers confirm with an explicit unify.
    pub fn find_unifiable(&self, term: &Term) -> Vec<Arc<Assertion>> {
        let state = self.state.read();
        self.resolve_active(state.paths.find_unifiable(term))
    }

    /// Active assertions whose term may be an instance of `pattern`.
    pub fn find_instances(&self, pattern: &Term) -> Vec<Arc<Assertion>> {
        let state = self.state.read();
        self.resolve_active(state.paths.find_instances_of(pattern))
    }

    /// Active universal assertions referencing the given predicate.
    pub fn find_relevant_universals(&self, pred: &Sym) -> Vec<Arc<Assertion>> {
        let state = self.state.read();
        let ids = state
            .universals
            .get(pred)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        self.resolve_active(ids)
    }

    /// Every active assertion in this KB.
    pub fn get_all_assertions(&self) -> Vec<Arc<Assertion>> {
        let state = self.state.read();
        self.resolve_active(state.ids.iter().copied().collect())
    }

    /// Number of active assertions currently in this KB.
    pub fn assertion_count(&self) -> usize {
        let state = self.state.read();
        state
            .ids
            .iter()
            .filter(|id| self.tms.is_active(**id))
            .count()
    }

    fn resolve_active(&self, ids: Vec<Uuid>) -> Vec<Arc<Assertion>> {
        ids.into_iter()
            .filter_map(|id| self.tms.get(id))
            .filter(|a| a.is_active && a.kb_id == self.id)
            .collect()
    }

    /// Re-derive the candidate from its simplified term. Simplification can
    /// change the shape (a double negation disappearing flips `negated`),
    /// so the attributes are recomputed rather than patched. Ground
    /// candidates carrying a Skolem atom are demoted to Skolemized.
    fn normalize(&self, mut pa: PotentialAssertion) -> Option<PotentialAssertion> {
        let simplified = simplify(&pa.kif);
        if simplified == pa.kif {
            if pa.derived_type == AssertionType::Ground && pa.kif.contains_skolem() {
                pa.derived_type = AssertionType::Skolemized;
            }
            return Some(pa);
        }
        match PotentialAssertion::new(simplified, pa.priority) {
            Ok(rebuilt) => Some(PotentialAssertion {
                support: pa.support,
                source_note_id: pa.source_note_id,
                target_note_id: pa.target_note_id,
                derivation_depth: pa.derivation_depth,
                ..rebuilt
            }),
            Err(err) => {
                debug!(kb = %self.id, %err, "candidate invalid after simplification");
                None
            }
        }
    }

    /// An active assertion with exactly this term already lives here.
    fn is_duplicate(&self, state: &KbState, pa: &PotentialAssertion) -> bool {
        let candidates = match pa.derived_type {
            AssertionType::Universal => state.universal_preds.keys().copied().collect(),
            _ => state.paths.find_instances_of(&pa.kif),
        };
        self.resolve_active(candidates)
            .iter()
            .any(|existing| existing.kif == pa.kif)
    }

    /// An active ground/skolemized assertion with the same negation flag
    /// generalizes the candidate. Universal assertions are indexed apart
    /// and deliberately not consulted here.
    fn is_subsumed(&self, state: &KbState, pa: &PotentialAssertion) -> bool {
        let candidates = state.paths.find_generalizations_of(&pa.kif);
        self.resolve_active(candidates).iter().any(|existing| {
            existing.negated == pa.negated
                && existing.assertion_type != AssertionType::Universal
                && match_pattern(&existing.kif, &pa.kif, &Bindings::default()).is_some()
        })
    }

    /// Drop index entries whose assertion is gone or inactive; returns the
    /// number of live assertions left.
    fn prune_stale(&self, state: &mut KbState) -> usize {
        let stale: Vec<Uuid> = state
            .ids
            .iter()
            .filter(|id| !self.tms.is_active(**id))
            .copied()
            .collect();
        for id in stale {
            deindex_locked(state, id);
        }
        state.ids.len()
    }

    /// Evict the lowest-priority ground/skolemized assertion. Heap entries
    /// are validated against the TMS before use; stale ones are discarded.
    fn evict_lowest(&self, state: &mut KbState, source: &str) -> Option<Uuid> {
        while let Some(entry) = state.evictions.pop() {
            if !state.ids.contains(&entry.id) {
                continue;
            }
            let Some(assertion) = self.tms.get(entry.id) else {
                continue;
            };
            if !assertion.is_active || assertion.kb_id != self.id {
                continue;
            }
            warn!(
                kb = %self.id,
                id = %entry.id,
                priority = entry.priority,
                source,
                "evicting lowest-priority assertion"
            );
            self.tms.remove(entry.id, source);
            deindex_locked(state, entry.id);
            self.bus.publish(KbEvent::Evicted { assertion });
            return Some(entry.id);
        }
        None
    }

    fn deindex(&self, id: Uuid) {
        let mut state = self.state.write();
        deindex_locked(&mut state, id);
    }

    fn log_watermarks(&self, count: usize) {
        if self.capacity == 0 {
            return;
        }
        let percent = count * 100 / self.capacity;
        if percent >= 95 {
            error!(kb = %self.id, count, capacity = self.capacity, "KB above 95% of capacity");
        } else if percent >= 80 {
            warn!(kb = %self.id, count, capacity = self.capacity, "KB above 80% of capacity");
        }
    }
}

fn deindex_locked(state: &mut KbState, id: Uuid) {
    state.paths.remove(id);
    if let Some(preds) = state.universal_preds.remove(&id) {
        for pred in preds {
            if let Some(set) = state.universals.get_mut(&pred) {
                set.remove(&id);
                if set.is_empty() {
                    state.universals.remove(&pred);
                }
            }
        }
    }
    state.ids.remove(&id);
}

/// Trivially true terms are never committed: reflexive equality, the
/// literal `true`, and the empty conjunction.
fn is_trivially_true(term: &Term) -> bool {
    if term.atom_value() == Some("true") {
        return true;
    }
    match term.op() {
        Some(op) if op == OP_EQUALS => {
            let args = term.args();
            args.len() == 2 && args[0] == args[1]
        }
        Some(op) if op == OP_AND => term.args().is_empty(),
        _ => false,
    }
}
